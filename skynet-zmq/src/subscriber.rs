//! Subscriber service.
//!
//! The worker repeatedly sends an empty `[header, payload]` request and waits
//! for the broker to answer with the next message. Each decoded message is:
//!
//! 1. recorded as the last one seen (wakes every `wait_next`/`wait_last`),
//! 2. handed to the registered callback on the worker thread, or
//! 3. pushed into the overwrite buffer for pull access.
//!
//! Callback and pull delivery are mutually exclusive. Messages buffered
//! before a callback is registered are handed to it first, in arrival order.
//! With `changes_only`, a payload byte-identical to the previous one does not
//! reach the callback; the buffer always receives everything.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::de::DeserializeOwned;
use skynet_core::buffer::OverwriteBuffer;
use skynet_core::endpoint::IpcEndpoint;
use skynet_core::error::{Result, SkynetError};
use skynet_core::message::{self, Message};
use skynet_core::options::ServiceOptions;
use skynet_core::service::{DataType, ServiceDescriptor};
use skynet_core::service_kind::ServiceKind;
use tracing::{debug, trace, warn};

use crate::application::Application;
use crate::channel::{Exchange, ReqChannel, ServiceChannel};
use crate::worker::Worker;

/// Empty request asking the broker for the next message.
const NEXT: [&[u8]; 2] = [b"", b""];

type ValueCallback<T> = Arc<dyn Fn(T) + Send + Sync>;
type MessageCallback<T> = Arc<dyn Fn(Message<T>) + Send + Sync>;
type StopHook = Box<dyn FnOnce() + Send>;

enum Delivery<T> {
    Values(ValueCallback<T>),
    Messages(MessageCallback<T>),
}

impl<T> Clone for Delivery<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Values(cb) => Self::Values(Arc::clone(cb)),
            Self::Messages(cb) => Self::Messages(Arc::clone(cb)),
        }
    }
}

/// A buffered message and whether its payload differed from the one before.
struct Pending<T> {
    message: Message<T>,
    changed: bool,
}

struct LastSeen<T> {
    message: Option<Message<T>>,
    payload: Option<Bytes>,
    /// Bumped on every decoded arrival
    seq: u64,
}

/// State shared between the handle and the worker thread.
struct Shared<T> {
    name: String,
    buffer: OverwriteBuffer<Pending<T>>,
    delivery: RwLock<Option<Delivery<T>>>,
    /// Held while a message is routed, so a delivery switch sees a settled buffer
    route: Mutex<()>,
    on_stop: Mutex<Vec<StopHook>>,
    last: Mutex<LastSeen<T>>,
    arrived: Condvar,
    changes_only: bool,
    shutdown: Arc<AtomicBool>,
}

impl<T> Shared<T> {
    fn new(name: String, options: &ServiceOptions, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            name,
            buffer: OverwriteBuffer::new(options.buffer_size),
            delivery: RwLock::new(None),
            route: Mutex::new(()),
            on_stop: Mutex::new(Vec::new()),
            last: Mutex::new(LastSeen {
                message: None,
                payload: None,
                seq: 0,
            }),
            arrived: Condvar::new(),
            changes_only: options.changes_only,
            shutdown,
        }
    }

    fn already_set(&self) -> SkynetError {
        SkynetError::CallbackAlreadySet {
            service: self.name.clone(),
        }
    }

    /// Switch to callback delivery, handing over everything buffered so far.
    fn install(&self, delivery: Delivery<T>) -> Result<()> {
        // Checked before taking `route`: a callback registering on its own
        // subscriber runs with `route` held.
        if self.delivery.read().is_some() {
            return Err(self.already_set());
        }
        let _route = self.route.lock();
        {
            let mut slot = self.delivery.write();
            if slot.is_some() {
                return Err(self.already_set());
            }
            *slot = Some(delivery.clone());
        }

        let pending = self.buffer.drain();
        if !pending.is_empty() {
            debug!(service = %self.name, count = pending.len(), "handing buffered messages to the callback");
        }
        for Pending { message, changed } in pending {
            self.deliver(&delivery, message, changed);
        }
        Ok(())
    }

    /// Back to pull delivery. Returns `false` if no callback was set.
    fn uninstall(&self) -> bool {
        let _route = self.route.lock();
        self.delivery.write().take().is_some()
    }

    fn deliver(&self, delivery: &Delivery<T>, message: Message<T>, changed: bool) {
        if self.changes_only && !changed {
            trace!(service = %self.name, "payload unchanged, callback skipped");
            return;
        }
        match delivery {
            Delivery::Values(callback) => callback(message.data),
            Delivery::Messages(callback) => callback(message),
        }
    }

    /// Run `hook` at shutdown, or now if shutdown already happened.
    fn add_stop_hook(&self, hook: StopHook) {
        let mut hooks = self.on_stop.lock();
        if self.is_stopping() {
            drop(hooks);
            hook();
            return;
        }
        hooks.push(hook);
    }

    fn run_stop_hooks(&self) {
        let hooks = std::mem::take(&mut *self.on_stop.lock());
        for hook in hooks {
            hook();
        }
    }

    fn ensure_pull(&self) -> Result<()> {
        if self.delivery.read().is_some() {
            return Err(SkynetError::callback_registered(self.name.as_str()));
        }
        Ok(())
    }

    fn is_stopping(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Wake waiters after the flag has been raised.
    fn release_waiters(&self) {
        let _last = self.last.lock();
        self.arrived.notify_all();
    }
}

impl<T: DeserializeOwned + Clone> Shared<T> {
    /// Decode one reply and route it.
    fn dispatch(&self, frames: &[Bytes]) {
        let message: Message<T> = match message::decode_frames(frames) {
            Ok(message) => message,
            Err(e) => {
                warn!(service = %self.name, error = %e, "dropping undecodable message");
                return;
            }
        };

        let changed = {
            let mut last = self.last.lock();
            let payload = frames.get(1);
            let changed = last.payload.as_ref() != payload;
            last.payload = payload.cloned();
            last.message = Some(message.clone());
            last.seq = last.seq.wrapping_add(1);
            changed
        };
        self.arrived.notify_all();

        let _route = self.route.lock();
        let delivery = self.delivery.read().clone();
        match delivery {
            Some(delivery) => self.deliver(&delivery, message, changed),
            None => self.buffer.push(Pending { message, changed }),
        }
    }
}

/// Typed subscriber bound to `<root>/services/sub/<name>`.
pub struct Subscriber<T> {
    descriptor: ServiceDescriptor,
    shared: Arc<Shared<T>>,
    worker: Worker,
}

impl<T> Subscriber<T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    pub(crate) fn new(
        app: &Application,
        name: &str,
        data: DataType,
        options: &ServiceOptions,
    ) -> Result<Self> {
        let config = app.config();
        let descriptor = ServiceDescriptor::new(name, ServiceKind::Sub, data);
        let endpoint = IpcEndpoint::for_service(&config.sockets_dir, ServiceKind::Sub, name);
        let channel = ReqChannel::connect(app.context(), endpoint, config.poll_interval)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Shared::new(
            descriptor.name.clone(),
            options,
            Arc::clone(&shutdown),
        ));
        let channel = ServiceChannel::new(
            app.context().clone(),
            channel,
            config,
            Arc::clone(&shutdown),
        );
        let worker = {
            let shared = Arc::clone(&shared);
            app.launch(&descriptor, options.expose, || {
                Worker::spawn(format!("sub:{name}"), shutdown, move || {
                    receive_loop(&shared, channel);
                })
            })?
        };

        Ok(Self {
            descriptor,
            shared,
            worker,
        })
    }

    /// Deliver every value to `callback` on the worker thread.
    ///
    /// Values received before this call and not yet pulled are passed to
    /// `callback` first, on the calling thread. After that the callback runs
    /// inline with the receive loop: a slow callback slows the subscription
    /// down.
    pub fn register_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.shared.install(Delivery::Values(Arc::new(callback)))
    }

    /// Deliver every message, header included, to `callback`.
    pub fn register_message_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(Message<T>) + Send + Sync + 'static,
    {
        self.shared.install(Delivery::Messages(Arc::new(callback)))
    }

    /// Remove the callback and return to pull delivery.
    ///
    /// Returns `false` if no callback was registered. Must not be called from
    /// inside the callback.
    pub fn unregister_callback(&self) -> bool {
        self.shared.uninstall()
    }

    /// Block until the next value is available.
    ///
    /// Fails with [`SkynetError::ShutDown`] once the subscriber is stopped
    /// and drained.
    pub fn value(&self) -> Result<T> {
        self.message().map(Message::into_data)
    }

    pub fn value_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        Ok(self.message_timeout(timeout)?.map(Message::into_data))
    }

    pub fn message(&self) -> Result<Message<T>> {
        self.shared.ensure_pull()?;
        self.shared
            .buffer
            .pop()
            .map(|pending| pending.message)
            .ok_or(SkynetError::ShutDown)
    }

    pub fn message_timeout(&self, timeout: Duration) -> Result<Option<Message<T>>> {
        self.shared.ensure_pull()?;
        Ok(self.shared.buffer.pop_timeout(timeout).map(|pending| pending.message))
    }

    /// Endless stream of values; ends when the subscriber shuts down.
    pub fn values(&self) -> Result<impl Iterator<Item = T> + '_> {
        Ok(self.messages()?.map(Message::into_data))
    }

    pub fn messages(&self) -> Result<impl Iterator<Item = Message<T>> + '_> {
        self.shared.ensure_pull()?;
        Ok(std::iter::from_fn(move || {
            self.shared.buffer.pop().map(|pending| pending.message)
        }))
    }

    /// The most recent message received, if any. Never blocks.
    pub fn last_message(&self) -> Option<Message<T>> {
        self.shared.last.lock().message.clone()
    }

    /// Wait for the next arrival, whatever mode the subscriber is in.
    ///
    /// `None` on timeout or shutdown.
    pub fn wait_next(&self, timeout: Option<Duration>) -> Option<Message<T>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut last = self.shared.last.lock();
        let seen = last.seq;
        while last.seq == seen {
            if self.shared.is_stopping() {
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if self.shared.arrived.wait_until(&mut last, deadline).timed_out() {
                        break;
                    }
                }
                None => self.shared.arrived.wait(&mut last),
            }
        }
        if last.seq == seen {
            return None;
        }
        last.message.clone()
    }

    /// The last message if one was already received, otherwise the first
    /// one to arrive.
    pub fn wait_last(&self, timeout: Option<Duration>) -> Option<Message<T>> {
        if let Some(message) = self.last_message() {
            return Some(message);
        }
        self.wait_next(timeout)
    }
}

impl<T> Subscriber<T> {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn has_callback(&self) -> bool {
        self.shared.delivery.read().is_some()
    }

    /// Messages overwritten before a pull consumer took them.
    pub fn dropped(&self) -> u64 {
        self.shared.buffer.evicted()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Run `hook` once this subscriber has shut down.
    ///
    /// Runs immediately when the subscriber is already shut down.
    pub fn on_shutdown(&self, hook: impl FnOnce() + Send + 'static) {
        self.shared.add_stop_hook(Box::new(hook));
    }

    /// Stop the worker and release every blocked reader.
    ///
    /// The worker notices the flag within one poll interval of its reply
    /// wait. Hooks from [`on_shutdown`](Self::on_shutdown) run last.
    pub fn shutdown(&self) {
        self.worker.signal();
        self.shared.buffer.close();
        self.shared.release_waiters();
        self.worker.join();
        self.shared.run_stop_hooks();
    }
}

impl<T> Drop for Subscriber<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("name", &self.descriptor.name)
            .field("callback", &self.has_callback())
            .field("running", &self.is_running())
            .finish()
    }
}

fn receive_loop<T: DeserializeOwned + Clone>(shared: &Shared<T>, mut channel: ServiceChannel) {
    debug!(service = %shared.name, endpoint = %channel.endpoint(), "subscriber running");

    while !shared.is_stopping() {
        match channel.exchange(&NEXT) {
            Exchange::Reply(frames) => shared.dispatch(&frames),
            Exchange::Failed => {}
            Exchange::Cancelled => break,
        }
    }

    debug!(service = %shared.name, "subscriber stopped");
}
