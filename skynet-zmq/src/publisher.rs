//! Publisher service.
//!
//! ## Architecture:
//!
//! ```text
//! Application thread              Worker thread ("pub:<name>")
//! ┌──────────────────┐            ┌──────────────────────────────┐
//! │ set_value(v)     │──push────▶ │ pop (blocks)                 │
//! │  never blocks;   │  Overwrite │ encode [header, payload]     │
//! │  stale values    │  Buffer    │ REQ send ──▶ broker          │
//! │  are evicted     │            │ wait ack (cancellable poll)  │
//! └──────────────────┘            └──────────────────────────────┘
//! ```
//!
//! The acknowledgement carries no meaning beyond "accepted" and is discarded.
//! `shutdown()` raises the flag and closes the buffer, which releases a
//! worker blocked in `pop`; nothing is sent once the flag is up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
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

/// Typed publisher bound to `<root>/services/pub/<name>`.
pub struct Publisher<T> {
    descriptor: ServiceDescriptor,
    buffer: Arc<OverwriteBuffer<Message<T>>>,
    worker: Worker,
}

impl<T> Publisher<T>
where
    T: Serialize + Send + 'static,
{
    pub(crate) fn new(
        app: &Application,
        name: &str,
        data: DataType,
        options: &ServiceOptions,
    ) -> Result<Self> {
        let config = app.config();
        let descriptor = ServiceDescriptor::new(name, ServiceKind::Pub, data);
        let endpoint = IpcEndpoint::for_service(&config.sockets_dir, ServiceKind::Pub, name);
        let channel = ReqChannel::connect(app.context(), endpoint, config.poll_interval)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let buffer = Arc::new(OverwriteBuffer::new(options.buffer_size));
        let publish = PublishLoop {
            name: descriptor.name.clone(),
            channel: ServiceChannel::new(
                app.context().clone(),
                channel,
                config,
                Arc::clone(&shutdown),
            ),
            buffer: Arc::clone(&buffer),
            shutdown: Arc::clone(&shutdown),
        };
        let worker = app.launch(&descriptor, options.expose, || {
            Worker::spawn(format!("pub:{name}"), shutdown, move || publish.run())
        })?;

        Ok(Self {
            descriptor,
            buffer,
            worker,
        })
    }

    /// Queue a value stamped with the current time.
    ///
    /// Never blocks. An unsent older value is replaced once the buffer is full.
    pub fn set_value(&self, value: T) -> Result<()> {
        self.set_message(Message::new(value))
    }

    /// Queue a pre-built message, keeping its header.
    pub fn set_message(&self, message: Message<T>) -> Result<()> {
        if self.worker.is_stopping() {
            return Err(SkynetError::ShutDown);
        }
        self.buffer.push(message);
        Ok(())
    }
}

impl<T> Publisher<T> {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Values overwritten before the worker could send them.
    pub fn dropped(&self) -> u64 {
        self.buffer.evicted()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Values still queued are discarded.
    pub fn shutdown(&self) {
        self.worker.signal();
        self.buffer.close();
        self.worker.join();
    }
}

impl<T> Drop for Publisher<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct PublishLoop<T> {
    name: String,
    channel: ServiceChannel,
    buffer: Arc<OverwriteBuffer<Message<T>>>,
    shutdown: Arc<AtomicBool>,
}

impl<T: Serialize> PublishLoop<T> {
    fn run(mut self) {
        debug!(service = %self.name, endpoint = %self.channel.endpoint(), "publisher running");

        while let Some(message) = self.buffer.pop() {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let frames = match message::encode(&message) {
                Ok(frames) => frames,
                Err(e) => {
                    warn!(service = %self.name, error = %e, "dropping value that failed to encode");
                    continue;
                }
            };
            match self.channel.exchange(&frames) {
                Exchange::Reply(_) => trace!(service = %self.name, "value acknowledged"),
                Exchange::Failed => warn!(service = %self.name, "value lost"),
                Exchange::Cancelled => break,
            }
        }

        debug!(service = %self.name, "publisher stopped");
    }
}
