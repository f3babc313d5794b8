//! Side-channel interaction.
//!
//! A PAIR socket on `<root>/interaction`: either side may send whenever it
//! likes, there is no request/reply coupling and no header frame. Each message
//! is a single payload frame (`{data, version}`).
//!
//! The socket is shared by the worker (receiving) and any number of senders,
//! so it sits behind a mutex. The worker only holds the lock for one short
//! poll slice at a time.
//!
//! A failed receive is logged and retried after a growing delay. Only a
//! terminated context ends the listener, and then `send` fails with
//! [`SkynetError::ShutDown`] as well.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;
use skynet_core::endpoint::IpcEndpoint;
use skynet_core::error::{Result, SkynetError};
use skynet_core::message;
use skynet_core::reconnect::ReconnectState;
use tracing::{debug, error, trace, warn};

use crate::application::Application;
use crate::common::{millis_i64, ZmqResultExt};
use crate::worker::{sleep_unless, Worker};

/// Longest the worker keeps the socket locked while waiting for input.
const MAX_POLL_SLICE: Duration = Duration::from_millis(10);

pub struct Interaction<T> {
    endpoint: IpcEndpoint,
    socket: Arc<Mutex<zmq::Socket>>,
    worker: Worker,
    _marker: PhantomData<fn(T)>,
}

impl<T> Interaction<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub(crate) fn new<F>(app: &Application, callback: F) -> Result<Self>
    where
        F: Fn(T) + Send + 'static,
    {
        let config = app.config();
        let endpoint = IpcEndpoint::for_interaction(&config.sockets_dir);

        let socket = app.context().socket(zmq::PAIR).transport()?;
        socket.set_linger(0).transport()?;
        socket.connect(&endpoint.to_string()).transport()?;
        let socket = Arc::new(Mutex::new(socket));

        let shutdown = Arc::new(AtomicBool::new(false));
        let listen = Listener {
            endpoint: endpoint.clone(),
            socket: Arc::clone(&socket),
            slice: config.poll_interval.min(MAX_POLL_SLICE),
            reconnect: ReconnectState::new(config),
            shutdown: Arc::clone(&shutdown),
        };
        let worker = Worker::spawn("interaction".to_string(), shutdown, move || {
            listen.run::<T, F>(callback);
        })?;

        Ok(Self {
            endpoint,
            socket,
            worker,
            _marker: PhantomData,
        })
    }

    /// Encode `value` as a payload frame and send it.
    pub fn send(&self, value: &T) -> Result<()> {
        if self.worker.is_stopping() {
            return Err(SkynetError::ShutDown);
        }
        let payload = message::encode_payload(value)?;
        self.socket.lock().send(&payload[..], 0).transport()?;
        trace!(endpoint = %self.endpoint, bytes = payload.len(), "interaction sent");
        Ok(())
    }
}

impl<T> Interaction<T> {
    pub fn endpoint(&self) -> &IpcEndpoint {
        &self.endpoint
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    pub fn shutdown(&self) {
        self.worker.signal();
        self.worker.join();
    }
}

impl<T> Drop for Interaction<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Listener {
    endpoint: IpcEndpoint,
    socket: Arc<Mutex<zmq::Socket>>,
    slice: Duration,
    reconnect: ReconnectState,
    shutdown: Arc<AtomicBool>,
}

impl Listener {
    fn run<T, F>(mut self, callback: F)
    where
        T: DeserializeOwned,
        F: Fn(T),
    {
        debug!(endpoint = %self.endpoint, "interaction listening");
        let slice = millis_i64(self.slice);

        while !self.shutdown.load(Ordering::Acquire) {
            let socket = self.socket.lock();
            let ready = socket.poll(zmq::POLLIN, slice);
            let received = match ready {
                Ok(0) | Err(zmq::Error::EINTR) => {
                    MutexGuard::unlock_fair(socket);
                    continue;
                }
                Ok(_) => socket.recv_bytes(0),
                Err(e) => Err(e),
            };
            drop(socket);

            match received {
                Ok(bytes) => {
                    self.reconnect.reset();
                    match message::decode_payload::<T>(&bytes) {
                        Ok(value) => callback(value),
                        Err(e) => warn!(endpoint = %self.endpoint, error = %e, "dropping undecodable interaction"),
                    }
                }
                Err(e) => {
                    if !self.recover(e) {
                        break;
                    }
                }
            }
        }

        debug!(endpoint = %self.endpoint, "interaction stopped");
    }

    /// Handle a receive error. Returns `false` when listening must stop.
    fn recover(&mut self, e: zmq::Error) -> bool {
        if e == zmq::Error::ETERM {
            error!(endpoint = %self.endpoint, "context terminated; interaction closed");
            self.shutdown.store(true, Ordering::Release);
            return false;
        }
        let delay = self.reconnect.next_delay();
        warn!(
            endpoint = %self.endpoint,
            error = %e,
            attempt = self.reconnect.attempt(),
            ?delay,
            "interaction receive failed; retrying"
        );
        sleep_unless(&self.shutdown, delay, self.slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skynet_core::config::Config;

    fn listener(ctx: &zmq::Context) -> Listener {
        let config = Config::default()
            .with_reconnect_ivl(Duration::from_millis(1))
            .with_reconnect_ivl_max(Duration::from_millis(4));
        Listener {
            endpoint: IpcEndpoint::for_interaction(&config.sockets_dir),
            socket: Arc::new(Mutex::new(ctx.socket(zmq::PAIR).unwrap())),
            slice: Duration::from_millis(1),
            reconnect: ReconnectState::new(&config),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn receive_errors_are_retried_with_backoff() {
        let ctx = zmq::Context::new();
        let mut listen = listener(&ctx);

        assert!(listen.recover(zmq::Error::EAGAIN));
        assert!(listen.recover(zmq::Error::EFSM));
        assert_eq!(listen.reconnect.attempt(), 2);
        assert!(!listen.shutdown.load(Ordering::Acquire));
    }

    #[test]
    fn terminated_context_stops_the_listener() {
        let ctx = zmq::Context::new();
        let mut listen = listener(&ctx);

        assert!(!listen.recover(zmq::Error::ETERM));
        // Senders see the stop through the shared flag.
        assert!(listen.shutdown.load(Ordering::Acquire));
    }

    #[test]
    fn retry_wait_ends_on_shutdown() {
        let ctx = zmq::Context::new();
        let mut listen = listener(&ctx);
        listen.shutdown.store(true, Ordering::Release);

        assert!(!listen.recover(zmq::Error::EAGAIN));
    }
}
