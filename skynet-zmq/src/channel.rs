//! Request/reply channel used by every service worker.
//!
//! The broker speaks strict REQ/REP: one request, one reply, repeat. This
//! wrapper keeps that alternation explicit and makes the reply wait
//! cancellable, so a worker blocked on a silent broker still notices its
//! shutdown flag.
//!
//! ```text
//! Idle → send() → AwaitingReply → recv() → Idle
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use skynet_core::config::Config;
use skynet_core::endpoint::IpcEndpoint;
use skynet_core::error::{Result, SkynetError};
use skynet_core::reconnect::ReconnectState;
use tracing::{debug, trace, warn};

use crate::common::{millis_i64, transport_error, ZmqResultExt};
use crate::worker::sleep_unless;

/// REQ channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReqState {
    /// Ready to send a request
    Idle,
    /// Waiting for a reply after sending a request
    AwaitingReply,
}

/// A connected REQ socket with a cancellable receive.
pub struct ReqChannel {
    socket: zmq::Socket,
    endpoint: IpcEndpoint,
    poll_interval: Duration,
    state: ReqState,
}

impl ReqChannel {
    /// Connect a new REQ socket to `endpoint`.
    ///
    /// Connecting is asynchronous in libzmq: this succeeds even when nobody
    /// is listening yet, and requests queue until the broker binds.
    pub fn connect(
        context: &zmq::Context,
        endpoint: IpcEndpoint,
        poll_interval: Duration,
    ) -> Result<Self> {
        let socket = context.socket(zmq::REQ).transport()?;
        socket.set_linger(0).transport()?;
        socket.connect(&endpoint.to_string()).transport()?;
        debug!(endpoint = %endpoint, "REQ channel connected");

        Ok(Self {
            socket,
            endpoint,
            poll_interval,
            state: ReqState::Idle,
        })
    }

    pub fn endpoint(&self) -> &IpcEndpoint {
        &self.endpoint
    }

    pub const fn state(&self) -> ReqState {
        self.state
    }

    /// Send one multipart request.
    ///
    /// Fails if the previous request has not been answered yet.
    pub fn send<F: AsRef<[u8]>>(&mut self, frames: &[F]) -> Result<()> {
        if self.state == ReqState::AwaitingReply {
            return Err(SkynetError::transport(
                "cannot send a request while awaiting a reply",
            ));
        }

        let parts: Vec<&[u8]> = frames.iter().map(AsRef::as_ref).collect();
        self.socket.send_multipart(parts, 0).transport()?;
        self.state = ReqState::AwaitingReply;
        trace!(endpoint = %self.endpoint, frames = frames.len(), "request sent");
        Ok(())
    }

    /// Wait for the reply to the last request.
    ///
    /// The wait is sliced into `poll_interval` chunks; `Ok(None)` means
    /// `cancel` was raised before a reply arrived.
    pub fn recv(&mut self, cancel: &AtomicBool) -> Result<Option<Vec<Bytes>>> {
        if self.state == ReqState::Idle {
            return Err(SkynetError::transport("no request awaiting a reply"));
        }

        let slice = millis_i64(self.poll_interval);
        while !cancel.load(Ordering::Acquire) {
            match self.socket.poll(zmq::POLLIN, slice) {
                Ok(0) | Err(zmq::Error::EINTR) => continue,
                Ok(_) => {
                    let parts = self.socket.recv_multipart(0).transport()?;
                    self.state = ReqState::Idle;
                    trace!(endpoint = %self.endpoint, frames = parts.len(), "reply received");
                    return Ok(Some(parts.into_iter().map(Bytes::from).collect()));
                }
                Err(e) => return Err(transport_error(e)),
            }
        }
        Ok(None)
    }

    /// One full request/reply round trip.
    pub fn round_trip<F: AsRef<[u8]>>(
        &mut self,
        frames: &[F],
        cancel: &AtomicBool,
    ) -> Result<Option<Vec<Bytes>>> {
        self.send(frames)?;
        self.recv(cancel)
    }
}

/// Outcome of one [`ServiceChannel::exchange`].
#[derive(Debug)]
pub enum Exchange {
    /// The broker answered
    Reply(Vec<Bytes>),
    /// The round trip failed; the channel will be rebuilt on the next call
    Failed,
    /// Shutdown was requested while waiting
    Cancelled,
}

/// A [`ReqChannel`] that is torn down after a transport failure and rebuilt
/// after a doubling backoff.
///
/// A REQ socket whose request went unanswered cannot send again, so the only
/// recovery is a fresh socket.
pub struct ServiceChannel {
    context: zmq::Context,
    endpoint: IpcEndpoint,
    poll_interval: Duration,
    channel: Option<ReqChannel>,
    backoff: ReconnectState,
    shutdown: Arc<AtomicBool>,
}

impl ServiceChannel {
    /// Wrap an already connected channel.
    pub fn new(
        context: zmq::Context,
        channel: ReqChannel,
        config: &Config,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            context,
            endpoint: channel.endpoint().clone(),
            poll_interval: config.poll_interval,
            channel: Some(channel),
            backoff: ReconnectState::new(config),
            shutdown,
        }
    }

    pub fn endpoint(&self) -> &IpcEndpoint {
        &self.endpoint
    }

    /// One request/reply round trip.
    ///
    /// On failure the error is logged and the caller is held back for the
    /// current backoff delay (cut short by shutdown).
    pub fn exchange<F: AsRef<[u8]>>(&mut self, frames: &[F]) -> Exchange {
        match self.try_exchange(frames) {
            Ok(Some(reply)) => {
                self.backoff.reset();
                Exchange::Reply(reply)
            }
            Ok(None) => Exchange::Cancelled,
            Err(e) => {
                let delay = self.backoff.next_delay();
                warn!(
                    endpoint = %self.endpoint,
                    error = %e,
                    attempt = self.backoff.attempt(),
                    ?delay,
                    "round trip failed, rebuilding channel"
                );
                if sleep_unless(&self.shutdown, delay, self.poll_interval) {
                    Exchange::Failed
                } else {
                    Exchange::Cancelled
                }
            }
        }
    }

    fn try_exchange<F: AsRef<[u8]>>(&mut self, frames: &[F]) -> Result<Option<Vec<Bytes>>> {
        let mut channel = match self.channel.take() {
            Some(channel) => channel,
            None => ReqChannel::connect(&self.context, self.endpoint.clone(), self.poll_interval)?,
        };
        let reply = channel.round_trip(frames, &self.shutdown)?;
        self.channel = Some(channel);
        Ok(reply)
    }
}
