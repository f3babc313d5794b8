//! Common utilities for the ZeroMQ workers.

use skynet_core::error::SkynetError;

/// Convert a libzmq error into a transport error.
pub fn transport_error(e: zmq::Error) -> SkynetError {
    SkynetError::transport(e.to_string())
}

/// `?`-friendly conversion for `zmq::Result`.
pub trait ZmqResultExt<T> {
    fn transport(self) -> skynet_core::error::Result<T>;
}

impl<T> ZmqResultExt<T> for zmq::Result<T> {
    fn transport(self) -> skynet_core::error::Result<T> {
        self.map_err(transport_error)
    }
}

/// Milliseconds as libzmq expects them for socket timeouts.
pub fn millis_i32(d: std::time::Duration) -> i32 {
    i32::try_from(d.as_millis()).unwrap_or(i32::MAX)
}

/// Milliseconds as libzmq expects them for `poll`.
pub fn millis_i64(d: std::time::Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
