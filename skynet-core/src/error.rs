//! Skynet Error Types
//!
//! One taxonomy for the whole data plane. Decode failures and control-plane
//! failures are reported through here but are never fatal to a worker.
//! Configuration conflicts are returned synchronously at the call site.

use std::io;
use thiserror::Error;

use crate::service_kind::ServiceKind;

/// Main error type for skynet operations
#[derive(Error, Debug)]
pub enum SkynetError {
    /// IO error while preparing a local endpoint
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Transport error reported by the socket layer
    #[error("Transport error: {0}")]
    Transport(String),

    /// A received exchange could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A value could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// The same service was exposed twice for the same kind
    #[error("Service '{name}' ({kind}) is already exposed. You can't expose the same service twice.")]
    DuplicateService { kind: ServiceKind, name: String },

    /// Pull access attempted on a service that delivers through a callback
    #[error("'{service}' delivers through a callback; .value()/.message()/iterators are unavailable")]
    CallbackRegistered { service: String },

    /// A second callback registration on the same service
    #[error("'{service}' already has a callback registered")]
    CallbackAlreadySet { service: String },

    /// The broker's control plane refused or failed a call
    #[error("Control plane error: {0}")]
    ControlPlane(String),

    /// The service was shut down
    #[error("Service shut down")]
    ShutDown,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for skynet operations
pub type Result<T> = std::result::Result<T, SkynetError>;

impl SkynetError {
    /// Create a transport error with a message
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an encode error with a message
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a control-plane error with a message
    pub fn control_plane(msg: impl Into<String>) -> Self {
        Self::ControlPlane(msg.into())
    }

    /// Create a pull-access conflict for the given service
    pub fn callback_registered(service: impl Into<String>) -> Self {
        Self::CallbackRegistered {
            service: service.into(),
        }
    }

    /// Check if this error reports misuse of the API rather than a runtime failure
    #[must_use]
    pub const fn is_configuration_conflict(&self) -> bool {
        matches!(
            self,
            Self::DuplicateService { .. }
                | Self::CallbackRegistered { .. }
                | Self::CallbackAlreadySet { .. }
                | Self::InvalidConfig(_)
        )
    }

    /// Check if this error is recoverable
    ///
    /// Decode failures only cost the message that caused them.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            Self::Decode(_) | Self::ControlPlane(_) => true,
            _ => false,
        }
    }
}

/// Reasons a two-frame exchange is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Wrong number of frames in the exchange
    #[error("expected {expected} frames, got {actual}")]
    FrameCount { expected: usize, actual: usize },

    /// Header frame is malformed
    #[error("malformed header: {0}")]
    Header(String),

    /// Payload frame is malformed
    #[error("malformed payload: {0}")]
    Payload(String),

    /// Payload carries an unsupported protocol version
    #[error("unsupported version: expected {expected}, got {actual}")]
    UnsupportedVersion { expected: String, actual: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_classified() {
        let dup = SkynetError::DuplicateService {
            kind: ServiceKind::Pub,
            name: "camera".to_string(),
        };
        assert!(dup.is_configuration_conflict());
        assert!(dup.to_string().contains("already exposed"));

        assert!(SkynetError::callback_registered("camera").is_configuration_conflict());
        assert!(!SkynetError::transport("gone").is_configuration_conflict());
    }

    #[test]
    fn decode_errors_are_recoverable() {
        let err: SkynetError = DecodeError::Header("missing field `version`".to_string()).into();
        assert!(err.is_recoverable());
        assert!(!SkynetError::ShutDown.is_recoverable());
    }
}
