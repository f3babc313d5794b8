//! Skynet Core
//!
//! This crate contains the transport-agnostic building blocks of the
//! application-side data plane:
//! - Bounded drop-oldest mailbox (`buffer`)
//! - Two-frame message encoding (`message`)
//! - Service identity and registration metadata (`service`, `service_kind`)
//! - Local endpoint path derivation (`endpoint`)
//! - Environment-sourced configuration (`config`) and per-service options (`options`)
//! - Worker reconnection backoff (`reconnect`)
//! - Error types (`error`)
//!
//! Nothing in here touches a socket; the ZeroMQ workers live in `skynet-zmq`.

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod buffer;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod options;
pub mod reconnect;
pub mod service;
pub mod service_kind;

// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::buffer::OverwriteBuffer;
    pub use crate::config::Config;
    pub use crate::error::{DecodeError, Result, SkynetError};
    pub use crate::message::{Frames, Header, Message, PROTOCOL_VERSION};
    pub use crate::options::ServiceOptions;
    pub use crate::reconnect::ReconnectState;
    pub use crate::service::{DataType, ServiceDescriptor};
    pub use crate::service_kind::ServiceKind;
}
