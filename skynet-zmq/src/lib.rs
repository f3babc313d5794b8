//! # Skynet ZeroMQ data plane
//!
//! Worker-thread services that talk to the local broker over `ipc://`
//! endpoints using libzmq.
//!
//! ## Overview
//!
//! - **Publisher**: pushes values to `<root>/services/pub/<name>`, one REQ/REP
//!   round trip per value
//! - **Subscriber**: pulls values from `<root>/services/sub/<name>`, delivering
//!   them to a callback or an overwrite buffer
//! - **Interaction**: free-form PAIR side channel on `<root>/interaction`
//! - **Application**: registry owning the context, configuration and the
//!   control-plane client (`<root>/node`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skynet_core::options::ServiceOptions;
//! use skynet_core::service::DataType;
//! use skynet_zmq::Application;
//!
//! let app = Application::from_env();
//! let speed = app.subscriber::<f64>("wheels/speed", DataType::scalar("float"), &ServiceOptions::default())?;
//! for value in speed.values()? {
//!     println!("{value}");
//! }
//! # Ok::<(), skynet_core::error::SkynetError>(())
//! ```
//!
//! Every service owns one OS thread. Shutdown is observed within one
//! `Config::poll_interval`.

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]

pub mod application;
pub mod channel;
mod common;
pub mod interaction;
pub mod node;
pub mod publisher;
pub mod subscriber;
mod worker;

pub use application::Application;
pub use interaction::Interaction;
pub use node::{ControlPlane, NodeClient};
pub use publisher::Publisher;
pub use subscriber::Subscriber;

/// Prelude module for convenient imports
///
/// ```rust
/// use skynet_zmq::prelude::*;
/// ```
pub mod prelude {
    pub use super::{Application, ControlPlane, Interaction, Publisher, Subscriber};
    pub use skynet_core::prelude::*;
}
