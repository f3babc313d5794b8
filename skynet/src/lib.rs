//! # Skynet
//!
//! Application-side data plane for a skynet robot: typed publishers and
//! subscribers that exchange values with the local broker over `ipc://`
//! endpoints.
//!
//! ## Architecture
//!
//! Skynet is structured in layers:
//!
//! - **`skynet-core`**: Overwrite buffer, message framing, configuration, errors
//! - **Transport crates**: Worker-thread services on a concrete transport
//! - **`skynet`**: Public API surface (this crate)
//!
//! ## Transports (features)
//!
//! - **`zmq`** (default) - libzmq REQ/REP workers, see [`zmq`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "zmq")]
//! # fn example() -> skynet::Result<()> {
//! use skynet::zmq::prelude::*;
//!
//! skynet::dev_tracing::init_tracing();
//! let app = Application::from_env();
//!
//! // Publish the latest reading; older unsent readings are overwritten.
//! let temperature = app.publisher::<f32>("sensors/temperature", DataType::scalar("float"), &ServiceOptions::default())?;
//! temperature.set_value(21.5)?;
//!
//! // React to every new command.
//! let commands = app.subscriber::<String>("commands", DataType::scalar("str"), &ServiceOptions::default())?;
//! commands.register_callback(|cmd| println!("got {cmd}"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Threads
//!
//! Every service owns exactly one worker thread. Callbacks run on that
//! thread, so a slow callback throttles its own subscription and nothing
//! else.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dev_tracing;

#[cfg(feature = "zmq")]
pub mod sync;
#[cfg(feature = "zmq")]
pub mod zmq;

// Re-export core types
pub use skynet_core::buffer::OverwriteBuffer;
pub use skynet_core::config::Config;
pub use skynet_core::error::{DecodeError, Result, SkynetError};
pub use skynet_core::message::{Header, Message, PROTOCOL_VERSION};
pub use skynet_core::options::ServiceOptions;
pub use skynet_core::service::{DataType, ServiceDescriptor};
pub use skynet_core::service_kind::ServiceKind;

#[cfg(feature = "zmq")]
pub use sync::{join, join_messages, SyncMode, Synchronizer};
