//! ZeroMQ transport.
//!
//! Services run one libzmq REQ socket each, on a dedicated thread, against
//! the broker's `ipc://` endpoints.
//!
//! # Service Types
//!
//! - [`Publisher`] - pushes values, latest value wins
//! - [`Subscriber`] - pulls values, to a callback or a buffer
//! - [`Interaction`] - free-form side channel
//! - [`Application`] - registry every service is created from
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use skynet::zmq::prelude::*;
//! use std::time::Duration;
//!
//! # fn example() -> skynet::Result<()> {
//! let app = Application::from_env();
//! let pose = app.subscriber::<Vec<f64>>("pose", DataType::new("float", [3]), &ServiceOptions::default())?;
//!
//! if let Some(xyz) = pose.value_timeout(Duration::from_secs(1))? {
//!     println!("pose: {xyz:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub use skynet_zmq::node::{NodeClient, APPLICATION_ID_HEADER, EXPOSE_RESOURCE};
pub use skynet_zmq::{Application, ControlPlane, Interaction, Publisher, Subscriber};

/// Convenient imports for the ZeroMQ transport.
///
/// # Example
///
/// ```rust
/// use skynet::zmq::prelude::*;
///
/// // Now you have:
/// // - Application, Publisher, Subscriber, Interaction
/// // - Synchronizer and SyncMode
/// // - Message, DataType, ServiceOptions, Config
/// ```
pub mod prelude {
    pub use super::{Application, Interaction, Publisher, Subscriber};
    pub use crate::sync::{SyncMode, Synchronizer};
    pub use crate::{Config, DataType, Message, Result, ServiceOptions, SkynetError};
}
