//! Control-plane client for the broker ("node").
//!
//! The node listens on `<root>/node`. A call is one JSON request frame
//!
//! ```text
//! { "resource": "service/expose",
//!   "headers":  { "x-skynet-application-id": "<id>" },
//!   "body":     { ... } }
//! ```
//!
//! answered by `{ "status": 200, "message": ..., "data": ... }`. Anything but
//! status 200, and any transport failure, is logged and the call yields
//! `None`. The control plane is never allowed to take the application down.
//!
//! # Compatibility
//!
//! This is not the wire protocol of the Python node, which serves
//! `POST http://node/service/expose` as HTTP over the unix socket at
//! `<root>/node`. [`NodeClient`] can only register with a broker that answers
//! the ZeroMQ/JSON envelope above. To talk to an HTTP node, implement
//! [`ControlPlane`] and pass it to `Application::with_control_plane`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use skynet_core::config::Config;
use skynet_core::endpoint::IpcEndpoint;
use skynet_core::error::{Result, SkynetError};
use tracing::{debug, error};

use crate::common::{millis_i32, ZmqResultExt};

/// Header carrying the application identity on every call.
pub const APPLICATION_ID_HEADER: &str = "x-skynet-application-id";

/// Resource used to register a service.
pub const EXPOSE_RESOURCE: &str = "service/expose";

/// Status code of a successful call.
pub const STATUS_OK: u16 = 200;

/// Outbound calls to the broker's control plane.
pub trait ControlPlane: Send + Sync {
    /// Call `resource` with a JSON body. `None` means the call failed; the
    /// failure has already been logged.
    fn call(&self, resource: &str, body: Value) -> Option<Value>;
}

impl<F> ControlPlane for F
where
    F: Fn(&str, Value) -> Option<Value> + Send + Sync,
{
    fn call(&self, resource: &str, body: Value) -> Option<Value> {
        self(resource, body)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeRequest {
    pub resource: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeResponse {
    pub status: u16,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl NodeResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            status: STATUS_OK,
            message: None,
            data: Some(data),
        }
    }
}

/// ZeroMQ client for the node's control plane.
///
/// A fresh REQ socket is used per call so that a timed-out request never
/// leaves a socket stuck in the awaiting-reply state.
pub struct NodeClient {
    context: zmq::Context,
    endpoint: IpcEndpoint,
    application_id: String,
    timeout: Duration,
}

impl NodeClient {
    pub fn new(context: zmq::Context, config: &Config) -> Self {
        Self {
            context,
            endpoint: IpcEndpoint::for_node(&config.sockets_dir),
            application_id: config.application_id.clone(),
            timeout: config.control_timeout,
        }
    }

    pub fn endpoint(&self) -> &IpcEndpoint {
        &self.endpoint
    }

    /// Perform one call, surfacing every failure as an error.
    pub fn try_call(&self, resource: &str, body: Value) -> Result<Value> {
        let request = NodeRequest {
            resource: resource.trim_start_matches('/').to_string(),
            headers: BTreeMap::from([(
                APPLICATION_ID_HEADER.to_string(),
                self.application_id.clone(),
            )]),
            body,
        };
        let encoded =
            serde_json::to_vec(&request).map_err(|e| SkynetError::encode(e.to_string()))?;

        let socket = self.context.socket(zmq::REQ).transport()?;
        socket.set_linger(0).transport()?;
        socket.set_sndtimeo(millis_i32(self.timeout)).transport()?;
        socket.set_rcvtimeo(millis_i32(self.timeout)).transport()?;
        socket.connect(&self.endpoint.to_string()).transport()?;

        debug!(endpoint = %self.endpoint, resource = %request.resource, "POST");
        socket.send(encoded, 0).map_err(|e| timeout_or(e, self.timeout))?;
        let reply = socket
            .recv_bytes(0)
            .map_err(|e| timeout_or(e, self.timeout))?;

        let response: NodeResponse = serde_json::from_slice(&reply)
            .map_err(|e| SkynetError::control_plane(format!("malformed reply: {e}")))?;
        if response.status != STATUS_OK {
            let message = response.message.unwrap_or_else(|| "<no message>".to_string());
            return Err(SkynetError::control_plane(format!(
                "The server replied with error [{}]: {}",
                response.status, message
            )));
        }
        Ok(response.data.unwrap_or(Value::Null))
    }
}

fn timeout_or(e: zmq::Error, timeout: Duration) -> SkynetError {
    if e == zmq::Error::EAGAIN {
        SkynetError::control_plane(format!("no answer within {timeout:?}"))
    } else {
        SkynetError::transport(e.to_string())
    }
}

impl ControlPlane for NodeClient {
    fn call(&self, resource: &str, body: Value) -> Option<Value> {
        match self.try_call(resource, body) {
            Ok(data) => Some(data),
            Err(e) => {
                error!(endpoint = %self.endpoint, resource, error = %e, "control-plane call failed");
                None
            }
        }
    }
}
