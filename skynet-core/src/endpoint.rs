//! Local endpoint derivation.
//!
//! Every transport address is a filesystem path under the sockets root handed
//! to the process by its environment:
//!
//! ```text
//! <root>/node                    control plane
//! <root>/interaction             side channel
//! <root>/services/<kind>/<name>  one per service
//! ```
//!
//! The `(root, kind, name)` triple is what makes a service address unique
//! within one broker instance.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::service_kind::ServiceKind;

const NODE: &str = "node";
const INTERACTION: &str = "interaction";
const SERVICES: &str = "services";

/// Path of the broker's control-plane endpoint.
pub fn node_path(root: &Path) -> PathBuf {
    root.join(NODE)
}

/// Path of the side-channel endpoint.
pub fn interaction_path(root: &Path) -> PathBuf {
    root.join(INTERACTION)
}

/// Path of a service endpoint.
///
/// Service names may contain `/`, which nests them further below the kind
/// directory.
///
/// # Examples
///
/// ```
/// use skynet_core::endpoint::service_path;
/// use skynet_core::service_kind::ServiceKind;
/// use std::path::{Path, PathBuf};
///
/// let path = service_path(Path::new("/tmp/skynet/sockets"), ServiceKind::Sub, "camera");
/// assert_eq!(path, PathBuf::from("/tmp/skynet/sockets/services/sub/camera"));
/// ```
pub fn service_path(root: &Path, kind: ServiceKind, name: &str) -> PathBuf {
    root.join(SERVICES)
        .join(kind.as_str())
        .join(name.trim_start_matches('/'))
}

/// A ZeroMQ-style `ipc://` address for a local path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IpcEndpoint(PathBuf);

impl IpcEndpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn for_service(root: &Path, kind: ServiceKind, name: &str) -> Self {
        Self(service_path(root, kind, name))
    }

    pub fn for_node(root: &Path) -> Self {
        Self(node_path(root))
    }

    pub fn for_interaction(root: &Path) -> Self {
        Self(interaction_path(root))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Parse an `ipc://` address.
    pub fn parse(s: &str) -> Option<Self> {
        s.strip_prefix("ipc://")
            .filter(|p| !p.is_empty())
            .map(|p| Self(PathBuf::from(p)))
    }
}

impl fmt::Display for IpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipc://{}", self.0.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "/tmp/skynet/sockets";

    #[test]
    fn test_well_known_paths() {
        let root = Path::new(ROOT);
        assert_eq!(node_path(root), PathBuf::from("/tmp/skynet/sockets/node"));
        assert_eq!(
            interaction_path(root),
            PathBuf::from("/tmp/skynet/sockets/interaction")
        );
    }

    #[test]
    fn test_service_paths_differ_by_kind() {
        let root = Path::new(ROOT);
        let publisher = service_path(root, ServiceKind::Pub, "imu");
        let subscriber = service_path(root, ServiceKind::Sub, "imu");
        assert_ne!(publisher, subscriber);
        assert_eq!(publisher, PathBuf::from("/tmp/skynet/sockets/services/pub/imu"));
    }

    #[test]
    fn test_nested_service_name() {
        let path = service_path(Path::new(ROOT), ServiceKind::Pub, "/robot/imu");
        assert_eq!(path, PathBuf::from("/tmp/skynet/sockets/services/pub/robot/imu"));
    }

    #[test]
    fn test_ipc_display_and_parse() {
        let endpoint = IpcEndpoint::for_node(Path::new(ROOT));
        assert_eq!(endpoint.to_string(), "ipc:///tmp/skynet/sockets/node");
        assert_eq!(IpcEndpoint::parse(&endpoint.to_string()), Some(endpoint));
    }

    #[test]
    fn test_invalid_scheme() {
        assert_eq!(IpcEndpoint::parse("tcp://127.0.0.1:5555"), None);
        assert_eq!(IpcEndpoint::parse("ipc://"), None);
    }
}
