//! Process-wide configuration.
//!
//! The broker launches applications with their identity and the location of
//! its sockets in the environment:
//!
//! - `SKYNET_APPLICATION_ID`: opaque application identifier, attached to every
//!   control-plane call. Missing means developer mode.
//! - `SKYNET_SOCKETS_DIR`: root of every local endpoint.
//! - `SKYNET_DEBUG`: `1`, `y` or `yes` turns on debug logging.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const ENV_APPLICATION_ID: &str = "SKYNET_APPLICATION_ID";
pub const ENV_SOCKETS_DIR: &str = "SKYNET_SOCKETS_DIR";
pub const ENV_DEBUG: &str = "SKYNET_DEBUG";

/// Placeholder identity used when the environment does not provide one.
pub const UNKNOWN_APPLICATION_ID: &str = "__unknown__";

pub const DEFAULT_SOCKETS_DIR: &str = "/tmp/skynet/sockets";

/// Default timeout for a control-plane round trip (10s)
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default slice for cancellable waits in worker loops (100ms)
///
/// Bounds how long `shutdown()` takes to be observed by a worker blocked on
/// the transport.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default first delay before a failed worker channel is rebuilt (100ms)
pub const DEFAULT_RECONNECT_IVL: Duration = Duration::from_millis(100);

/// Default cap on the reconnection backoff (5s)
pub const DEFAULT_RECONNECT_IVL_MAX: Duration = Duration::from_secs(5);

/// Runtime configuration shared by every service of one application.
///
/// # Examples
///
/// ```
/// use skynet_core::config::Config;
/// use std::time::Duration;
///
/// let config = Config::default()
///     .with_application_id("demo")
///     .with_sockets_dir("/run/skynet")
///     .with_poll_interval(Duration::from_millis(20));
/// assert_eq!(config.application_id, "demo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub application_id: String,
    pub sockets_dir: PathBuf,
    pub debug: bool,

    /// Send/receive timeout of a control-plane call
    pub control_timeout: Duration,

    /// How often a blocked worker re-checks its shutdown flag
    pub poll_interval: Duration,

    /// First delay before a failed channel is rebuilt
    pub reconnect_ivl: Duration,

    /// Upper bound of the doubling reconnection delay
    pub reconnect_ivl_max: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application_id: UNKNOWN_APPLICATION_ID.to_string(),
            sockets_dir: PathBuf::from(DEFAULT_SOCKETS_DIR),
            debug: false,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect_ivl: DEFAULT_RECONNECT_IVL,
            reconnect_ivl_max: DEFAULT_RECONNECT_IVL_MAX,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        match lookup(ENV_APPLICATION_ID).filter(|id| !id.is_empty()) {
            Some(id) => config.application_id = id,
            None => warn!(
                "The environment variable '{}' is not set. Assuming developer mode.",
                ENV_APPLICATION_ID
            ),
        }
        if let Some(dir) = lookup(ENV_SOCKETS_DIR).filter(|d| !d.is_empty()) {
            config.sockets_dir = PathBuf::from(dir);
        }
        config.debug = lookup(ENV_DEBUG).is_some_and(|v| is_truthy(&v));
        config
    }

    /// True when the identity fell back to the placeholder.
    pub fn is_developer_mode(&self) -> bool {
        self.application_id == UNKNOWN_APPLICATION_ID
    }

    #[must_use]
    pub fn with_application_id(mut self, id: impl Into<String>) -> Self {
        self.application_id = id.into();
        self
    }

    #[must_use]
    pub fn with_sockets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sockets_dir = dir.into();
        self
    }

    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub const fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_reconnect_ivl(mut self, interval: Duration) -> Self {
        self.reconnect_ivl = interval;
        self
    }

    #[must_use]
    pub const fn with_reconnect_ivl_max(mut self, interval: Duration) -> Self {
        self.reconnect_ivl_max = interval;
        self
    }
}

/// `1`, `y` or `yes`, case-insensitive.
fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.application_id, "__unknown__");
        assert_eq!(config.sockets_dir, PathBuf::from("/tmp/skynet/sockets"));
        assert_eq!(config.control_timeout, Duration::from_secs(10));
        assert!(config.is_developer_mode());
        assert!(!config.debug);
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("SKYNET_APPLICATION_ID", "app-42"),
            ("SKYNET_SOCKETS_DIR", "/run/skynet"),
            ("SKYNET_DEBUG", "YES"),
        ]));

        assert_eq!(config.application_id, "app-42");
        assert_eq!(config.sockets_dir, PathBuf::from("/run/skynet"));
        assert!(config.debug);
        assert!(!config.is_developer_mode());
    }

    #[test]
    fn test_missing_identity_falls_back() {
        let config = Config::from_lookup(lookup(&[("SKYNET_DEBUG", "0")]));
        assert_eq!(config.application_id, UNKNOWN_APPLICATION_ID);
        assert!(!config.debug);
    }

    #[test]
    fn test_truthy_values() {
        for v in ["1", "y", "Y", "yes", "Yes"] {
            assert!(is_truthy(v), "{v}");
        }
        for v in ["", "0", "no", "true"] {
            assert!(!is_truthy(v), "{v}");
        }
    }
}
