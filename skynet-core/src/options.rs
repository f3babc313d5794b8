//! Per-service options
//!
//! Knobs that are fixed when a service is constructed.

/// Service configuration options.
///
/// # Examples
///
/// ```
/// use skynet_core::options::ServiceOptions;
///
/// let opts = ServiceOptions::default()
///     .with_buffer_size(4)
///     .with_changes_only(true)
///     .with_expose(false);
/// assert_eq!(opts.buffer_size, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Capacity of the service's overwrite buffer
    ///
    /// - Default: 1 (latest value wins)
    /// - Larger values keep the N most recent items
    pub buffer_size: usize,

    /// Register the service with the broker on construction
    ///
    /// - Default: `true`
    pub expose: bool,

    /// Skip callback delivery when a payload is byte-identical to the previous one
    ///
    /// Subscribers only. Pull consumers always see every message.
    /// - Default: `false`
    pub changes_only: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1,
            expose: true,
            changes_only: false,
        }
    }
}

impl ServiceOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    #[must_use]
    pub const fn with_expose(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    #[must_use]
    pub const fn with_changes_only(mut self, changes_only: bool) -> Self {
        self.changes_only = changes_only;
        self
    }
}
