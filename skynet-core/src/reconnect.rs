//! Reconnection backoff for service workers.
//!
//! A worker whose request/reply channel fails rebuilds it after a delay that
//! doubles on every consecutive failure, up to a cap.

use std::time::Duration;

use crate::config::Config;

/// Reconnection state tracker for a single worker.
///
/// # Example
///
/// ```rust
/// use skynet_core::config::Config;
/// use skynet_core::reconnect::ReconnectState;
/// use std::time::Duration;
///
/// let config = Config::default()
///     .with_reconnect_ivl(Duration::from_millis(100))
///     .with_reconnect_ivl_max(Duration::from_secs(10));
///
/// let mut reconnect = ReconnectState::new(&config);
/// assert_eq!(reconnect.next_delay(), Duration::from_millis(100));
/// assert_eq!(reconnect.next_delay(), Duration::from_millis(200));
///
/// reconnect.reset();
/// assert_eq!(reconnect.next_delay(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectState {
    base_interval: Duration,
    max_interval: Duration,
    /// Consecutive failures so far (0 = healthy)
    attempt: u32,
    current_interval: Duration,
}

impl ReconnectState {
    pub const fn new(config: &Config) -> Self {
        Self {
            base_interval: config.reconnect_ivl,
            max_interval: config.reconnect_ivl_max,
            attempt: 0,
            current_interval: config.reconnect_ivl,
        }
    }

    /// Get the delay before the next reconnection attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_interval;

        self.attempt = self.attempt.saturating_add(1);
        self.current_interval = self.base_interval * (1_u32 << self.attempt.min(10));
        if self.current_interval > self.max_interval {
            self.current_interval = self.max_interval;
        }

        delay
    }

    /// Reset after a successful round trip.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_interval = self.base_interval;
    }

    #[inline]
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_ms: u64, max_ms: u64) -> Config {
        Config::default()
            .with_reconnect_ivl(Duration::from_millis(base_ms))
            .with_reconnect_ivl_max(Duration::from_millis(max_ms))
    }

    #[test]
    fn test_exponential_backoff() {
        let mut state = ReconnectState::new(&config(100, 10_000));

        assert_eq!(state.next_delay(), Duration::from_millis(100));
        assert_eq!(state.next_delay(), Duration::from_millis(200));
        assert_eq!(state.next_delay(), Duration::from_millis(400));
        assert_eq!(state.attempt(), 3);
    }

    #[test]
    fn test_max_interval_cap() {
        let mut state = ReconnectState::new(&config(100, 500));

        assert_eq!(state.next_delay(), Duration::from_millis(100));
        assert_eq!(state.next_delay(), Duration::from_millis(200));
        assert_eq!(state.next_delay(), Duration::from_millis(400));
        assert_eq!(state.next_delay(), Duration::from_millis(500));
        assert_eq!(state.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_reset() {
        let mut state = ReconnectState::new(&config(100, 10_000));
        state.next_delay();
        state.next_delay();

        state.reset();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.next_delay(), Duration::from_millis(100));
    }
}
