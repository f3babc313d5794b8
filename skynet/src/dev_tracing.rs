//! Logging setup for applications, tests and benches.

use skynet_core::config::Config;
use tracing_subscriber::EnvFilter;

/// Initialize a `fmt` tracing subscriber from the process environment.
///
/// Same as [`init_tracing_for`] with [`Config::from_env`].
pub fn init_tracing() {
    init_tracing_for(&Config::from_env());
}

/// Initialize a `fmt` tracing subscriber for `config`.
///
/// `RUST_LOG` wins when set. Otherwise the level is `debug` when
/// [`Config::debug`] is on, and `info` when it is not.
/// This is a no-op when a global subscriber is already installed.
pub fn init_tracing_for(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(config)));

    // Best-effort: tests call this repeatedly.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn default_level(config: &Config) -> &'static str {
    if config.debug {
        "debug"
    } else {
        "info"
    }
}
