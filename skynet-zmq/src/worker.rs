//! Worker-thread lifecycle shared by every service.
//!
//! Each service owns exactly one dedicated OS thread. The thread is spawned
//! only after the service's own state is fully built, and stops when the
//! shared shutdown flag is raised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use skynet_core::error::Result;
use tracing::{debug, warn};

/// Handle on a service's background thread.
pub struct Worker {
    name: String,
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Spawn `body` on a named thread.
    pub fn spawn<F>(name: String, shutdown: Arc<AtomicBool>, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(body)?;
        debug!(worker = %name, "worker started");

        Ok(Self {
            name,
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once shutdown has been requested.
    pub fn is_stopping(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// True while the thread has not exited.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Raise the shutdown flag without waiting.
    pub fn signal(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Wait for the thread to exit.
    ///
    /// A no-op when called from the worker thread itself, e.g. when a
    /// callback drops the last handle on its own service.
    pub fn join(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!(worker = %self.name, "worker thread panicked");
        } else {
            debug!(worker = %self.name, "worker stopped");
        }
    }
}

/// Sleep for `total`, waking every `slice` to check `flag`.
///
/// Returns `false` if the flag was raised before the time was up.
pub fn sleep_unless(flag: &AtomicBool, total: Duration, slice: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if flag.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(slice.min(deadline - now));
    }
}
