//! Signal handling: SIGTERM/SIGINT graceful shutdown.
//!
//! Uses the `signal-hook` crate for safe flag registration. The scheduler
//! polls the flag between operations rather than blocking on signals, so an
//! interrupt is observed at a resource-safe point (never mid-copy or
//! mid-probe) and the currently held device or log handle is still released
//! on the way out.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Thread-safe shutdown flag shared between the signal handler and the loop.
///
/// `Ordering::Relaxed` is sufficient: the loop polls the flag every
/// iteration and needs no ordering with other atomics.
#[derive(Clone)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Create a flag without registering OS hooks (for tests and embedding).
    #[must_use]
    pub fn unregistered() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a flag and register SIGTERM/SIGINT hooks.
    ///
    /// Registration is best-effort; failures are logged to stderr but not
    /// fatal.
    #[must_use]
    pub fn registered() -> Self {
        let handler = Self::unregistered();
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&handler.flag)) {
            eprintln!("[CSR-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&handler.flag)) {
            eprintln!("[CSR-SIGNAL] failed to register SIGINT: {e}");
        }
        handler
    }

    /// Check whether a shutdown has been requested.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Programmatically request shutdown (tests, embedding).
    pub fn request(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}
