//! Cancellation token for the service loop.
//!
//! Termination signals set a shared flag; the service loop checks it only
//! between poll iterations and between connections, so an in-flight session
//! is never interrupted.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register SIGINT and SIGTERM to request shutdown.
    pub fn install_signal_handlers(&self) -> io::Result<()> {
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.requested))?;
        }
        debug!("Installed SIGINT/SIGTERM handlers");
        Ok(())
    }

    /// Ask the service loop to stop at its next check.
    #[cfg(test)]
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
