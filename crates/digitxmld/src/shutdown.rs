//! Termination signal wiring.
//!
//! The first `SIGINT` or `SIGTERM` raises the daemon's cancel flag: a running
//! batch stops before its next item and the serve loop exits once the current
//! request has been answered. A second signal terminates the process.

use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use thiserror::Error;

/// Exit status used when a second signal forces termination.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Errors reported while installing signal handlers.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Registers `SIGINT` and `SIGTERM` against `cancel`.
///
/// # Errors
///
/// Returns [`ShutdownError::Install`] when a handler cannot be registered.
pub fn install(cancel: &Arc<AtomicBool>) -> Result<(), ShutdownError> {
    for signal in [SIGINT, SIGTERM] {
        // Registered first so it observes the flag before this signal sets it.
        flag::register_conditional_shutdown(signal, FORCED_EXIT_CODE, Arc::clone(cancel))
            .map_err(|source| ShutdownError::Install { source })?;
        flag::register(signal, Arc::clone(cancel))
            .map_err(|source| ShutdownError::Install { source })?;
    }
    Ok(())
}
