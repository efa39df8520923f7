use anyhow::{anyhow, Result};
use fixbridge::log_debug;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set by SIGINT/SIGTERM; the main loop stops the bridge when it sees it.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Only touches an atomic flag (async-signal-safe).
#[cfg(unix)]
extern "C" fn handle_shutdown(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
pub(crate) fn install_shutdown_handlers() -> Result<()> {
    for signal in [libc::SIGINT, libc::SIGTERM] {
        unsafe {
            // SAFETY: handle_shutdown is an extern "C" handler that only stores an atomic flag.
            let handler = handle_shutdown as *const () as libc::sighandler_t;
            if libc::signal(signal, handler) == libc::SIG_ERR {
                log_debug(&format!("failed to install handler for signal {signal}"));
                return Err(anyhow!("failed to install handler for signal {signal}"));
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn install_shutdown_handlers() -> Result<()> {
    Ok(())
}

pub(crate) fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
