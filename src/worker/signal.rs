use crate::log_debug;
#[cfg(unix)]
use std::io;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Signal {
    Term,
    Kill,
}

/// True once the termination grace window has run out.
pub(super) fn grace_expired(terminate_requested_at: Instant, now: Instant, grace: Duration) -> bool {
    now.saturating_duration_since(terminate_requested_at) >= grace
}

pub(super) fn send_signal(pid: u32, signal: Signal) {
    #[cfg(unix)]
    unsafe {
        let signo = match signal {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        if libc::kill(pid as i32, signo) != 0 {
            log_debug(&format!(
                "Worker: failed to send signal {signo} to pid {pid}: {}",
                io::Error::last_os_error()
            ));
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        let _ = signal;
        log_debug("Worker: termination requested, but signals unsupported on this platform");
    }
}
