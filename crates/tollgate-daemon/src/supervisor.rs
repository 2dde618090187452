//! Top-level fault boundary: whole-process replacement on unrecoverable
//! faults.
//!
//! Per-frame faults never reach here; this path exists for everything else
//! (interface read loop death, dispatch task failure). The cure is a cold
//! restart: close the interface, wait out a short grace period, and replace
//! the process image with a fresh invocation of the same binary and
//! arguments. The allow-list and any in-flight frames are lost; the
//! firewall comes back fully initialized or not at all.

use std::os::unix::process::CommandExt;
use std::process::Command;
use std::time::Duration;

use tollgate_core::error::TollgateError;

use crate::iface::FrameIo;

/// Grace period between a fatal fault and the process replacement.
pub const RESTART_GRACE: Duration = Duration::from_secs(3);

/// Tear down and restart. Only returns if the exec itself fails.
pub async fn recover(io: &dyn FrameIo, fault: &TollgateError) -> TollgateError {
    tracing::error!(error = %fault, grace = ?RESTART_GRACE, "unrecoverable fault; restarting process");
    io.close();
    tokio::time::sleep(RESTART_GRACE).await;
    reexec_self()
}

/// Replace the current process image, keeping argv and the environment.
/// Only returns on failure.
pub fn reexec_self() -> TollgateError {
    let exe = match std::env::current_exe() {
        Ok(p) => p,
        Err(e) => return TollgateError::Fatal(format!("current_exe failed: {e}")),
    };
    tracing::info!(binary = %exe.display(), "switching to the new process");
    let err = Command::new(exe).args(std::env::args_os().skip(1)).exec();
    TollgateError::Fatal(format!("re-exec failed: {err}"))
}
