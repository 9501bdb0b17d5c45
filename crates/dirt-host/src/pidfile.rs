//! PID-file helper (spec §4.8 "PID file", §6 "Plain text, one decimal PID
//! on one line, trailing newline").

use std::fs;
use std::path::Path;
use std::time::Duration;

use dirt_core::{DirtError, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{info, warn};

pub fn write(path: impl AsRef<Path>, pid: u32) -> Result<()> {
    fs::write(path.as_ref(), format!("{pid}\n"))
        .map_err(|e| DirtError::transport_io(format!("failed to write pid file {}", path.as_ref().display()), e))
}

pub fn read(path: impl AsRef<Path>) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Probes `pid` with a harmless signal (spec: "e.g. SIGWINCH") rather than
/// `kill -0`, since the spec calls out SIGWINCH specifically as the liveness
/// probe signal.
pub fn is_process_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), Signal::SIGWINCH).is_ok()
}

/// `--stop`: read the PID file, SIGTERM, escalate to SIGKILL after
/// `kill_timeout` (default 5s) if the process is still alive.
///
/// Returns `Ok(true)` if a process was signalled, `Ok(false)` if no PID
/// file existed (Scenario S6: "doesn't appear to be running", exit 0).
pub async fn stop(path: impl AsRef<Path>, kill_timeout: Duration) -> Result<bool> {
    let Some(pid) = read(&path) else {
        info!(path = %path.as_ref().display(), "doesn't appear to be running");
        return Ok(false);
    };

    if !is_process_alive(pid) {
        info!(pid, "pid file is stale, process is not running");
        return Ok(false);
    }

    signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| DirtError::transport(format!("failed to signal pid {pid}: {e}")))?;

    let deadline = tokio::time::Instant::now() + kill_timeout;
    while tokio::time::Instant::now() < deadline {
        if !is_process_alive(pid) {
            return Ok(true);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if is_process_alive(pid) {
        warn!(pid, "process ignored SIGTERM, escalating to SIGKILL");
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
    Ok(true)
}

pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_with_no_pid_file_reports_not_running() {
        let path = std::env::temp_dir().join("dirt-host-test-missing.pid");
        let _ = fs::remove_file(&path);
        let signalled = stop(&path, Duration::from_millis(50)).await.unwrap();
        assert!(!signalled);
    }

    #[test]
    fn writes_one_line_with_trailing_newline() {
        let path = std::env::temp_dir().join("dirt-host-test-write.pid");
        write(&path, 4242).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "4242\n");
        assert_eq!(read(&path), Some(4242));
        let _ = fs::remove_file(&path);
    }
}
