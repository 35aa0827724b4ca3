//! PID-file single-instance guard.
//!
//! Atomically creates the PID file with `O_EXCL`; on `EEXIST` probes the
//! stored PID's liveness via `kill(pid, 0)` and either refuses to start
//! (alive, or no permission to tell) or reclaims a stale file.

use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{PixelPilotError, Result};

pub const PID_FILE_PATH: &str = "/tmp/pixelpilot_mini_rk.pid";

pub struct SingleInstanceGuard {
    path: PathBuf,
}

impl SingleInstanceGuard {
    /// Acquire the guard at `path`, retrying once after reclaiming a stale
    /// PID file.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Self::try_create(&path)?;
        Ok(Self { path })
    }

    fn try_create(path: &Path) -> Result<()> {
        let pid = std::process::id();
        match fs::OpenOptions::new().write(true).create_new(true).mode(0o644).open(path) {
            Ok(mut f) => {
                write!(f, "{pid}")?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let existing = fs::read_to_string(path).unwrap_or_default();
                let existing_pid: u32 = existing.trim().parse().unwrap_or(0);
                if existing_pid != 0 && process_is_alive(existing_pid) {
                    return Err(PixelPilotError::SingleInstance(existing_pid));
                }
                warn!(pid = existing_pid, "reclaiming stale PID file");
                fs::remove_file(path)?;
                fs::OpenOptions::new().write(true).create_new(true).mode(0o644).open(path).and_then(
                    |mut f| write!(f, "{pid}"),
                )?;
                Ok(())
            }
            Err(e) => Err(PixelPilotError::Io(e)),
        }
    }
}

impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        if fs::remove_file(&self.path).is_ok() {
            info!(path = %self.path.display(), "released single-instance PID file");
        }
    }
}

fn process_is_alive(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return true;
    }
    // EPERM means the process exists but we can't signal it — still alive.
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_alive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pid");

        let first = SingleInstanceGuard::acquire(&path).unwrap();
        let second = SingleInstanceGuard::acquire(&path);
        assert!(second.is_err());
        drop(first);
    }

    #[test]
    fn stale_pid_file_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pid");
        // A PID that is extremely unlikely to be alive.
        fs::write(&path, "999999").unwrap();

        let guard = SingleInstanceGuard::acquire(&path);
        assert!(guard.is_ok());
    }

    #[test]
    fn guard_removes_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pid");
        {
            let _guard = SingleInstanceGuard::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
