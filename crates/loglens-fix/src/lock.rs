//! Per-project-root filesystem mutation lock (spec §5).
//!
//! The teacher stack does not carry `fs2`; this uses a sentinel lock
//! file plus `OpenOptions::create_new` with a bounded, non-blocking
//! retry poll instead of adding a new dependency.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use loglens_domain::error::{LoglensError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct ProjectLock {
    path: PathBuf,
}

impl ProjectLock {
    /// Acquire the lock for `project_root`, retrying non-blocking
    /// attempts until `retry_window` elapses (spec §5 default 30s).
    pub fn acquire(project_root: &Path, retry_window: Duration) -> Result<Self> {
        let path = project_root.join(".loglens.lock");
        let deadline = Instant::now() + retry_window;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(ProjectLock { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(LoglensError::Timeout {
                            elapsed_ms: retry_window.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(LoglensError::io("acquiring project lock", e)),
            }
        }
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_times_out_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let _first = ProjectLock::acquire(dir.path(), Duration::from_secs(5)).unwrap();
        let second = ProjectLock::acquire(dir.path(), Duration::from_millis(100));
        assert!(second.is_err());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = ProjectLock::acquire(dir.path(), Duration::from_secs(5)).unwrap();
        }
        let second = ProjectLock::acquire(dir.path(), Duration::from_millis(100));
        assert!(second.is_ok());
    }
}
