use std::fs;
use std::path::{Path, PathBuf};

use crate::log_warn;

/// Holds the single-instance lock; released on drop.
///
/// Two dashboards dispatching pipelines against the same repository would
/// race the agent subprocesses, so only one may run per project root.
#[must_use = "lock is released when InstanceLock is dropped"]
pub struct InstanceLock {
    lock: fslock::LockFile,
    pid_path: PathBuf,
}

impl std::fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceLock")
            .field("pid_path", &self.pid_path)
            .finish()
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            log_warn!("Failed to release instance lock: {}", e);
        }
        if let Err(e) = fs::remove_file(&self.pid_path) {
            log_warn!("Failed to remove PID file {}: {}", self.pid_path.display(), e);
        }
    }
}

/// What the PID file says about whoever holds the lock.
enum Holder {
    Alive(i32),
    Dead(i32),
    Unknown,
}

fn read_holder(pid_path: &Path) -> Holder {
    let Some(pid) = fs::read_to_string(pid_path)
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
    else {
        return Holder::Unknown;
    };
    if is_pid_alive(pid) {
        Holder::Alive(pid)
    } else {
        Holder::Dead(pid)
    }
}

fn is_pid_alive(pid: i32) -> bool {
    // Signal 0 probes for existence without delivering anything.
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

/// Acquire the dashboard instance lock under `runtime_dir`, creating the
/// directory as needed. The file lock is the mutual exclusion; the PID file
/// exists only to make the contention error actionable — on contention the
/// recorded PID is probed for liveness so the message can distinguish a
/// running dashboard from stale leftovers.
pub fn try_acquire(runtime_dir: &Path) -> Result<InstanceLock, String> {
    fs::create_dir_all(runtime_dir)
        .map_err(|e| format!("Failed to create {}: {}", runtime_dir.display(), e))?;

    let lock_path = runtime_dir.join("beadboard.lock");
    let pid_path = runtime_dir.join("beadboard.pid");

    let mut lock = fslock::LockFile::open(&lock_path)
        .map_err(|e| format!("Failed to open lock file {}: {}", lock_path.display(), e))?;

    if !lock
        .try_lock()
        .map_err(|e| format!("Failed to acquire lock: {}", e))?
    {
        return Err(match read_holder(&pid_path) {
            Holder::Alive(pid) => {
                format!("Another beadboard instance is running (PID {})", pid)
            }
            Holder::Dead(pid) => format!(
                "Lock is held but its recorded PID {} is dead. The OS should \
                 have released the lock with the process; remove {} and {} to recover",
                pid,
                lock_path.display(),
                pid_path.display()
            ),
            Holder::Unknown => format!(
                "Another beadboard instance holds the lock. If stale, remove {}",
                lock_path.display()
            ),
        });
    }

    fs::write(&pid_path, std::process::id().to_string())
        .map_err(|e| format!("Failed to write PID file: {}", e))?;

    Ok(InstanceLock { lock, pid_path })
}
