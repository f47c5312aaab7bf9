use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Owner metadata written into the lock file on acquisition (§6 "Single-instance
/// handoff"). A second launch reads this before giving up, so it can report who
/// already holds the instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub host: String,
    pub app: String,
    pub acquired_at_ms: i64,
}

/// File-based advisory lock at `runtime_dir/app.lock`. A non-blocking
/// `try_lock` either succeeds (we are the primary) or fails (a primary already
/// holds it), mirroring `QLockFile::tryLock(0)`.
pub struct SingleInstanceLock {
    path: PathBuf,
    file: Option<File>,
}

impl SingleInstanceLock {
    pub fn new(runtime_dir: &Path) -> Self {
        Self {
            path: runtime_dir.join("app.lock"),
            file: None,
        }
    }

    /// Attempts to acquire the lock without blocking. Returns `false` if another
    /// process already holds it.
    pub fn try_lock(&mut self, app_name: &str) -> Result<bool, CoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)?;

        if file.try_lock_exclusive().is_err() {
            return Ok(false);
        }

        let owner = LockOwner {
            pid: std::process::id(),
            host: hostname(),
            app: app_name.to_string(),
            acquired_at_ms: chrono::Utc::now().timestamp_millis(),
        };
        write_owner(&file, &owner)?;

        self.file = Some(file);
        Ok(true)
    }

    /// Reads the current owner's metadata without taking the lock. Used by a
    /// secondary launch to report who is primary before exiting.
    pub fn lock_info(&self) -> Option<LockOwner> {
        let mut file = OpenOptions::new().read(true).open(&self.path).ok()?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Releases the lock. Idempotent; a no-op if we never held it.
    pub fn unlock(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
    }
}

impl Drop for SingleInstanceLock {
    fn drop(&mut self) {
        self.unlock();
    }
}

fn write_owner(file: &File, owner: &LockOwner) -> Result<(), CoreError> {
    let bytes = serde_json::to_vec(owner)?;
    let mut file = file.try_clone()?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&bytes)?;
    file.flush()?;
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_fails_until_first_unlocks() {
        let dir = std::env::temp_dir().join(format!("finder-core-lock-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut primary = SingleInstanceLock::new(&dir);
        assert!(primary.try_lock("finder").unwrap());

        let mut secondary = SingleInstanceLock::new(&dir);
        assert!(!secondary.try_lock("finder").unwrap());

        let info = secondary.lock_info().expect("owner metadata should be readable");
        assert!(info.pid > 0);

        primary.unlock();

        let mut retry = SingleInstanceLock::new(&dir);
        assert!(retry.try_lock("finder").unwrap());
    }
}
