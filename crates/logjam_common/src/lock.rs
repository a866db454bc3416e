//! Exclusive run lock
//!
//! Advisory `flock(LOCK_EX | LOCK_NB)` on a well-known file. Acquisition
//! never waits: if another process holds the lock the caller gets `None`
//! straight away. The kernel drops the lock when the holder exits, so a
//! crashed run never leaves a stale lock behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held lock; released on drop
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Try once. `Ok(None)` means another instance holds the lock.
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        if !try_flock_exclusive(&file)? {
            debug!(path = %path.display(), "lock held elsewhere");
            return Ok(None);
        }

        // Holder pid for whoever inspects the file; the flock is what counts
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // SAFETY: the fd is owned by `self.file` and still open here.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// Non-blocking exclusive flock. `Ok(false)` when already held.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    // SAFETY: flock is a plain POSIX call on a valid fd owned by `file`.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(false);
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_refused() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run/monitor.lock");

        let first = RunLock::try_acquire(&path).unwrap();
        assert!(first.is_some());

        // flock conflicts between separate open file descriptions, even in one process
        let second = RunLock::try_acquire(&path).unwrap();
        assert!(second.is_none());

        drop(first);
        let third = RunLock::try_acquire(&path).unwrap();
        assert!(third.is_some());
    }

    #[test]
    fn test_lock_file_records_pid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("monitor.lock");
        let lock = RunLock::try_acquire(&path).unwrap().unwrap();

        let content = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }
}
