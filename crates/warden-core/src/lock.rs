use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// LockGuard
// ---------------------------------------------------------------------------

/// RAII guard for the state-file lock. Dropping the guard closes the file
/// descriptor, which releases the flock.
pub struct LockGuard {
    _file: Option<File>,
}

// ---------------------------------------------------------------------------
// FileLock
// ---------------------------------------------------------------------------

/// Advisory cross-process lock on a sidecar file.
///
/// Concurrency here is at the process level: overlapping hook invocations
/// coordinate only through this lock. Acquisition is non-blocking with a
/// bounded poll; on deadline expiry the stale lock file is unlinked and
/// recreated so this process can proceed. Liveness is deliberately traded
/// against strict mutual exclusion under adversarial lock-holder failure —
/// a hook that never returns is worse than one that occasionally races.
pub struct FileLock {
    path: PathBuf,
    wait: Duration,
    poll: Duration,
}

impl FileLock {
    pub fn new(path: PathBuf, wait_ms: u64, poll_ms: u64) -> Self {
        Self {
            path,
            wait: Duration::from_millis(wait_ms),
            poll: Duration::from_millis(poll_ms.max(1)),
        }
    }

    /// Try to acquire the lock once, without blocking.
    pub fn try_acquire(&self) -> io::Result<Option<LockGuard>> {
        let file = self.open_lock_file()?;
        if try_flock_exclusive(&file)? {
            Ok(Some(LockGuard { _file: Some(file) }))
        } else {
            Ok(None)
        }
    }

    /// Acquire the lock, polling with jitter until the bounded deadline.
    ///
    /// Never fails: on deadline expiry the stale lock file is forcibly taken
    /// over; on filesystem errors the guard is returned lockless so the
    /// caller's work is never stalled by the enforcement layer itself.
    pub fn acquire(&self) -> LockGuard {
        let start = Instant::now();
        loop {
            match self.try_acquire() {
                Ok(Some(guard)) => return guard,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), err = %e, "lock open failed; proceeding unlocked");
                    return LockGuard { _file: None };
                }
            }
            if start.elapsed() >= self.wait {
                return self.take_over();
            }
            let jitter_ms = rand::random::<u64>() % (self.poll.as_millis() as u64 + 1);
            std::thread::sleep(self.poll + Duration::from_millis(jitter_ms));
        }
    }

    /// Force-release a stale lock: unlink the lock file and lock a fresh
    /// inode. A holder of the old inode keeps its flock, but new arrivals
    /// serialize on the new file.
    fn take_over(&self) -> LockGuard {
        tracing::warn!(path = %self.path.display(), "lock wait deadline expired; taking over stale lock");
        let _ = std::fs::remove_file(&self.path);
        match self.open_lock_file() {
            Ok(file) => {
                let _ = try_flock_exclusive(&file);
                LockGuard { _file: Some(file) }
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "lock takeover failed; proceeding unlocked");
                LockGuard { _file: None }
            }
        }
    }

    fn open_lock_file(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
    }
}

// ---------------------------------------------------------------------------
// flock helpers
// ---------------------------------------------------------------------------

/// Try to acquire an exclusive flock on a file (non-blocking).
///
/// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if the file is
/// already locked by another process.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: flock is a standard POSIX call. fd is a valid descriptor
        // owned by `file`. LOCK_EX | LOCK_NB is a non-blocking exclusive lock.
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
