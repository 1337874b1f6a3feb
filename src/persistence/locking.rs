//! Advisory whole-file locks on index files.
//!
//! Readers take a shared lock and writers an exclusive one, using `flock()`
//! on Unix. Locks belong to the open file description, so two handles in the
//! same process contend just like two processes do. The lock is dropped when
//! the handle is released or closed.

use crate::{LshError, Result};
use std::fs::File;
use std::path::Path;
use std::time::{Duration, Instant};

/// Shared for reading, exclusive for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    Shared,
    Exclusive,
}

/// How long to wait for a contended lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Give up with [`LshError::LockTimeout`] after this long. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Pause between attempts while the lock is held elsewhere.
    pub backoff: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            backoff: Duration::from_secs(1),
        }
    }
}

impl LockOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Block until `file` is locked, or the timeout in `opts` runs out.
pub fn acquire(file: &File, path: &Path, kind: LockType, opts: &LockOptions) -> Result<()> {
    let started = Instant::now();
    let mut announced = false;
    loop {
        match try_lock(file, kind) {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => return Err(LshError::Io(e)),
        }

        let waited = started.elapsed();
        let pause = match opts.timeout {
            Some(timeout) if waited >= timeout => {
                return Err(LshError::LockTimeout {
                    path: path.to_path_buf(),
                    waited,
                });
            }
            Some(timeout) => opts.backoff.min(timeout - waited),
            None => opts.backoff,
        };
        if !announced {
            tracing::debug!(path = %path.display(), ?kind, backoff = ?opts.backoff, "waiting for lock");
            announced = true;
        }
        std::thread::sleep(pause);
    }
}

/// Drop any lock held through `file`.
pub fn release(file: &File) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        loop {
            // SAFETY: the descriptor stays open for the duration of the call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
            if rc == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(LshError::Io(err));
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(())
    }
}

/// One non-blocking attempt. `Ok(false)` means the lock is held elsewhere.
#[cfg(unix)]
fn try_lock(file: &File, kind: LockType) -> std::io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let op = match kind {
        LockType::Shared => libc::LOCK_SH,
        LockType::Exclusive => libc::LOCK_EX,
    };
    loop {
        // SAFETY: the descriptor stays open for the duration of the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), op | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(true);
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => return Ok(false),
            _ => return Err(err),
        }
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File, _kind: LockType) -> std::io::Result<bool> {
    tracing::warn!("file locking not supported on this platform");
    Ok(true)
}
