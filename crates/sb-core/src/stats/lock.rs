//! Advisory per-record lock so concurrent writers for one scene serialize.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::StatsError;

const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Lock file path for a record: `<record>.lock`.
pub fn lock_path(record_path: &Path) -> PathBuf {
    let mut name = record_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    record_path.with_file_name(name)
}

/// Held `flock` on a record's lock file. Released on drop.
#[derive(Debug)]
pub struct RecordLock {
    file: File,
    path: PathBuf,
}

impl RecordLock {
    /// Acquire the lock, retrying until `wait` has elapsed.
    pub fn acquire(path: &Path, wait: Duration) -> Result<Self, StatsError> {
        let started = Instant::now();
        loop {
            match Self::try_acquire(path)? {
                Some(lock) => return Ok(lock),
                None if started.elapsed() >= wait => {
                    return Err(StatsError::LockTimeout {
                        path: path.to_path_buf(),
                        waited_ms: started.elapsed().as_millis() as u64,
                    })
                }
                None => {
                    debug!(path = %path.display(), "record lock busy, retrying");
                    thread::sleep(RETRY_INTERVAL);
                }
            }
        }
    }

    /// One non-blocking attempt. `Ok(None)` means another holder has it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, StatsError> {
        let io_err = |source| StatsError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    return Ok(None);
                }
                return Err(io_err(err));
            }
        }

        file.set_len(0).map_err(io_err)?;
        let mut writer = &file;
        let _ = writer.write_all(std::process::id().to_string().as_bytes());
        let _ = writer.flush();

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        // The lock file stays: unlinking it would let a waiter lock a dead inode.
    }
}
