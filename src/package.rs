//! Package file access: exclusive-open probing and identity resolution
//!
//! Uploads arrive over file shares, so a package can still be held open by
//! the uploader when the worker first sees it. A package counts as locked
//! when the operating system refuses an exclusive open (Windows sharing or
//! lock violation) or when another handle holds a lock on it.

use std::fs::{File, TryLockError};
use std::io;
use std::path::Path;
use std::thread;

use crate::backend::IndexingBackend;
use crate::config::RetryPolicy;
use crate::report::PackageIdentity;

/// ERROR_SHARING_VIOLATION
#[cfg(windows)]
const SHARING_VIOLATION: i32 = 32;

/// ERROR_LOCK_VIOLATION
#[cfg(windows)]
const LOCK_VIOLATION: i32 = 33;

/// Result of probing a package file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Locked,
}

#[cfg(windows)]
fn open_exclusive(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .read(true)
        .share_mode(0)
        .open(path)
}

#[cfg(not(windows))]
fn open_exclusive(path: &Path) -> io::Result<File> {
    File::open(path)
}

fn is_sharing_violation(err: &io::Error) -> bool {
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(SHARING_VIOLATION) | Some(LOCK_VIOLATION))
    }
    #[cfg(not(windows))]
    {
        let _ = err;
        false
    }
}

/// Probe whether `path` can be opened for exclusive reading right now.
///
/// # Errors
///
/// Any open failure other than a sharing violation (missing file, access
/// denied, ...) is returned as is.
pub fn check_available(path: &Path) -> io::Result<Availability> {
    let file = match open_exclusive(path) {
        Ok(file) => file,
        Err(e) if is_sharing_violation(&e) => return Ok(Availability::Locked),
        Err(e) => return Err(e),
    };

    match file.try_lock() {
        Ok(()) => Ok(Availability::Available),
        Err(TryLockError::WouldBlock) => Ok(Availability::Locked),
        Err(TryLockError::Error(e)) => Err(e),
    }
}

/// Probe `path`, sleeping `policy.lock_wait` between probes while it is
/// locked, for at most `policy.maximum_lock_wait_attempts` waits.
pub fn wait_until_available(path: &Path, policy: &RetryPolicy) -> io::Result<Availability> {
    let mut waits = 0;
    loop {
        match check_available(path)? {
            Availability::Available => return Ok(Availability::Available),
            Availability::Locked if waits < policy.maximum_lock_wait_attempts => {
                waits += 1;
                tracing::debug!(
                    "{} is locked, waiting {:?} (wait {} of {})",
                    path.display(),
                    policy.lock_wait(),
                    waits,
                    policy.maximum_lock_wait_attempts
                );
                thread::sleep(policy.lock_wait());
            }
            Availability::Locked => return Ok(Availability::Locked),
        }
    }
}

/// Best-effort identity of a package: the manifest as read by the backend,
/// then the file name, then `Unknown`.
pub fn identify(backend: &dyn IndexingBackend, path: &Path) -> PackageIdentity {
    backend
        .load_identity(path)
        .or_else(|| PackageIdentity::from_file_name(path))
        .unwrap_or_else(PackageIdentity::unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            maximum_attempts: 3,
            maximum_lock_wait_attempts: 2,
            lock_wait_ms: 10,
        }
    }

    #[test]
    fn test_unlocked_file_is_available() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.1.0.symbols.nupkg");
        std::fs::write(&path, "pkg").unwrap();

        assert_eq!(check_available(&path).unwrap(), Availability::Available);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = check_available(&dir.path().join("missing.nupkg")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_locked_file_is_reported_after_waits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.1.0.symbols.nupkg");
        std::fs::write(&path, "pkg").unwrap();

        let holder = File::open(&path).unwrap();
        holder.lock().unwrap();

        let start = Instant::now();
        let availability = wait_until_available(&path, &quick_policy()).unwrap();

        assert_eq!(availability, Availability::Locked);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_lock_released_during_wait() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.1.0.symbols.nupkg");
        std::fs::write(&path, "pkg").unwrap();

        let holder = File::open(&path).unwrap();
        holder.lock().unwrap();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            drop(holder);
        });

        let policy = RetryPolicy {
            lock_wait_ms: 50,
            ..quick_policy()
        };
        let availability = wait_until_available(&path, &policy).unwrap();
        releaser.join().unwrap();

        assert_eq!(availability, Availability::Available);
    }
}
