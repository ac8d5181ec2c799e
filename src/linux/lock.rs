use std::fs::{
    File,
    OpenOptions,
};
use std::path::{
    Path,
    PathBuf,
};

use nix::errno::Errno;
use nix::fcntl::{
    Flock,
    FlockArg,
};

use crate::constants::defaults;
use crate::errors::ProvError;

/// Exclusive advisory lock on a target device, held for the whole run.
/// Released when dropped.
#[derive(Debug)]
pub struct DeviceLock {
    path: PathBuf,
    _lock: Flock<File>,
}

impl DeviceLock {
    pub fn acquire(device: &str) -> Result<Self, ProvError> {
        Self::acquire_in(Path::new(defaults::LOCK_DIR), device)
    }

    pub fn acquire_in(dir: &Path, device: &str) -> Result<Self, ProvError> {
        let path = lock_path(dir, device);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|err| {
                ProvError::FileError(err, format!("failed to open lock file {}", path.display()))
            })?;

        let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
            match errno {
                Errno::EWOULDBLOCK => ProvError::DeviceLocked(format!(
                    "{device} is in use by another prov-rs run ({})",
                    path.display()
                )),
                errno => ProvError::FileError(
                    errno.into(),
                    format!("failed to lock {}", path.display()),
                ),
            }
        })?;

        Ok(Self { path, _lock: lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(dir: &Path, device: &str) -> PathBuf {
    let base = Path::new(device)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| device.replace('/', "_"));

    dir.join(format!("prov-rs-{base}.lock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path(Path::new("/run/lock"), "/dev/nvme0n1"),
            PathBuf::from("/run/lock/prov-rs-nvme0n1.lock")
        );
    }

    #[test]
    fn test_lock_contention() {
        let dir = tempfile::tempdir().unwrap();

        let held = DeviceLock::acquire_in(dir.path(), "/dev/sda").unwrap();
        assert!(held.path().exists());

        // flock(2) locks belong to the open file description,
        // so a second open in the same process still contends
        let second = DeviceLock::acquire_in(dir.path(), "/dev/sda");
        assert!(matches!(second, Err(ProvError::DeviceLocked(_))));

        // Other devices are independent
        let other = DeviceLock::acquire_in(dir.path(), "/dev/sdb");
        assert!(other.is_ok());

        drop(held);
        assert!(DeviceLock::acquire_in(dir.path(), "/dev/sda").is_ok());
    }
}
