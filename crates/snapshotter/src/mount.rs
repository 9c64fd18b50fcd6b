//! Kernel mount teardown

use std::path::Path;

use nix::errno::Errno;

/// Unmounts filesystems on behalf of the manager.
pub trait Mounter: Send + Sync + std::fmt::Debug {
    fn umount(&self, target: &Path) -> Result<(), Errno>;
}

/// Unmounts through the `umount(2)` syscall.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMounter;

impl Mounter for SystemMounter {
    #[cfg(target_os = "linux")]
    fn umount(&self, target: &Path) -> Result<(), Errno> {
        nix::mount::umount(target)
    }

    #[cfg(not(target_os = "linux"))]
    fn umount(&self, _target: &Path) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }
}

/// Accepts every unmount without touching the kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMounter;

impl Mounter for NoopMounter {
    fn umount(&self, _target: &Path) -> Result<(), Errno> {
        Ok(())
    }
}

/// `EINVAL` from umount means the target is not a mountpoint (already
/// unmounted).
pub(crate) fn is_benign_umount_error(errno: Errno) -> bool {
    errno == Errno::EINVAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_einval_is_benign() {
        assert!(is_benign_umount_error(Errno::EINVAL));
        assert!(!is_benign_umount_error(Errno::EBUSY));
        assert!(!is_benign_umount_error(Errno::EPERM));
    }

    #[test]
    fn test_noop_mounter_accepts_anything() {
        assert!(NoopMounter.umount(Path::new("/does/not/exist")).is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_system_umount_of_plain_dir_fails() {
        let temp = tempfile::tempdir().unwrap();
        // EINVAL as root, EPERM otherwise; never success
        assert!(SystemMounter.umount(temp.path()).is_err());
    }
}
