use std::fs;

use crate::errors::ProvError;
use crate::utils::shell;

pub const PROC_MOUNTS: &str = "/proc/mounts";
pub const PROC_SWAPS: &str = "/proc/swaps";

/// Mounts `device` on `dst`, creating `dst` if needed
pub fn mount_fs(device: &str, dst: &str, opts: Option<&str>) -> Result<(), ProvError> {
    fs::create_dir_all(dst)
        .map_err(|err| ProvError::FileError(err, format!("failed to create mountpoint {dst}")))?;

    match opts {
        Some(opts) => shell::exec("mount", &["-o", opts, device, dst]),
        None => shell::exec("mount", &[device, dst]),
    }
}

pub fn swapon(device: &str) -> Result<(), ProvError> {
    shell::exec("swapon", &[device])
}

/// Reports whether something is mounted on `dst`,
/// given the content of /proc/mounts
pub fn is_mounted(mounts: &str, dst: &str) -> bool {
    let dst = dst.trim_end_matches('/');
    let dst = if dst.is_empty() { "/" } else { dst };

    mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|mnt| mnt == dst)
}

/// Reports whether `device` is an active swap area,
/// given the content of /proc/swaps
pub fn is_swap_active(swaps: &str, device: &str) -> bool {
    swaps
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .any(|dev| dev == device)
}

pub fn read_proc(path: &str) -> Result<String, ProvError> {
    fs::read_to_string(path).map_err(|err| ProvError::FileError(err, format!("failed to read {path}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTS: &str = "\
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/mapper/cryptroot /mnt ext4 rw,relatime 0 0
/dev/sda2 /mnt/boot ext4 rw,relatime 0 0
";

    const SWAPS: &str = "\
Filename				Type		Size		Used		Priority
/dev/sda3                               partition	8388604		0		-2
";

    #[test]
    fn test_is_mounted() {
        assert!(is_mounted(MOUNTS, "/mnt"));
        assert!(is_mounted(MOUNTS, "/mnt/"));
        assert!(is_mounted(MOUNTS, "/mnt/boot"));
        assert!(!is_mounted(MOUNTS, "/mnt/efi"));
        assert!(!is_mounted(MOUNTS, "/"));
    }

    #[test]
    fn test_is_swap_active() {
        assert!(is_swap_active(SWAPS, "/dev/sda3"));
        assert!(!is_swap_active(SWAPS, "/dev/sda2"));
        assert!(!is_swap_active(SWAPS, "Filename"));
    }
}
