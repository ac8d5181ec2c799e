use crate::disk::Filesystem;
use crate::errors::ProvError;
use crate::utils::shell;

/// Program and arguments creating `fs` on `device`
pub fn mkfs_cmd(device: &str, fs: Filesystem) -> (&'static str, Vec<&str>) {
    match fs {
        Filesystem::Fat32 => ("mkfs.fat", vec!["-F", "32", device]),
        Filesystem::Ext4 => ("mkfs.ext4", vec!["-F", device]),
        Filesystem::Swap => ("mkswap", vec![device]),
    }
}

pub fn create_fs(device: &str, fs: Filesystem) -> Result<(), ProvError> {
    let (cmd, args) = mkfs_cmd(device, fs);

    shell::exec(cmd, &args)
}

#[test]
fn test_mkfs_cmd() {
    let tests = [
        (Filesystem::Fat32, "mkfs.fat -F 32 /dev/sda1"),
        (Filesystem::Ext4, "mkfs.ext4 -F /dev/mapper/cryptroot"),
        (Filesystem::Swap, "mkswap /dev/sda3"),
    ];

    let devices = ["/dev/sda1", "/dev/mapper/cryptroot", "/dev/sda3"];

    for ((fs, expected), device) in tests.into_iter().zip(devices) {
        let (cmd, args) = mkfs_cmd(device, fs);
        assert_eq!(shell::display_cmd(cmd, &args), expected);
    }
}
