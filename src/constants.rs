pub mod defaults {
    pub const SETTINGS_FILE: &str = "./settings.json";
    pub const INSTALL_LOCATION: &str = "/mnt";
    pub const HOSTNAME: &str = "arch-prov";
    pub const TIMEZONE: &str = "America/Los_Angeles";
    pub const LOCALE: &str = "en_US.UTF-8";
    pub const KERNEL: &str = "linux";
    pub const MICROCODE: &str = "intel-ucode";
    pub const LUKS_MAPPED_NAME: &str = "cryptroot";
    pub const LOG_FILE: &str = "/tmp/prov-rs.log";
    pub const LOCK_DIR: &str = "/run/lock";
    pub const USER_SHELL: &str = "/bin/bash";
    pub const SUDO_TIMESTAMP_TIMEOUT: u32 = 20;
}

pub mod layout {
    pub const MIB: u64 = 1024 * 1024;
    pub const SECTOR_SIZE: u64 = 512;

    /// Offset of the first partition, leaving room for the primary GPT
    pub const FIRST_PARTITION_OFFSET: u64 = MIB;

    /// Reserved at the end of the device for the backup GPT
    pub const TABLE_TAIL_RESERVED: u64 = MIB;

    /// Space the partition table takes away from the partitions
    pub const TABLE_OVERHEAD: u64 = FIRST_PARTITION_OFFSET + TABLE_TAIL_RESERVED;

    /// Used when the device reports nothing coarser
    pub const DEFAULT_ALIGNMENT: u64 = MIB;
}

pub const ENV_PROV_LOC: &str = "PROV_LOC";
pub const ENV_PROV_SETTINGS: &str = "PROV_SETTINGS";

// Use programs instead of bindings to avoid API dependencies
pub const REQUIRED_COMMANDS: [&str; 12] = [
    "sfdisk",
    "lsblk",
    "blkid",
    "blockdev",
    "cryptsetup",
    "mkfs.fat",
    "mkfs.ext4",
    "mkswap",
    "mount",
    "pacstrap",
    "genfstab",
    "arch-chroot",
];
