pub mod blkid;
pub mod lock;
pub mod luks;
pub mod mkfs;
pub mod mount;
pub mod sfdisk;
pub mod user;

use crate::disk::ops::{
    BlockProbe,
    DiskOps,
};
use crate::disk::plan::{
    LayoutPlan,
    PartitionSpec,
};
use crate::disk::{
    Filesystem,
    PartitionTable,
};
use crate::errors::ProvError;
use crate::utils::shell;

// See linux/block/partition-generic.c
//
// char *disk_name(struct gendisk *hd, int partno, char *buf)
// {
// 	if (!partno)
// 		snprintf(buf, BDEVNAME_SIZE, "%s", hd->disk_name);
// 	else if (isdigit(hd->disk_name[strlen(hd->disk_name)-1]))
// 		snprintf(buf, BDEVNAME_SIZE, "%sp%d", hd->disk_name, partno);
// 	else
// 		snprintf(buf, BDEVNAME_SIZE, "%s%d", hd->disk_name, partno);
// 	return buf;
// }
//
pub fn partition_name(name: &str, part_number: u8) -> String {
    match name.chars().last() {
        Some(c) if c.is_ascii_digit() => format!("{name}p{part_number}"),
        _ => format!("{name}{part_number}"),
    }
}

/// The live system: sfdisk, cryptsetup, mkfs.* and friends
#[derive(Debug, Default)]
pub struct Host;

impl DiskOps for Host {
    fn create_table(&mut self, device: &str, table: PartitionTable) -> Result<(), ProvError> {
        sfdisk::run_create_table(device, table)
    }

    fn create_partition(
        &mut self,
        device: &str,
        plan: &LayoutPlan,
        number: u8,
        part: &PartitionSpec,
    ) -> Result<String, ProvError> {
        sfdisk::run_append_partition(device, plan, part)?;

        // Wait for the kernel to publish the new node
        if let Err(err) = shell::exec("udevadm", &["settle"]) {
            log::warn!("udevadm settle failed: {err}");
        }

        let expected = partition_name(device, number);
        let partitions = blkid::partitions(device)?;

        if !partitions.contains(&expected) {
            return Err(ProvError::CmdFailed {
                error: None,
                context: format!(
                    "partition {expected} not found on {device} after creation, found {partitions:?}"
                ),
            });
        }

        Ok(expected)
    }

    fn luks_format(&mut self, partition: &str, passphrase: &str) -> Result<(), ProvError> {
        luks::format(partition, passphrase)
    }

    fn luks_open(
        &mut self,
        partition: &str,
        passphrase: &str,
        name: &str,
    ) -> Result<String, ProvError> {
        luks::open(partition, passphrase, name)
    }

    fn mkfs(&mut self, target: &str, fs: Filesystem) -> Result<(), ProvError> {
        mkfs::create_fs(target, fs)
    }
}

impl BlockProbe for Host {
    fn capacity(&self, device: &str) -> Result<u64, ProvError> {
        blkid::capacity(device)
    }

    fn alignment(&self, device: &str) -> Result<u64, ProvError> {
        blkid::alignment(device)
    }

    fn sector_size(&self, device: &str) -> Result<u64, ProvError> {
        blkid::sector_size(device)
    }

    fn uuid(&self, device: &str) -> Result<Option<String>, ProvError> {
        blkid::uuid(device)
    }
}

/// Logs what [Host] would have done, without touching any device
#[derive(Debug, Default)]
pub struct DryRun;

impl DiskOps for DryRun {
    fn create_table(&mut self, device: &str, table: PartitionTable) -> Result<(), ProvError> {
        log::info!(
            "[dry-run] {} <<< {:?}",
            shell::display_cmd("sfdisk", &["--wipe", "always", device]),
            sfdisk::create_table_cmd(table),
        );

        Ok(())
    }

    fn create_partition(
        &mut self,
        device: &str,
        plan: &LayoutPlan,
        number: u8,
        part: &PartitionSpec,
    ) -> Result<String, ProvError> {
        log::info!(
            "[dry-run] {} <<< {:?}",
            shell::display_cmd("sfdisk", &["--append", device]),
            sfdisk::create_partition_cmd(plan, part),
        );

        Ok(partition_name(device, number))
    }

    fn luks_format(&mut self, partition: &str, _passphrase: &str) -> Result<(), ProvError> {
        log::info!("[dry-run] cryptsetup luksFormat --type luks2 {partition}");
        Ok(())
    }

    fn luks_open(
        &mut self,
        partition: &str,
        _passphrase: &str,
        name: &str,
    ) -> Result<String, ProvError> {
        log::info!("[dry-run] cryptsetup open {partition} {name}");
        Ok(luks::mapped_path(name))
    }

    fn mkfs(&mut self, target: &str, fs: Filesystem) -> Result<(), ProvError> {
        let (cmd, args) = mkfs::mkfs_cmd(target, fs);
        log::info!("[dry-run] {}", shell::display_cmd(cmd, &args));
        Ok(())
    }
}
