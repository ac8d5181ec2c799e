use super::plan::{
    LayoutPlan,
    PartitionSpec,
};
use super::{
    Filesystem,
    PartitionTable,
};
use crate::errors::ProvError;

/// Destructive operations on block devices.
///
/// The layout engine only talks to storage through this trait;
/// failures carry the underlying tool's diagnostic output.
pub trait DiskOps {
    /// Writes a fresh, empty partition table to `device`
    fn create_table(&mut self, device: &str, table: PartitionTable) -> Result<(), ProvError>;

    /// Creates partition number `number` of `plan` on `device` and
    /// returns the partition identifier read back from the system
    fn create_partition(
        &mut self,
        device: &str,
        plan: &LayoutPlan,
        number: u8,
        part: &PartitionSpec,
    ) -> Result<String, ProvError>;

    fn luks_format(&mut self, partition: &str, passphrase: &str) -> Result<(), ProvError>;

    /// Opens the LUKS container on `partition` as `name`,
    /// returning the mapped device path
    fn luks_open(
        &mut self,
        partition: &str,
        passphrase: &str,
        name: &str,
    ) -> Result<String, ProvError>;

    fn mkfs(&mut self, target: &str, fs: Filesystem) -> Result<(), ProvError>;
}

/// Read-only queries on block devices
pub trait BlockProbe {
    /// Size of `device` in bytes
    fn capacity(&self, device: &str) -> Result<u64, ProvError>;

    /// Preferred partition alignment of `device` in bytes
    fn alignment(&self, device: &str) -> Result<u64, ProvError>;

    /// Logical sector size of `device` in bytes
    fn sector_size(&self, device: &str) -> Result<u64, ProvError>;

    /// Filesystem UUID on `device`, if any
    fn uuid(&self, device: &str) -> Result<Option<String>, ProvError>;
}
