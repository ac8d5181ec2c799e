use serde::{
    Deserialize,
    Serialize,
};

use super::{
    human_bytes,
    Filesystem,
    PartitionTable,
    Role,
};
use crate::constants::layout::{
    FIRST_PARTITION_OFFSET,
    SECTOR_SIZE,
    TABLE_OVERHEAD,
    TABLE_TAIL_RESERVED,
};
use crate::errors::ProvError;

/// Requested sizes for the fixed efi/boot/swap/root layout.
/// Root is never sized: it takes whatever is left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeSpec {
    pub device: String,
    pub table: PartitionTable,
    pub efi_size: u64,
    pub boot_size: u64,
    pub swap_size: u64,
    pub encrypt_root: bool,
}

/// What the device reports about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub capacity: u64,
    pub alignment: u64,

    /// Logical sector size, the unit partition tools count in
    pub sector_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionSize {
    #[serde(rename = "bytes")]
    Bytes(u64),

    /// Extends to the end of the usable area of the device
    #[serde(rename = "rest")]
    Rest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub role: Role,
    pub start_offset: u64,
    pub size: PartitionSize,
    pub filesystem: Filesystem,
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutPlan {
    pub device: String,
    pub table: PartitionTable,
    pub capacity: u64,
    pub alignment: u64,
    pub sector_size: u64,

    /// Ordered by start_offset, one per role
    pub partitions: Vec<PartitionSpec>,
}

impl LayoutPlan {
    pub fn get(&self, role: Role) -> Option<&PartitionSpec> {
        self.partitions.iter().find(|p| p.role == role)
    }

    /// First byte past the area partitions may use, on a sector boundary
    pub fn usable_end(&self) -> u64 {
        align_down(self.capacity - TABLE_TAIL_RESERVED, self.sector_size)
    }

    /// Concrete size of `part`, resolving [PartitionSize::Rest]
    pub fn effective_size(&self, part: &PartitionSpec) -> u64 {
        match part.size {
            PartitionSize::Bytes(n) => n,
            PartitionSize::Rest => self.usable_end().saturating_sub(part.start_offset),
        }
    }

    pub fn end_of(&self, part: &PartitionSpec) -> u64 {
        part.start_offset + self.effective_size(part)
    }

    /// Checks the plan invariants: one partition per role, ordered,
    /// aligned, non-overlapping, at most one encrypted partition.
    pub fn validate(&self) -> Result<(), ProvError> {
        const MSG: &str = "layout plan validation failed";

        for role in Role::ALL {
            let count = self.partitions.iter().filter(|p| p.role == role).count();
            if count != 1 {
                return Err(ProvError::ProvRsBug(format!(
                    "{MSG}: expecting exactly 1 {role} partition, got {count}"
                )));
            }
        }

        let encrypted = self.partitions.iter().filter(|p| p.encrypted).count();
        if encrypted > 1 {
            return Err(ProvError::ProvRsBug(format!(
                "{MSG}: {encrypted} encrypted partitions"
            )));
        }

        let mut prev_end = 0;
        for part in &self.partitions {
            if part.start_offset % self.alignment != 0 {
                return Err(ProvError::ProvRsBug(format!(
                    "{MSG}: {} partition at {} is not aligned to {}",
                    part.role, part.start_offset, self.alignment
                )));
            }

            if part.start_offset < prev_end {
                return Err(ProvError::ProvRsBug(format!(
                    "{MSG}: {} partition at {} overlaps previous partition ending at {prev_end}",
                    part.role, part.start_offset
                )));
            }

            prev_end = self.end_of(part);
        }

        if prev_end > self.usable_end() {
            return Err(ProvError::ProvRsBug(format!(
                "{MSG}: partitions end at {prev_end}, past usable end {}",
                self.usable_end()
            )));
        }

        Ok(())
    }
}

impl std::fmt::Display for LayoutPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} ({} table, {}, aligned to {}, {}-byte sectors)",
            self.device,
            self.table,
            human_bytes(self.capacity),
            human_bytes(self.alignment),
            self.sector_size,
        )?;

        for (n, part) in self.partitions.iter().enumerate() {
            let size = match part.size {
                PartitionSize::Bytes(b) => human_bytes(b),
                PartitionSize::Rest => format!("rest ({})", human_bytes(self.effective_size(part))),
            };

            writeln!(
                f,
                "  {}. {:<5} start={:<10} size={:<20} fs={}{}",
                n + 1,
                part.role.to_string(),
                human_bytes(part.start_offset),
                size,
                part.filesystem,
                if part.encrypted { " (encrypted)" } else { "" },
            )?;
        }

        Ok(())
    }
}

pub fn align_up(offset: u64, alignment: u64) -> u64 {
    match offset % alignment {
        0 => offset,
        rem => offset + (alignment - rem),
    }
}

fn align_down(offset: u64, alignment: u64) -> u64 {
    match alignment {
        0 => offset,
        _ => offset - offset % alignment,
    }
}

/// Computes the partition boundaries for `spec` on a device with `geometry`.
///
/// Pure: no device is touched, so an infeasible layout is always
/// rejected before anything destructive can happen.
pub fn plan(spec: &SizeSpec, geometry: &Geometry) -> Result<LayoutPlan, ProvError> {
    let Geometry {
        capacity,
        alignment,
        sector_size,
    } = *geometry;

    if sector_size < SECTOR_SIZE || !sector_size.is_power_of_two() {
        return Err(ProvError::BadSize(format!(
            "bad logical sector size {sector_size}"
        )));
    }

    if alignment == 0 || alignment % sector_size != 0 {
        return Err(ProvError::BadSize(format!(
            "alignment {alignment} is not a multiple of the {sector_size}-byte sector"
        )));
    }

    let sized = [
        (Role::Efi, spec.efi_size),
        (Role::Boot, spec.boot_size),
        (Role::Swap, spec.swap_size),
    ];

    for (role, size) in sized {
        if size == 0 || size % sector_size != 0 {
            return Err(ProvError::BadSize(format!(
                "{role} size {size} must be a non-zero multiple of {sector_size} bytes"
            )));
        }
    }

    let required = sized
        .iter()
        .try_fold(TABLE_OVERHEAD, |acc, (_, size)| acc.checked_add(*size))
        .ok_or_else(|| ProvError::BadSize("partition sizes overflow".to_string()))?;

    // Root must get at least one byte
    if required >= capacity {
        return Err(ProvError::InsufficientCapacity { required, capacity });
    }

    let mut partitions = Vec::with_capacity(Role::ALL.len());
    let mut offset = align_up(FIRST_PARTITION_OFFSET, alignment);

    for (role, size) in sized {
        partitions.push(PartitionSpec {
            role,
            start_offset: offset,
            size: PartitionSize::Bytes(size),
            filesystem: role.filesystem(),
            encrypted: false,
        });

        offset = align_up(offset + size, alignment);
    }

    // Alignment padding may still eat the remainder
    if offset >= align_down(capacity - TABLE_TAIL_RESERVED, sector_size) {
        return Err(ProvError::InsufficientCapacity {
            required: offset + TABLE_TAIL_RESERVED,
            capacity,
        });
    }

    partitions.push(PartitionSpec {
        role: Role::Root,
        start_offset: offset,
        size: PartitionSize::Rest,
        filesystem: Role::Root.filesystem(),
        encrypted: spec.encrypt_root,
    });

    let plan = LayoutPlan {
        device: spec.device.clone(),
        table: spec.table,
        capacity,
        alignment,
        sector_size,
        partitions,
    };

    plan.validate()?;

    Ok(plan)
}
