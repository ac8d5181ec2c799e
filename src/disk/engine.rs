use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};

use super::ops::DiskOps;
use super::plan::LayoutPlan;
use super::rolemap::{
    Container,
    RoleEntry,
    RoleMap,
};
use super::Role;
use crate::errors::ProvError;

/// The destructive stages of [DiskLayoutEngine::execute], in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutStage {
    #[serde(rename = "writeTable")]
    WriteTable,

    #[serde(rename = "createPartition")]
    CreatePartition(Role),

    #[serde(rename = "formatContainer")]
    FormatContainer,

    #[serde(rename = "openContainer")]
    OpenContainer,

    #[serde(rename = "format")]
    Format(Role),
}

impl fmt::Display for LayoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteTable => write!(f, "write-table"),
            Self::CreatePartition(role) => write!(f, "create-partition-{role}"),
            Self::FormatContainer => write!(f, "format-container"),
            Self::OpenContainer => write!(f, "open-container"),
            Self::Format(role) => write!(f, "format-{role}"),
        }
    }
}

/// Secret and mapping name for the root LUKS container.
/// Only lives for the duration of [DiskLayoutEngine::execute].
pub struct Encryption<'a> {
    pub passphrase: &'a str,
    pub mapped_name: &'a str,
}

/// Applies a [LayoutPlan] to a device.
///
/// This is not idempotent: every call wipes the device. Callers are
/// responsible for obtaining confirmation before calling [execute](Self::execute).
/// Nothing is rolled back on failure; the error names the stage past which
/// the device state is unknown.
pub struct DiskLayoutEngine<'a, D: DiskOps> {
    ops: &'a mut D,
}

impl<'a, D: DiskOps> DiskLayoutEngine<'a, D> {
    pub fn new(ops: &'a mut D) -> Self {
        Self { ops }
    }

    pub fn execute(
        &mut self,
        plan: &LayoutPlan,
        device: &str,
        encryption: Option<&Encryption>,
    ) -> Result<RoleMap, ProvError> {
        // Checks done before the first destructive call
        if plan.device != device {
            return Err(ProvError::ProvRsBug(format!(
                "layout plan is for {}, refusing to apply it to {device}",
                plan.device
            )));
        }

        plan.validate()?;

        let encrypted_role = plan.partitions.iter().find(|p| p.encrypted).map(|p| p.role);
        let encryption = match (encrypted_role, encryption) {
            (Some(Role::Root), Some(enc)) => {
                if enc.passphrase.is_empty() {
                    return Err(ProvError::BadConfig("empty luks passphrase".to_string()));
                }
                Some(enc)
            }
            (Some(Role::Root), None) => {
                return Err(ProvError::BadConfig(
                    "root is to be encrypted, but no passphrase was supplied".to_string(),
                ))
            }
            (Some(role), _) => {
                return Err(ProvError::ProvRsBug(format!(
                    "only root may be encrypted, got encrypted {role}"
                )))
            }
            (None, _) => None,
        };

        log::info!("writing {} partition table to {device}", plan.table);
        self.ops
            .create_table(device, plan.table)
            .map_err(|err| ProvError::layout(LayoutStage::WriteTable, err))?;

        let mut raw_names: Vec<(Role, String)> = Vec::with_capacity(plan.partitions.len());
        for (n, part) in plan.partitions.iter().enumerate() {
            let number = u8::try_from(n + 1)
                .map_err(|_| ProvError::ProvRsBug(format!("too many partitions: {}", n + 1)))?;

            let name = self
                .ops
                .create_partition(device, plan, number, part)
                .map_err(|err| ProvError::layout(LayoutStage::CreatePartition(part.role), err))?;

            log::info!("created {} partition {name}", part.role);
            raw_names.push((part.role, name));
        }

        let mut entries: Vec<(Role, RoleEntry)> = Vec::with_capacity(raw_names.len());
        for (role, raw) in raw_names {
            let entry = match (role, encryption) {
                (Role::Root, Some(enc)) => self.open_container(&raw, enc)?,
                _ => RoleEntry::new(raw),
            };

            entries.push((role, entry));
        }

        let mut role_map = RoleMap::default();

        for (role, entry) in entries {
            // Encrypted root is formatted through its mapped device only
            let fs = role.filesystem();
            log::info!("formatting {role} {} as {fs}", entry.device);
            self.ops
                .mkfs(&entry.device, fs)
                .map_err(|err| ProvError::layout(LayoutStage::Format(role), err))?;

            role_map.record(role, entry)?;
        }

        role_map.validate()?;

        Ok(role_map)
    }

    fn open_container(&mut self, raw: &str, enc: &Encryption) -> Result<RoleEntry, ProvError> {
        log::info!("creating luks container on {raw}");
        self.ops
            .luks_format(raw, enc.passphrase)
            .map_err(|err| ProvError::layout(LayoutStage::FormatContainer, err))?;

        let mapped = self
            .ops
            .luks_open(raw, enc.passphrase, enc.mapped_name)
            .map_err(|err| ProvError::layout(LayoutStage::OpenContainer, err))?;

        log::info!("opened luks container {raw} as {mapped}");

        Ok(RoleEntry {
            device: mapped,
            container: Some(Container {
                raw_device: raw.to_string(),
                name: enc.mapped_name.to_string(),
                uuid: None,
            }),
            uuid: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::layout::MIB;
    use crate::disk::ops::fakes::RecordingOps;
    use crate::disk::plan::{
        plan,
        Geometry,
        SizeSpec,
    };
    use crate::disk::{
        Filesystem,
        PartitionTable,
    };

    const GIB: u64 = 1024 * MIB;

    fn test_plan(device: &str, encrypt_root: bool) -> LayoutPlan {
        let spec = SizeSpec {
            device: device.to_string(),
            table: PartitionTable::Gpt,
            efi_size: 512 * MIB,
            boot_size: GIB,
            swap_size: 8 * GIB,
            encrypt_root,
        };

        let geometry = Geometry {
            capacity: 100 * GIB,
            alignment: MIB,
            sector_size: 512,
        };

        plan(&spec, &geometry).unwrap()
    }

    const ENC: Encryption = Encryption {
        passphrase: "pass1234",
        mapped_name: "cryptroot",
    };

    #[test]
    fn test_execute_plain_layout() {
        let mut ops = RecordingOps::default();
        let plan = test_plan("/dev/nvme0n1", false);

        let role_map = DiskLayoutEngine::new(&mut ops)
            .execute(&plan, "/dev/nvme0n1", None)
            .unwrap();

        assert_eq!(
            ops.calls,
            vec![
                "table /dev/nvme0n1 gpt",
                "partition /dev/nvme0n1 1 efi",
                "partition /dev/nvme0n1 2 boot",
                "partition /dev/nvme0n1 3 swap",
                "partition /dev/nvme0n1 4 root",
                "mkfs /dev/nvme0n1p1 fat32",
                "mkfs /dev/nvme0n1p2 ext4",
                "mkfs /dev/nvme0n1p3 linux-swap",
                "mkfs /dev/nvme0n1p4 ext4",
            ]
        );

        assert!(role_map.is_complete());
        assert_eq!(role_map.device(Role::Root).unwrap(), "/dev/nvme0n1p4");
        assert_eq!(role_map.device(Role::Swap).unwrap(), "/dev/nvme0n1p3");
        assert!(role_map.get(Role::Root).unwrap().container.is_none());
    }

    #[test]
    fn test_execute_encrypted_root_formats_mapped_device_only() {
        let mut ops = RecordingOps::default();
        let plan = test_plan("/dev/sda", true);

        let role_map = DiskLayoutEngine::new(&mut ops)
            .execute(&plan, "/dev/sda", Some(&ENC))
            .unwrap();

        let root_formats: Vec<&(String, Filesystem)> = ops
            .formatted
            .iter()
            .filter(|(target, _)| target.contains("crypt") || target == "/dev/sda4")
            .collect();

        assert_eq!(
            root_formats,
            vec![&("/dev/mapper/cryptroot".to_string(), Filesystem::Ext4)]
        );
        assert!(!ops.formatted.iter().any(|(target, _)| target == "/dev/sda4"));

        let root = role_map.get(Role::Root).unwrap();
        assert_eq!(root.device, "/dev/mapper/cryptroot");

        let container = root.container.as_ref().unwrap();
        assert_eq!(container.raw_device, "/dev/sda4");
        assert_eq!(container.name, "cryptroot");

        // The secret never ends up in the role map
        let serialized = serde_json::to_string(&role_map).unwrap();
        assert!(!serialized.contains("pass1234"));
    }

    #[test]
    fn test_execute_stops_at_failed_stage() {
        let tests = [
            ("table", LayoutStage::WriteTable, 1),
            ("partition /dev/sda 3", LayoutStage::CreatePartition(Role::Swap), 4),
            ("luksFormat", LayoutStage::FormatContainer, 6),
            ("luksOpen", LayoutStage::OpenContainer, 7),
            ("mkfs /dev/sda2", LayoutStage::Format(Role::Boot), 9),
        ];

        for (fail_on, expected_stage, expected_calls) in tests {
            let mut ops = RecordingOps::failing_on(fail_on);
            let plan = test_plan("/dev/sda", true);

            let result = DiskLayoutEngine::new(&mut ops).execute(&plan, "/dev/sda", Some(&ENC));

            match result {
                Err(ProvError::LayoutError { stage, cause }) => {
                    assert_eq!(stage, expected_stage, "failing on {fail_on}");
                    assert!(cause.to_string().contains("fake failure"));
                }
                other => panic!("expecting LayoutError for {fail_on}, got {other:?}"),
            }

            assert_eq!(ops.calls.len(), expected_calls, "calls: {:?}", ops.calls);
        }
    }

    #[test]
    fn test_execute_rejects_before_destruction() {
        // Missing passphrase for encrypted root
        let mut ops = RecordingOps::default();
        let plan = test_plan("/dev/sda", true);
        let result = DiskLayoutEngine::new(&mut ops).execute(&plan, "/dev/sda", None);
        assert!(matches!(result, Err(ProvError::BadConfig(_))));
        assert!(ops.calls.is_empty());

        // Empty passphrase
        let empty = Encryption {
            passphrase: "",
            mapped_name: "cryptroot",
        };
        let result = DiskLayoutEngine::new(&mut ops).execute(&plan, "/dev/sda", Some(&empty));
        assert!(matches!(result, Err(ProvError::BadConfig(_))));
        assert!(ops.calls.is_empty());

        // Plan for another device
        let result = DiskLayoutEngine::new(&mut ops).execute(&plan, "/dev/sdb", Some(&ENC));
        assert!(result.is_err());
        assert!(ops.calls.is_empty());
    }
}
