use super::RunContext;
use crate::disk::engine::{
    DiskLayoutEngine,
    Encryption,
};
use crate::disk::ops::{
    BlockProbe,
    DiskOps,
};
use crate::disk::plan::{
    plan,
    Geometry,
    LayoutPlan,
    SizeSpec,
};
use crate::disk::rolemap::{
    self,
    RoleMap,
};
use crate::disk::Role;
use crate::errors::ProvError;
use crate::linux::mount;

/// Lays out the configured device and records the resulting role map.
///
/// Skips if the store already holds a complete role map for the device,
/// so that re-running provisioning after a later failure does not wipe
/// the disk a second time.
pub(super) fn prepare_disk<D, P>(
    ctx: &mut RunContext,
    ops: &mut D,
    probe: &P,
) -> Result<(), ProvError>
where
    D: DiskOps,
    P: BlockProbe,
{
    let spec = ctx.settings.size_spec()?;

    if let Some(role_map) = recorded_layout(ctx, &spec.device)? {
        log::info!(
            "{} already laid out (root on {}), skipping",
            spec.device,
            role_map.device(Role::Root)?
        );

        return Ok(());
    }

    let plan = plan_for(&spec.device, &spec, probe)?;
    log::info!("layout plan:\n{plan}");

    let passphrase = ctx.settings.passphrase()?;

    // Everything above is side-effect free
    ctx.take_confirmation(&spec.device)?;

    let encryption = passphrase.as_deref().map(|passphrase| Encryption {
        passphrase,
        mapped_name: ctx.settings.mapped_name(),
    });

    let role_map = DiskLayoutEngine::new(ops).execute(&plan, &spec.device, encryption.as_ref())?;

    // Recorded before any other step may run
    rolemap::persist(&role_map, ctx.store)?;
    log::info!("role map recorded to {}", ctx.store.path().display());

    ctx.settings.role_map = Some(role_map);

    Ok(())
}

/// Plans against the real geometry and walks the engine with `ops`,
/// without consuming the confirmation or persisting anything
pub(super) fn preview_disk<D, P>(ctx: &RunContext, ops: &mut D, probe: &P) -> Result<(), ProvError>
where
    D: DiskOps,
    P: BlockProbe,
{
    let spec = ctx.settings.size_spec()?;
    let plan = plan_for(&spec.device, &spec, probe)?;
    log::info!("[dry-run] layout plan:\n{plan}");

    let encryption = spec.encrypt_root.then(|| Encryption {
        passphrase: "<passphrase>",
        mapped_name: ctx.settings.mapped_name(),
    });

    DiskLayoutEngine::new(ops)
        .execute(&plan, &spec.device, encryption.as_ref())
        .map(|_| ())
}

fn plan_for<P: BlockProbe>(
    device: &str,
    spec: &SizeSpec,
    probe: &P,
) -> Result<LayoutPlan, ProvError> {
    let geometry = Geometry {
        capacity: probe.capacity(device)?,
        alignment: probe.alignment(device)?,
        sector_size: probe.sector_size(device)?,
    };

    plan(spec, &geometry)
}

/// The stored role map, if it is complete and was created on `device`
fn recorded_layout(ctx: &RunContext, device: &str) -> Result<Option<RoleMap>, ProvError> {
    let role_map = match ctx.store.load()?.role_map {
        Some(role_map) if role_map.is_complete() => role_map,
        _ => return Ok(None),
    };

    let on_device = role_map.iter().all(|(_, entry)| {
        let raw = entry
            .container
            .as_ref()
            .map(|c| c.raw_device.as_str())
            .unwrap_or(entry.device.as_str());

        is_partition_of(raw, device)
    });

    if !on_device {
        return Err(ProvError::BadConfig(format!(
            "recorded role map does not belong to {device}, remove it from {} to re-partition",
            ctx.store.path().display()
        )));
    }

    Ok(Some(role_map))
}

fn is_partition_of(partition: &str, device: &str) -> bool {
    let Some(rest) = partition.strip_prefix(device) else {
        return false;
    };

    // Same naming rule as linux::partition_name
    let number = match device.chars().last() {
        Some(c) if c.is_ascii_digit() => rest.strip_prefix('p'),
        _ => Some(rest),
    };

    matches!(number, Some(n) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Mounts the recorded layout under the install location.
/// Mounts and swaps already active are left alone.
pub(super) fn mount_layout(ctx: &RunContext) -> Result<(), ProvError> {
    let role_map = rolemap::load(ctx.store)?;
    let mounts = mount::read_proc(mount::PROC_MOUNTS)?;
    let swaps = mount::read_proc(mount::PROC_SWAPS)?;

    for (role, dst) in mount_order(&ctx.install_location) {
        let device = role_map.device(role)?;

        if mount::is_mounted(&mounts, &dst) {
            log::info!("{dst} already mounted, skipping {role}");
            continue;
        }

        log::info!("mounting {role} {device} on {dst}");
        mount::mount_fs(device, &dst, None)?;
    }

    let swap = role_map.device(Role::Swap)?;
    if mount::is_swap_active(&swaps, swap) {
        log::info!("swap {swap} already active");
        return Ok(());
    }

    mount::swapon(swap)
}

/// Root first, since the others are mounted inside it
fn mount_order(install_location: &str) -> [(Role, String); 3] {
    let base = install_location.trim_end_matches('/');

    [
        (Role::Root, install_location.to_string()),
        (Role::Boot, format!("{base}/boot")),
        (Role::Efi, format!("{base}/efi")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::layout::MIB;
    use crate::disk::ops::fakes::{
        RecordingOps,
        StaticProbe,
    };
    use crate::disk::Size;
    use crate::settings::{
        ConfigStore,
        Settings,
        SettingsEncryption,
    };

    fn settings(encrypted: bool) -> Settings {
        Settings {
            device: Some("/dev/sda".into()),
            efi_size: Some(Size::Human("512MiB".into())),
            boot_size: Some(Size::Human("1GiB".into())),
            swap_size: Some(Size::Human("8GiB".into())),
            encryption: Some(SettingsEncryption {
                enabled: encrypted,
                passphrase: Some("pass1234".into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn probe() -> StaticProbe {
        StaticProbe {
            capacity: 100 * 1024 * MIB,
            alignment: MIB,
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_disk_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("settings.json"));
        let mut ctx = RunContext::new(&store, settings(false), "/mnt".into());
        let mut ops = RecordingOps::default();

        let result = prepare_disk(&mut ctx, &mut ops, &probe());

        assert!(matches!(result, Err(ProvError::NotConfirmed(_))));
        assert!(ops.calls.is_empty());
        assert!(store.load().unwrap().role_map.is_none());
    }

    #[test]
    fn test_prepare_disk_persists_then_skips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("settings.json"));
        let mut ctx = RunContext::new(&store, settings(true), "/mnt".into());
        let mut ops = RecordingOps::default();

        ctx.confirm("/dev/sda");
        prepare_disk(&mut ctx, &mut ops, &probe()).unwrap();

        let recorded = rolemap::load(&store).unwrap();
        assert_eq!(recorded.device(Role::Root).unwrap(), "/dev/mapper/cryptroot");
        assert_eq!(ctx.settings.role_map.as_ref(), Some(&recorded));

        // Passphrase stays in settings, never in the role map
        let content = std::fs::read_to_string(store.path()).unwrap();
        let role_map_json = serde_json::to_string(&recorded).unwrap();
        assert!(!role_map_json.contains("pass1234"));
        assert!(content.contains("role_map"));

        // Second run: no confirmation left, but nothing to do either
        let calls = ops.calls.len();
        prepare_disk(&mut ctx, &mut ops, &probe()).unwrap();
        assert_eq!(ops.calls.len(), calls);
    }

    #[test]
    fn test_prepare_disk_planning_error_before_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("settings.json"));
        let mut ctx = RunContext::new(&store, settings(false), "/mnt".into());
        let mut ops = RecordingOps::default();

        ctx.confirm("/dev/sda");
        let small = StaticProbe {
            capacity: 8 * 1024 * MIB,
            alignment: MIB,
            ..Default::default()
        };

        let result = prepare_disk(&mut ctx, &mut ops, &small);
        assert!(matches!(result, Err(ProvError::InsufficientCapacity { .. })));
        assert!(ops.calls.is_empty());

        // Confirmation was not consumed by the failed planning
        assert!(ctx.take_confirmation("/dev/sda").is_ok());
    }

    #[test]
    fn test_prepare_disk_missing_passphrase_keeps_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("settings.json"));

        let mut no_passphrase = settings(true);
        no_passphrase.encryption = Some(SettingsEncryption {
            enabled: true,
            ..Default::default()
        });

        let mut ctx = RunContext::new(&store, no_passphrase, "/mnt".into());
        let mut ops = RecordingOps::default();
        ctx.confirm("/dev/sda");

        let result = prepare_disk(&mut ctx, &mut ops, &probe());
        assert!(matches!(result, Err(ProvError::BadConfig(_))), "{result:?}");
        assert!(ops.calls.is_empty());
        assert!(ctx.take_confirmation("/dev/sda").is_ok());
    }

    #[test]
    fn test_prepare_disk_rejects_foreign_role_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("settings.json"));

        {
            let mut ctx = RunContext::new(&store, settings(false), "/mnt".into());
            ctx.confirm("/dev/sda");
            prepare_disk(&mut ctx, &mut RecordingOps::default(), &probe()).unwrap();
        }

        let mut other = settings(false);
        other.device = Some("/dev/nvme0n1".into());
        let mut ctx = RunContext::new(&store, other, "/mnt".into());
        ctx.confirm("/dev/nvme0n1");

        let mut ops = RecordingOps::default();
        assert!(prepare_disk(&mut ctx, &mut ops, &probe()).is_err());
        assert!(ops.calls.is_empty());
    }

    #[test]
    fn test_preview_disk_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("settings.json"));
        let ctx = RunContext::new(&store, settings(true), "/mnt".into());
        let mut ops = RecordingOps::default();

        preview_disk(&ctx, &mut ops, &probe()).unwrap();

        assert_eq!(ops.calls.len(), 11);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_is_partition_of() {
        assert!(is_partition_of("/dev/sda4", "/dev/sda"));
        assert!(is_partition_of("/dev/nvme0n1p2", "/dev/nvme0n1"));
        assert!(!is_partition_of("/dev/sdab1", "/dev/sda"));
        assert!(!is_partition_of("/dev/sda", "/dev/sda"));
        assert!(!is_partition_of("/dev/sdb1", "/dev/sda"));

        // Separator is required exactly when the device ends in a digit
        assert!(!is_partition_of("/dev/nvme0n11", "/dev/nvme0n1"));
        assert!(!is_partition_of("/dev/nvme0n1p", "/dev/nvme0n1"));
        assert!(!is_partition_of("/dev/sdap1", "/dev/sda"));
        assert!(is_partition_of("/dev/loop0p3", "/dev/loop0"));
    }

    #[test]
    fn test_mount_order() {
        let order = mount_order("/mnt/");
        assert_eq!(order[0], (Role::Root, "/mnt/".to_string()));
        assert_eq!(order[1], (Role::Boot, "/mnt/boot".to_string()));
        assert_eq!(order[2], (Role::Efi, "/mnt/efi".to_string()));
    }
}
