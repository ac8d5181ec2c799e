use crate::cli;
use crate::disk::ops::BlockProbe;
use crate::disk::plan::{
    self,
    Geometry,
    LayoutPlan,
};
use crate::errors::ProvError;
use crate::linux;
use crate::settings::ConfigStore;

pub(super) fn run(store: &ConfigStore, args: cli::ArgsPlan) -> Result<(), ProvError> {
    let settings = store.load()?;
    let spec = settings.size_spec()?;

    let layout = layout_plan(&spec, &args, &linux::Host)?;
    println!("{layout}");

    Ok(())
}

/// Plans against the given geometry, probing the device
/// only for the values not overridden on the command line
fn layout_plan(
    spec: &plan::SizeSpec,
    args: &cli::ArgsPlan,
    probe: &dyn BlockProbe,
) -> Result<LayoutPlan, ProvError> {
    let capacity = match args.capacity {
        Some(capacity) => capacity,
        None => probe.capacity(&spec.device)?,
    };

    let alignment = match args.alignment {
        Some(alignment) => alignment,
        None => probe.alignment(&spec.device)?,
    };

    let sector_size = match args.sector_size {
        Some(sector_size) => sector_size,
        None => probe.sector_size(&spec.device)?,
    };

    let geometry = Geometry {
        capacity,
        alignment,
        sector_size,
    };

    plan::plan(spec, &geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::layout::MIB;
    use crate::disk::ops::fakes::StaticProbe;
    use crate::disk::{
        PartitionTable,
        Role,
    };

    fn spec() -> plan::SizeSpec {
        plan::SizeSpec {
            device: "/dev/vda".into(),
            table: PartitionTable::Gpt,
            efi_size: 512 * MIB,
            boot_size: 512 * MIB,
            swap_size: 2048 * MIB,
            encrypt_root: false,
        }
    }

    #[test]
    fn test_overrides_skip_probing() {
        let probe = StaticProbe {
            capacity: 1,
            alignment: 1,
            sector_size: 1,
            ..Default::default()
        };

        let args = cli::ArgsPlan {
            capacity: Some(16384 * MIB),
            alignment: Some(MIB),
            sector_size: Some(4096),
        };

        let layout = layout_plan(&spec(), &args, &probe).unwrap();
        assert_eq!(layout.capacity, 16384 * MIB);
        assert_eq!(layout.sector_size, 4096);
        assert_eq!(layout.get(Role::Efi).unwrap().start_offset, MIB);
    }

    #[test]
    fn test_probes_missing_geometry() {
        let probe = StaticProbe {
            capacity: 1024 * MIB,
            alignment: MIB,
            ..Default::default()
        };

        let err = layout_plan(&spec(), &cli::ArgsPlan::default(), &probe).unwrap_err();
        assert!(matches!(err, ProvError::InsufficientCapacity { .. }), "{err}");
    }
}
