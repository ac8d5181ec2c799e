use crate::disk::plan::{
    LayoutPlan,
    PartitionSpec,
};
use crate::disk::{
    PartitionTable,
    Role,
};
use crate::errors::ProvError;
use crate::utils::shell;

/// sfdisk script creating an empty `table`
pub fn create_table_cmd(table: PartitionTable) -> String {
    format!("label: {table}\n")
}

/// sfdisk script line appending `part` of `plan`.
///
/// sfdisk reads unitless values in the device's logical sectors, so
/// both offset and size are given in `plan.sector_size` units. Root
/// gets its planned size too, or sfdisk would run it to the last
/// usable LBA instead of the plan's usable end.
pub fn create_partition_cmd(plan: &LayoutPlan, part: &PartitionSpec) -> String {
    let start = part.start_offset / plan.sector_size;
    let size = plan.effective_size(part) / plan.sector_size;

    format!(
        "start={start}, size={size}, type={}\n",
        partition_type(part.role)
    )
}

/// sfdisk type shortcuts, valid for both GPT and DOS labels
fn partition_type(role: Role) -> &'static str {
    match role {
        Role::Efi => "U",
        Role::Swap => "S",
        Role::Boot | Role::Root => "L",
    }
}

pub fn run_create_table(device: &str, table: PartitionTable) -> Result<(), ProvError> {
    shell::exec_stdin(
        "sfdisk",
        &["--wipe", "always", device],
        &create_table_cmd(table),
    )
    .map(|_| ())
}

pub fn run_append_partition(
    device: &str,
    plan: &LayoutPlan,
    part: &PartitionSpec,
) -> Result<(), ProvError> {
    shell::exec_stdin(
        "sfdisk",
        &["--append", "--wipe-partitions", "always", device],
        &create_partition_cmd(plan, part),
    )
    .map(|_| ())
}
