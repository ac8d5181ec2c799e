use crate::cli;
use crate::disk::rolemap;
use crate::errors::ProvError;
use crate::linux;
use crate::settings::ConfigStore;

pub(super) fn run(store: &ConfigStore, args: cli::ArgsUuid) -> Result<(), ProvError> {
    let uuid = rolemap::resolve_uuid(store, args.role, &linux::Host)?;
    println!("{uuid}");

    Ok(())
}
