use dialoguer::console::Term;
use dialoguer::Confirm;

use crate::apply::{
    DryRunExecutor,
    RunContext,
    SystemExecutor,
};
use crate::cli;
use crate::constants::REQUIRED_COMMANDS;
use crate::errors::ProvError;
use crate::linux;
use crate::linux::lock::DeviceLock;
use crate::settings::{
    ConfigStore,
    Settings,
};
use crate::steps::action::ActionDisk;
use crate::steps::{
    self,
    Action,
    Orchestrator,
    RunReport,
    Step,
};
use crate::utils::shell;

pub(super) fn run(
    store: &ConfigStore,
    location: &str,
    dry_run: bool,
    args: &cli::ArgsApply,
) -> Result<RunReport, ProvError> {
    let settings = store.load()?;
    let steps = steps::resolve_steps(&settings);

    if !dry_run && !linux::user::is_root() {
        super::warn("running as non-root user");
    }

    let missing = missing_commands(shell::in_path);
    if !missing.is_empty() {
        super::warn(&format!("commands not found: {}", missing.join(", ")));
    }

    let device = settings.device.clone();

    // Held until the run is over
    let lock = match (&device, dry_run) {
        (Some(device), false) => Some(DeviceLock::acquire(device)?),
        _ => None,
    };

    if let Some(lock) = &lock {
        log::info!("holding device lock {}", lock.path().display());
    }

    let wipe = match (&device, dry_run) {
        (Some(device), false) if wipes_device(&settings, &steps) => {
            confirm_wipe(device, args.yes)?;
            Some(device.clone())
        }
        _ => None,
    };

    let mut ctx = RunContext::new(store, settings, location.to_string());
    if let Some(device) = wipe {
        ctx.confirm(&device);
    }

    let report = match dry_run {
        true => {
            let mut executor = DryRunExecutor::new(ctx, linux::Host);
            Orchestrator::new(&mut executor).run(&steps)
        }
        false => {
            let mut executor = SystemExecutor::host(ctx);
            Orchestrator::new(&mut executor).run(&steps)
        }
    };

    Ok(report)
}

/// Whether the run will partition the device,
/// i.e. it has a disk step and no layout was recorded yet
fn wipes_device(settings: &Settings, steps: &[Step]) -> bool {
    let prepares = steps
        .iter()
        .any(|step| step.action == Action::Disk(ActionDisk::PrepareDisk));

    let recorded = settings
        .role_map
        .as_ref()
        .map(|role_map| role_map.is_complete())
        .unwrap_or(false);

    prepares && !recorded
}

fn confirm_wipe(device: &str, yes: bool) -> Result<(), ProvError> {
    if yes {
        return Ok(());
    }

    if !Term::stderr().is_term() {
        return Err(ProvError::NotConfirmed(format!(
            "standard error is not a terminal, use --yes to confirm wiping {device}"
        )));
    }

    let confirmed = Confirm::new()
        .with_prompt(format!(
            "All of the data on {device} will be lost. Do you want to continue?"
        ))
        .default(false)
        .interact()
        .map_err(|err| ProvError::NotConfirmed(format!("no answer: {err}")))?;

    match confirmed {
        true => Ok(()),
        false => Err(ProvError::NotConfirmed("operation canceled".to_string())),
    }
}

fn missing_commands<F: Fn(&str) -> bool>(in_path: F) -> Vec<&'static str> {
    REQUIRED_COMMANDS
        .iter()
        .copied()
        .filter(|cmd| !in_path(*cmd))
        .collect()
}
