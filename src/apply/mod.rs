mod bootloader;
mod disks;
mod files;
mod packages;
mod services;
mod system;

use crate::disk::ops::{
    BlockProbe,
    DiskOps,
};
use crate::errors::ProvError;
use crate::linux;
use crate::settings::{
    ConfigStore,
    Settings,
};
use crate::steps::action::{
    ActionBootstrap,
    ActionDisk,
};
use crate::steps::{
    Action,
    Executor,
};

/// Explicit configuration context handed to every collaborator.
///
/// `settings` is read once at startup; derived facts are written
/// back only through the role map persistence in [crate::disk::rolemap].
pub struct RunContext<'a> {
    pub store: &'a ConfigStore,
    pub settings: Settings,
    pub install_location: String,
    confirmed_device: Option<String>,
}

impl<'a> RunContext<'a> {
    pub fn new(store: &'a ConfigStore, settings: Settings, install_location: String) -> Self {
        Self {
            store,
            settings,
            install_location,
            confirmed_device: None,
        }
    }

    /// Records the operator's one-time consent to wipe `device`
    pub fn confirm(&mut self, device: &str) {
        self.confirmed_device = Some(device.to_string());
    }

    /// Consumes the wipe confirmation for `device`.
    /// A confirmation is good for exactly one destructive act.
    pub fn take_confirmation(&mut self, device: &str) -> Result<(), ProvError> {
        match self.confirmed_device.take() {
            Some(confirmed) if confirmed == device => Ok(()),
            Some(confirmed) => Err(ProvError::NotConfirmed(format!(
                "confirmation was given for {confirmed}, not {device}"
            ))),
            None => Err(ProvError::NotConfirmed(format!(
                "wiping {device} was not confirmed"
            ))),
        }
    }

    /// Path of `path` inside the new system
    pub fn target(&self, path: &str) -> String {
        crate::utils::fs::prepend_base(&self.install_location, path)
    }
}

/// Executes actions against the live host and the new system
pub struct SystemExecutor<'a, D: DiskOps, P: BlockProbe> {
    ctx: RunContext<'a>,
    ops: D,
    probe: P,
}

impl<'a> SystemExecutor<'a, linux::Host, linux::Host> {
    pub fn host(ctx: RunContext<'a>) -> Self {
        Self::new(ctx, linux::Host, linux::Host)
    }
}

impl<'a, D: DiskOps, P: BlockProbe> SystemExecutor<'a, D, P> {
    pub fn new(ctx: RunContext<'a>, ops: D, probe: P) -> Self {
        Self { ctx, ops, probe }
    }
}

impl<D: DiskOps, P: BlockProbe> Executor for SystemExecutor<'_, D, P> {
    fn execute(&mut self, step_name: &str, action: &Action) -> Result<(), ProvError> {
        log::debug!("{step_name}: {}", describe(action));

        let ctx = &mut self.ctx;

        match action {
            Action::Disk(ActionDisk::PrepareDisk) => {
                disks::prepare_disk(ctx, &mut self.ops, &self.probe)
            }
            Action::Disk(ActionDisk::MountLayout) => disks::mount_layout(ctx),
            Action::Bootstrap(ActionBootstrap::Pacstrap) => packages::pacstrap(ctx),
            Action::Bootstrap(ActionBootstrap::GenFstab) => system::genfstab(ctx),
            Action::Packages(action) => packages::apply(ctx, action),
            Action::Service(action) => services::apply(ctx, action),
            Action::File(action) => files::apply(ctx, action),
            Action::System(action) => system::apply(ctx, action, &self.probe),
        }
    }
}

/// Logs every action instead of executing it. Disk preparation is
/// still planned against the real device geometry, so that sizing
/// mistakes surface before the real run.
pub struct DryRunExecutor<'a, P: BlockProbe> {
    ctx: RunContext<'a>,
    probe: P,
}

impl<'a, P: BlockProbe> DryRunExecutor<'a, P> {
    pub fn new(ctx: RunContext<'a>, probe: P) -> Self {
        Self { ctx, probe }
    }
}

impl<P: BlockProbe> Executor for DryRunExecutor<'_, P> {
    fn execute(&mut self, step_name: &str, action: &Action) -> Result<(), ProvError> {
        log::info!("[dry-run] {step_name}: {}", describe(action));

        match action {
            Action::Disk(ActionDisk::PrepareDisk) => {
                disks::preview_disk(&self.ctx, &mut linux::DryRun, &self.probe)
            }
            _ => Ok(()),
        }
    }
}

fn describe(action: &Action) -> String {
    serde_json::to_string(action).unwrap_or_else(|_| format!("{action:?}"))
}
