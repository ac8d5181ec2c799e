use super::RunContext;
use crate::errors::ProvError;
use crate::steps::action::ActionService;
use crate::utils::shell;

pub(super) fn apply(ctx: &RunContext, action: &ActionService) -> Result<(), ProvError> {
    match action {
        ActionService::EnableService { service } => enable(ctx, service),
    }
}

/// Enables `service` in the new system. Enabling twice is a no-op.
pub(super) fn enable(ctx: &RunContext, service: &str) -> Result<(), ProvError> {
    shell::chroot(&ctx.install_location, "systemctl", &["enable", service]).map(|_| ())
}

/// Stops and disables units on the live system
pub(super) fn disable_live(units: &[&str]) -> Result<(), ProvError> {
    let mut args = vec!["disable", "--now"];
    args.extend_from_slice(units);

    shell::exec("systemctl", &args)
}
