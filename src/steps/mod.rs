pub mod action;
pub mod orchestrator;
pub mod report;

use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};

pub use self::action::Action;
use self::action::{
    ActionBootstrap,
    ActionDisk,
    ActionSystem,
};
pub use self::orchestrator::{
    Executor,
    Orchestrator,
};
pub use self::report::RunReport;
use crate::settings::Settings;

/// One named unit of provisioning work, executed at most once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub action: Action,

    #[serde(default, alias = "policy")]
    pub failure_policy: FailurePolicy,
}

impl Step {
    pub fn new<A: Into<Action>>(name: &str, action: A, failure_policy: FailurePolicy) -> Self {
        Self {
            name: name.to_string(),
            action: action.into(),
            failure_policy,
        }
    }

    pub fn fatal<A: Into<Action>>(name: &str, action: A) -> Self {
        Self::new(name, action, FailurePolicy::Fatal)
    }

    pub fn warn<A: Into<Action>>(name: &str, action: A) -> Self {
        Self::new(name, action, FailurePolicy::WarnAndContinue)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    #[default]
    #[serde(rename = "fatal")]
    Fatal,

    #[serde(rename = "warn-and-continue", alias = "warn")]
    WarnAndContinue,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::WarnAndContinue => write!(f, "warn-and-continue"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    #[serde(rename = "pending")]
    Pending,

    #[serde(rename = "running")]
    Running,

    #[serde(rename = "succeeded")]
    Succeeded,

    #[serde(rename = "failed")]
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[serde(rename = "inProgress")]
    InProgress,

    #[serde(rename = "completed")]
    Completed,

    #[serde(rename = "aborted")]
    Aborted,
}

/// Resolves the ordered step list for a run: the declared `steps`
/// or the built-in list, followed by `extra_steps`.
///
/// With an encrypted root the hibernation step also installs the
/// `encrypt` initramfs hook the bootloader entry depends on, so it
/// is always fatal there.
pub fn resolve_steps(settings: &Settings) -> Vec<Step> {
    let mut steps = match &settings.steps {
        Some(steps) => steps.clone(),
        None => default_steps(),
    };

    if let Some(extra) = &settings.extra_steps {
        steps.extend(extra.iter().cloned());
    }

    if settings.encrypt_root() {
        steps
            .iter_mut()
            .filter(|step| step.action == Action::System(ActionSystem::Hibernation))
            .for_each(|step| step.failure_policy = FailurePolicy::Fatal);
    }

    steps
}

/// The built-in Arch Linux installation sequence
pub fn default_steps() -> Vec<Step> {
    vec![
        Step::warn("disable-reflector", ActionSystem::DisableReflector),
        Step::warn("update-clock", ActionSystem::UpdateClock),
        Step::warn("setup-mirrors", ActionSystem::SetupMirrors),
        Step::fatal("prepare-disk", ActionDisk::PrepareDisk),
        Step::fatal("mount-layout", ActionDisk::MountLayout),
        Step::fatal("pacstrap", ActionBootstrap::Pacstrap),
        Step::fatal("genfstab", ActionBootstrap::GenFstab),
        Step::warn("timezone", ActionSystem::Timezone),
        Step::warn("localization", ActionSystem::Localization),
        Step::warn("multilib", ActionSystem::EnableMultilib),
        Step::fatal("network", ActionSystem::Network),
        Step::fatal("root-password", ActionSystem::RootPassword),
        Step::fatal("add-user", ActionSystem::AddUser),
        Step::warn("sudo-wheel", ActionSystem::SudoWheel),
        Step::warn("sudo-timeout", ActionSystem::SudoTimeout),
        Step::warn("hibernation", ActionSystem::Hibernation),
        Step::fatal("bootloader", ActionSystem::Bootloader),
    ]
}
