use serde::{
    Deserialize,
    Serialize,
};

/// A typed reference to one named operation with its arguments.
///
/// Built-in actions take their parameters from the run's settings;
/// generic actions carry them inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Action {
    Disk(ActionDisk),
    Bootstrap(ActionBootstrap),
    Packages(ActionPackages),
    Service(ActionService),
    File(ActionFile),
    System(ActionSystem),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionDisk {
    /// Plan, partition, encrypt and format the target device,
    /// then persist the resulting role map
    #[serde(rename = "prepareDisk")]
    PrepareDisk,

    #[serde(rename = "mountLayout")]
    MountLayout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionBootstrap {
    #[serde(rename = "pacstrap")]
    Pacstrap,

    #[serde(rename = "genfstab")]
    GenFstab,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionPackages {
    #[serde(rename = "installPackages")]
    InstallPackages { packages: Vec<String> },

    /// One package per line; blank lines and `#` comments are skipped
    #[serde(rename = "installPackagesFromFile")]
    InstallPackagesFromFile { file: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionService {
    #[serde(rename = "enableService")]
    EnableService { service: String },
}

/// Edits of files in the new system. Paths are absolute paths
/// inside the new system, not on the live system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionFile {
    #[serde(rename = "replacePattern")]
    ReplacePattern {
        file: String,
        pattern: String,
        replacement: String,
    },

    #[serde(rename = "appendLines")]
    AppendLines { file: String, lines: Vec<String> },

    #[serde(rename = "writeFile")]
    WriteFile { file: String, content: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionSystem {
    #[serde(rename = "disableReflector")]
    DisableReflector,

    #[serde(rename = "updateClock")]
    UpdateClock,

    #[serde(rename = "setupMirrors")]
    SetupMirrors,

    #[serde(rename = "timezone")]
    Timezone,

    #[serde(rename = "localization")]
    Localization,

    #[serde(rename = "enableMultilib")]
    EnableMultilib,

    #[serde(rename = "network")]
    Network,

    #[serde(rename = "rootPassword")]
    RootPassword,

    #[serde(rename = "addUser")]
    AddUser,

    #[serde(rename = "sudoWheel")]
    SudoWheel,

    #[serde(rename = "sudoTimeout")]
    SudoTimeout,

    #[serde(rename = "hibernation")]
    Hibernation,

    #[serde(rename = "bootloader")]
    Bootloader,

    #[serde(rename = "addUserToGroups")]
    AddUserToGroups {
        user: Option<String>,
        groups: Vec<String>,
    },

    /// Runs argv directly (no shell), optionally inside the new system
    #[serde(rename = "command")]
    Command {
        argv: Vec<String>,

        #[serde(default)]
        chroot: bool,
    },
}

impl From<ActionDisk> for Action {
    fn from(action: ActionDisk) -> Self {
        Self::Disk(action)
    }
}

impl From<ActionBootstrap> for Action {
    fn from(action: ActionBootstrap) -> Self {
        Self::Bootstrap(action)
    }
}

impl From<ActionPackages> for Action {
    fn from(action: ActionPackages) -> Self {
        Self::Packages(action)
    }
}

impl From<ActionService> for Action {
    fn from(action: ActionService) -> Self {
        Self::Service(action)
    }
}

impl From<ActionFile> for Action {
    fn from(action: ActionFile) -> Self {
        Self::File(action)
    }
}

impl From<ActionSystem> for Action {
    fn from(action: ActionSystem) -> Self {
        Self::System(action)
    }
}
