pub mod engine;
pub mod ops;
pub mod plan;
pub mod rolemap;

use std::fmt;

use humanize_rs::bytes;
use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::ProvError;

/// Logical purpose of a partition
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Role {
    #[serde(rename = "efi")]
    Efi,

    #[serde(rename = "boot")]
    Boot,

    #[serde(rename = "swap")]
    Swap,

    #[serde(rename = "root")]
    Root,
}

impl Role {
    /// All roles, in on-disk order
    pub const ALL: [Role; 4] = [Role::Efi, Role::Boot, Role::Swap, Role::Root];

    pub fn filesystem(&self) -> Filesystem {
        match self {
            Role::Efi => Filesystem::Fat32,
            Role::Boot | Role::Root => Filesystem::Ext4,
            Role::Swap => Filesystem::Swap,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Efi => write!(f, "efi"),
            Role::Boot => write!(f, "boot"),
            Role::Swap => write!(f, "swap"),
            Role::Root => write!(f, "root"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ProvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "efi" | "esp" => Ok(Role::Efi),
            "boot" => Ok(Role::Boot),
            "swap" => Ok(Role::Swap),
            "root" => Ok(Role::Root),
            other => Err(ProvError::BadArgs(format!("unknown role {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filesystem {
    #[serde(rename = "fat32")]
    Fat32,

    #[serde(rename = "ext4")]
    Ext4,

    #[serde(rename = "linux-swap")]
    Swap,
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filesystem::Fat32 => write!(f, "fat32"),
            Filesystem::Ext4 => write!(f, "ext4"),
            Filesystem::Swap => write!(f, "linux-swap"),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum PartitionTable {
    #[default]
    #[serde(rename = "gpt")]
    Gpt,

    #[serde(rename = "mbr", alias = "dos", alias = "mbr-dos")]
    Mbr,
}

impl fmt::Display for PartitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionTable::Gpt => write!(f, "gpt"),
            PartitionTable::Mbr => write!(f, "dos"),
        }
    }
}

/// A size from settings: either a raw byte count,
/// or a size-with-unit string such as `512MiB`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Size {
    Bytes(u64),
    Human(String),
}

impl Size {
    pub fn bytes(&self) -> Result<u64, ProvError> {
        match self {
            Size::Bytes(n) => Ok(*n),
            Size::Human(s) => parse_human_bytes(s),
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Size::Bytes(n) => write!(f, "{n}"),
            Size::Human(s) => write!(f, "{s}"),
        }
    }
}

pub fn parse_human_bytes(s: &str) -> Result<u64, ProvError> {
    let trimmed = s.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed
            .parse::<u64>()
            .map_err(|err| ProvError::BadSize(format!("bad byte count {s}: {err}")));
    }

    trimmed
        .to_lowercase()
        .parse::<bytes::Bytes>()
        .map(|b| b.size() as u64)
        .map_err(|err| ProvError::BadSize(format!("bad byte unit string {s}: {err}")))
}

/// Renders a byte count in the largest binary unit that divides it
pub fn human_bytes(n: u64) -> String {
    const UNITS: [(&str, u64); 4] = [
        ("TiB", 1 << 40),
        ("GiB", 1 << 30),
        ("MiB", 1 << 20),
        ("KiB", 1 << 10),
    ];

    for (unit, factor) in UNITS {
        if n >= factor && n % factor == 0 {
            return format!("{}{unit}", n / factor);
        }
    }

    format!("{n}B")
}
