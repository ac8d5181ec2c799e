use std::collections::BTreeMap;

use serde::{
    Deserialize,
    Serialize,
};

use super::ops::BlockProbe;
use super::Role;
use crate::errors::ProvError;
use crate::settings::ConfigStore;

/// Maps each role to the device created for it.
///
/// Entries are facts recorded right after partitioning: they are
/// never recomputed, because kernel device naming may drift on rescans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleMap(BTreeMap<Role, RoleEntry>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Device everything downstream addresses,
    /// e.g. /dev/sda1, or /dev/mapper/cryptroot for encrypted root
    pub device: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,

    /// Filesystem UUID of `device`, resolved lazily
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// The LUKS container `device` was opened from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Raw encrypted partition, e.g. /dev/sda4
    pub raw_device: String,

    /// device-mapper name, e.g. cryptroot
    pub name: String,

    /// LUKS header UUID of `raw_device`, resolved lazily
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl RoleEntry {
    pub fn new(device: String) -> Self {
        Self {
            device,
            container: None,
            uuid: None,
        }
    }
}

impl RoleMap {
    /// Records `entry` for `role`. Recording a role twice is an error.
    pub fn record(&mut self, role: Role, entry: RoleEntry) -> Result<(), ProvError> {
        if let Some(existing) = self.0.get(&role) {
            return Err(ProvError::ProvRsBug(format!(
                "role {role} already mapped to {}, refusing to remap to {}",
                existing.device, entry.device
            )));
        }

        self.0.insert(role, entry);

        Ok(())
    }

    pub fn get(&self, role: Role) -> Option<&RoleEntry> {
        self.0.get(&role)
    }

    pub fn device(&self, role: Role) -> Result<&str, ProvError> {
        self.get(role)
            .map(|entry| entry.device.as_str())
            .ok_or_else(|| ProvError::BadConfig(format!("no device recorded for role {role}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Role, &RoleEntry)> {
        self.0.iter()
    }

    pub fn is_complete(&self) -> bool {
        Role::ALL.iter().all(|role| self.0.contains_key(role))
    }

    pub fn validate(&self) -> Result<(), ProvError> {
        let missing: Vec<String> = Role::ALL
            .iter()
            .filter(|role| !self.0.contains_key(role))
            .map(|role| role.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(ProvError::BadConfig(format!(
                "role map missing roles: {}",
                missing.join(", ")
            )));
        }

        Ok(())
    }

    /// Caches a resolved filesystem UUID. A different UUID for an
    /// already-resolved role is rejected.
    pub fn cache_uuid(&mut self, role: Role, uuid: String) -> Result<(), ProvError> {
        let entry = self.entry_mut(role)?;
        set_once(&mut entry.uuid, uuid, role)
    }

    pub fn cache_container_uuid(&mut self, role: Role, uuid: String) -> Result<(), ProvError> {
        let entry = self.entry_mut(role)?;
        match entry.container.as_mut() {
            Some(container) => set_once(&mut container.uuid, uuid, role),
            None => Err(ProvError::BadConfig(format!("role {role} is not encrypted"))),
        }
    }

    /// Whether `other` only adds facts to `self`, never changing recorded devices
    fn is_extended_by(&self, other: &RoleMap) -> bool {
        let raw = |e: &RoleEntry| e.container.as_ref().map(|c| c.raw_device.clone());

        self.0.iter().all(|(role, entry)| match other.get(*role) {
            Some(new) => new.device == entry.device && raw(new) == raw(entry),
            None => false,
        })
    }

    fn entry_mut(&mut self, role: Role) -> Result<&mut RoleEntry, ProvError> {
        self.0
            .get_mut(&role)
            .ok_or_else(|| ProvError::BadConfig(format!("no device recorded for role {role}")))
    }
}

fn set_once(slot: &mut Option<String>, value: String, role: Role) -> Result<(), ProvError> {
    match slot {
        Some(existing) if *existing != value => Err(ProvError::BadConfig(format!(
            "role {role} already resolved to UUID {existing}, got {value}"
        ))),
        _ => {
            *slot = Some(value);
            Ok(())
        }
    }
}

/// Writes `role_map` into the settings store. A previously recorded
/// map may only gain facts; changing any recorded device is rejected.
pub fn persist(role_map: &RoleMap, store: &ConfigStore) -> Result<(), ProvError> {
    role_map.validate()?;

    store.update(|settings| {
        if let Some(existing) = &settings.role_map {
            if !existing.is_extended_by(role_map) {
                return Err(ProvError::persistence(
                    store.path(),
                    "refusing to overwrite recorded role map with different devices",
                ));
            }
        }

        settings.role_map = Some(role_map.clone());

        Ok(())
    })?;

    log::debug!("role map persisted to {}", store.path().display());

    Ok(())
}

pub fn load(store: &ConfigStore) -> Result<RoleMap, ProvError> {
    let role_map = store
        .load()?
        .role_map
        .ok_or_else(|| ProvError::persistence(store.path(), "no role map recorded"))?;

    role_map.validate()?;

    Ok(role_map)
}

/// Returns the filesystem UUID of `role`, looking it up on first
/// request and caching it back into the store.
pub fn resolve_uuid(
    store: &ConfigStore,
    role: Role,
    probe: &dyn BlockProbe,
) -> Result<String, ProvError> {
    let mut role_map = load(store)?;
    let entry = role_map
        .get(role)
        .ok_or_else(|| ProvError::BadConfig(format!("no device recorded for role {role}")))?;

    if let Some(uuid) = &entry.uuid {
        return Ok(uuid.clone());
    }

    let uuid = lookup(probe, &entry.device)?;
    role_map.cache_uuid(role, uuid.clone())?;
    persist(&role_map, store)?;

    log::info!("resolved {role} ({}) to UUID {uuid}", role_map.device(role)?);

    Ok(uuid)
}

/// Like [resolve_uuid], but for the LUKS container under `role`.
/// Returns `None` if `role` is not encrypted.
pub fn resolve_container_uuid(
    store: &ConfigStore,
    role: Role,
    probe: &dyn BlockProbe,
) -> Result<Option<String>, ProvError> {
    let mut role_map = load(store)?;
    let container = match role_map.get(role).and_then(|e| e.container.as_ref()) {
        Some(container) => container,
        None => return Ok(None),
    };

    if let Some(uuid) = &container.uuid {
        return Ok(Some(uuid.clone()));
    }

    let raw_device = container.raw_device.clone();
    let uuid = lookup(probe, &raw_device)?;
    role_map.cache_container_uuid(role, uuid.clone())?;
    persist(&role_map, store)?;

    log::info!("resolved {role} container ({raw_device}) to UUID {uuid}");

    Ok(Some(uuid))
}

fn lookup(probe: &dyn BlockProbe, device: &str) -> Result<String, ProvError> {
    probe.uuid(device)?.ok_or_else(|| ProvError::CmdFailed {
        error: None,
        context: format!("no UUID found on {device}, is it formatted?"),
    })
}
