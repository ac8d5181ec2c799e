use std::collections::BTreeMap;
use std::path::{
    Path,
    PathBuf,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::constants::defaults;
use crate::disk::plan::SizeSpec;
use crate::disk::rolemap::RoleMap;
use crate::disk::{
    PartitionTable,
    Size,
};
use crate::errors::ProvError;
use crate::steps::Step;
use crate::utils::fs::{
    file_exists,
    write_atomic,
};

/// The human-editable configuration document.
///
/// Keys unknown to prov-rs are kept in `extra`, so that rewriting
/// the document with derived facts does not lose user content.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(alias = "device_to_install", alias = "disk")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    #[serde(alias = "size_of_efi_partition", alias = "efi")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efi_size: Option<Size>,

    #[serde(alias = "size_of_boot_partition", alias = "boot")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_size: Option<Size>,

    #[serde(alias = "size_of_swap_partition", alias = "swap")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_size: Option<Size>,

    #[serde(alias = "table")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_table: Option<PartitionTable>,

    #[serde(alias = "luks")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<SettingsEncryption>,

    #[serde(alias = "host")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(alias = "tz")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirrors: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub microcode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,

    #[serde(alias = "rootpasswd", alias = "root-password")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_password: Option<String>,

    #[serde(alias = "user")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_real_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_groups: Option<Vec<String>>,

    /// Replaces the default step list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<Step>>,

    /// Appended to the (default or declared) step list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_steps: Option<Vec<Step>>,

    /// Derived: written by RoleMap persistence only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_map: Option<RoleMap>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsEncryption {
    #[serde(default)]
    pub enabled: bool,

    // Read at execution time only, never copied into the plan or role map
    #[serde(alias = "key")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,

    #[serde(alias = "key_file")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase_file: Option<String>,

    #[serde(alias = "name")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped_name: Option<String>,
}

impl Settings {
    pub fn device(&self) -> Result<&str, ProvError> {
        match self.device.as_deref() {
            Some(device) if !device.is_empty() => Ok(device),
            _ => Err(ProvError::BadConfig("no target device".to_string())),
        }
    }

    pub fn size_spec(&self) -> Result<SizeSpec, ProvError> {
        Ok(SizeSpec {
            device: self.device()?.to_string(),
            table: self.partition_table.unwrap_or_default(),
            efi_size: required_size(&self.efi_size, "efi_size")?,
            boot_size: required_size(&self.boot_size, "boot_size")?,
            swap_size: required_size(&self.swap_size, "swap_size")?,
            encrypt_root: self.encrypt_root(),
        })
    }

    pub fn encrypt_root(&self) -> bool {
        matches!(&self.encryption, Some(enc) if enc.enabled)
    }

    pub fn mapped_name(&self) -> &str {
        self.encryption
            .as_ref()
            .and_then(|enc| enc.mapped_name.as_deref())
            .unwrap_or(defaults::LUKS_MAPPED_NAME)
    }

    /// Fetches the LUKS passphrase, either inline or from `passphrase_file`.
    /// Returns `None` when root is not to be encrypted.
    pub fn passphrase(&self) -> Result<Option<String>, ProvError> {
        let enc = match &self.encryption {
            Some(enc) if enc.enabled => enc,
            _ => return Ok(None),
        };

        match (&enc.passphrase, &enc.passphrase_file) {
            (Some(pass), _) => Ok(Some(pass.clone())),
            (None, Some(file)) => {
                let content = std::fs::read_to_string(file).map_err(|err| {
                    ProvError::FileError(err, format!("failed to read passphrase file {file}"))
                })?;

                Ok(Some(content.trim_end_matches(['\n', '\r']).to_string()))
            }
            (None, None) => Err(ProvError::BadConfig(
                "encryption is enabled, but neither passphrase nor passphrase_file is set"
                    .to_string(),
            )),
        }
    }

    pub fn hostname(&self) -> &str {
        self.hostname.as_deref().unwrap_or(defaults::HOSTNAME)
    }

    pub fn timezone(&self) -> &str {
        self.timezone.as_deref().unwrap_or(defaults::TIMEZONE)
    }

    pub fn locale(&self) -> &str {
        self.locale.as_deref().unwrap_or(defaults::LOCALE)
    }

    pub fn kernel(&self) -> &str {
        self.kernel.as_deref().unwrap_or(defaults::KERNEL)
    }

    pub fn microcode(&self) -> &str {
        self.microcode.as_deref().unwrap_or(defaults::MICROCODE)
    }
}

fn required_size(size: &Option<Size>, key: &str) -> Result<u64, ProvError> {
    match size {
        Some(size) => size.bytes(),
        None => Err(ProvError::BadConfig(format!("missing {key}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Format {
    Json,
    Yaml,
}

/// The durable configuration store backing [Settings].
///
/// Loading a missing file yields the default (empty) settings.
/// All writes go through [update](Self::update).
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> Format {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Format::Json,
            _ => Format::Yaml,
        }
    }

    pub fn load(&self) -> Result<Settings, ProvError> {
        if !file_exists(&self.path) {
            log::debug!(
                "settings file {} not found, using empty settings",
                self.path.display()
            );

            return Ok(Settings::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|err| ProvError::persistence(&self.path, err))?;

        parse(&content, self.format()).map_err(|err| ProvError::persistence(&self.path, err))
    }

    /// Re-reads the store, applies `f`, and atomically writes the result back
    pub fn update<F>(&self, f: F) -> Result<Settings, ProvError>
    where
        F: FnOnce(&mut Settings) -> Result<(), ProvError>,
    {
        let mut settings = self.load()?;
        f(&mut settings)?;
        self.save(&settings)?;

        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<(), ProvError> {
        let content = match self.format() {
            Format::Json => serde_json::to_string_pretty(settings)
                .map(|s| s + "\n")
                .map_err(|err| ProvError::persistence(&self.path, err))?,
            Format::Yaml => serde_yaml::to_string(settings)
                .map_err(|err| ProvError::persistence(&self.path, err))?,
        };

        write_atomic(&self.path, &content)
            .map_err(|err| ProvError::persistence(&self.path, err))
    }
}

fn parse(content: &str, format: Format) -> Result<Settings, String> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }

    match format {
        Format::Json => serde_json::from_str(content).map_err(|err| err.to_string()),
        Format::Yaml => serde_yaml::from_str(content).map_err(|err| err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::layout::MIB;
    use crate::steps::FailurePolicy;

    #[test]
    fn test_missing_file_is_empty_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nope.json"));

        assert_eq!(store.load().unwrap(), Settings::default());
    }

    #[test]
    fn test_parse_original_keys() {
        let json = r#"{
            "device_to_install": "/dev/sda",
            "size_of_efi_partition": "512MiB",
            "size_of_boot_partition": "1GiB",
            "size_of_swap_partition": 8589934592,
            "hostname": "archbox",
            "wifi_ssid": "home"
        }"#;

        let settings = parse(json, Format::Json).unwrap();
        let spec = settings.size_spec().unwrap();

        assert_eq!(spec.device, "/dev/sda");
        assert_eq!(spec.table, PartitionTable::Gpt);
        assert_eq!(spec.efi_size, 512 * MIB);
        assert_eq!(spec.boot_size, 1024 * MIB);
        assert_eq!(spec.swap_size, 8192 * MIB);
        assert!(!spec.encrypt_root);
        assert_eq!(
            settings.extra.get("wifi_ssid"),
            Some(&serde_json::Value::String("home".into()))
        );
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
device: /dev/nvme0n1
efi_size: 256MiB
boot_size: 512MiB
swap_size: 4GiB
partition_table: dos
encryption:
  enabled: true
  passphrase: hunter2
steps:
  - name: base
    action: pacstrap
  - name: editors
    action:
      installPackages:
        packages: [neovim, helix]
    failure_policy: warn-and-continue
"#;

        let settings = parse(yaml, Format::Yaml).unwrap();
        let spec = settings.size_spec().unwrap();

        assert_eq!(spec.table, PartitionTable::Mbr);
        assert!(spec.encrypt_root);
        assert_eq!(settings.mapped_name(), defaults::LUKS_MAPPED_NAME);
        assert_eq!(settings.passphrase().unwrap().as_deref(), Some("hunter2"));

        let steps = settings.steps.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].failure_policy, FailurePolicy::Fatal);
        assert_eq!(steps[1].failure_policy, FailurePolicy::WarnAndContinue);
    }

    #[test]
    fn test_size_spec_missing_keys() {
        let settings = Settings {
            device: Some("/dev/sda".into()),
            efi_size: Some(Size::Human("512MiB".into())),
            ..Default::default()
        };

        match settings.size_spec() {
            Err(ProvError::BadConfig(msg)) => assert!(msg.contains("boot_size")),
            other => panic!("unexpected result {other:?}"),
        }

        assert!(Settings::default().size_spec().is_err());
    }

    #[test]
    fn test_passphrase_sources() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("key");
        std::fs::write(&key_file, "from-file\n").unwrap();

        let mut settings = Settings {
            encryption: Some(SettingsEncryption {
                enabled: true,
                passphrase_file: Some(key_file.to_string_lossy().to_string()),
                mapped_name: Some("root_crypt".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(settings.passphrase().unwrap().as_deref(), Some("from-file"));
        assert_eq!(settings.mapped_name(), "root_crypt");

        settings.encryption = Some(SettingsEncryption {
            enabled: true,
            ..Default::default()
        });
        assert!(matches!(settings.passphrase(), Err(ProvError::BadConfig(_))));

        settings.encryption = None;
        assert_eq!(settings.passphrase().unwrap(), None);
    }

    #[test]
    fn test_update_is_durable() {
        let dir = tempfile::tempdir().unwrap();

        for name in ["settings.json", "settings.yaml"] {
            let store = ConfigStore::new(dir.path().join(name));

            store
                .update(|settings| {
                    settings.hostname = Some("foo".into());
                    Ok(())
                })
                .unwrap();

            assert_eq!(store.load().unwrap().hostname.as_deref(), Some("foo"));

            // A failing update leaves the store untouched
            let result = store.update(|settings| {
                settings.hostname = Some("bar".into());
                Err(ProvError::BadConfig("nope".into()))
            });

            assert!(result.is_err());
            assert_eq!(store.load().unwrap().hostname.as_deref(), Some("foo"));
        }
    }

    #[test]
    fn test_load_garbage_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            ConfigStore::new(&path).load(),
            Err(ProvError::PersistenceError { .. })
        ));
    }
}
