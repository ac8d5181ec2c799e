use super::files::write_file;
use super::{
    packages,
    RunContext,
};
use crate::disk::ops::BlockProbe;
use crate::disk::rolemap;
use crate::disk::Role;
use crate::errors::ProvError;
use crate::utils::shell;

const ENTRY_NAME: &str = "archlinux";

/// How the kernel finds the root filesystem
#[derive(Debug, Clone, PartialEq)]
enum RootParam {
    Plain { uuid: String },
    Encrypted { raw_uuid: String, mapped_name: String },
}

#[derive(Debug, Clone, PartialEq)]
struct BootEntry<'a> {
    kernel: &'a str,
    microcode: &'a str,
    root: RootParam,
    swap_uuid: String,
}

/// Installs systemd-boot with the ESP on /efi and the entries on /boot.
/// Role UUIDs are resolved (and cached) only now, long after formatting.
pub(super) fn install<P: BlockProbe>(ctx: &RunContext, probe: &P) -> Result<(), ProvError> {
    let microcode = ctx.settings.microcode();

    let mut packages = vec!["efibootmgr"];
    if !microcode.is_empty() {
        packages.push(microcode);
    }

    packages::install(ctx, &packages)?;

    shell::chroot(
        &ctx.install_location,
        "bootctl",
        &["--esp-path=/efi", "--boot-path=/boot", "install"],
    )?;

    write_file(&ctx.target("/efi/loader/loader.conf"), &render_loader_conf())?;

    let entry = BootEntry {
        kernel: ctx.settings.kernel(),
        microcode,
        root: root_param(ctx, probe)?,
        swap_uuid: rolemap::resolve_uuid(ctx.store, Role::Swap, probe)?,
    };

    let entry_path = ctx.target(&format!("/boot/loader/entries/{ENTRY_NAME}.conf"));
    log::info!("writing boot entry {entry_path}");

    write_file(&entry_path, &render_entry(&entry))
}

fn root_param<P: BlockProbe>(ctx: &RunContext, probe: &P) -> Result<RootParam, ProvError> {
    let role_map = rolemap::load(ctx.store)?;
    let container = role_map
        .get(Role::Root)
        .and_then(|root| root.container.clone());

    match container {
        Some(container) => {
            let raw_uuid = rolemap::resolve_container_uuid(ctx.store, Role::Root, probe)?
                .ok_or_else(|| {
                    ProvError::ProvRsBug("encrypted root lost its container".to_string())
                })?;

            Ok(RootParam::Encrypted {
                raw_uuid,
                mapped_name: container.name,
            })
        }
        None => Ok(RootParam::Plain {
            uuid: rolemap::resolve_uuid(ctx.store, Role::Root, probe)?,
        }),
    }
}

fn render_loader_conf() -> String {
    format!("default {ENTRY_NAME}\ntimeout 5\nconsole-mode keep\neditor no\n")
}

fn render_entry(entry: &BootEntry) -> String {
    let mut lines = vec![
        "title Arch Linux".to_string(),
        format!("linux /vmlinuz-{}", entry.kernel),
    ];

    if !entry.microcode.is_empty() {
        lines.push(format!("initrd /{}.img", entry.microcode));
    }

    lines.push(format!("initrd /initramfs-{}.img", entry.kernel));

    let root = match &entry.root {
        RootParam::Plain { uuid } => format!("root=UUID={uuid}"),
        RootParam::Encrypted {
            raw_uuid,
            mapped_name,
        } => format!("cryptdevice=UUID={raw_uuid}:{mapped_name} root=/dev/mapper/{mapped_name}"),
    };

    lines.push(format!("options {root} resume=UUID={} rw", entry.swap_uuid));

    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::disk::ops::fakes::StaticProbe;
    use crate::disk::rolemap::{
        Container,
        RoleEntry,
        RoleMap,
    };
    use crate::settings::{
        ConfigStore,
        Settings,
    };

    #[test]
    fn test_render_entry_plain() {
        let entry = BootEntry {
            kernel: "linux",
            microcode: "intel-ucode",
            root: RootParam::Plain {
                uuid: "root-uuid".into(),
            },
            swap_uuid: "swap-uuid".into(),
        };

        assert_eq!(
            render_entry(&entry),
            "title Arch Linux
linux /vmlinuz-linux
initrd /intel-ucode.img
initrd /initramfs-linux.img
options root=UUID=root-uuid resume=UUID=swap-uuid rw
"
        );
    }

    #[test]
    fn test_render_entry_encrypted() {
        let entry = BootEntry {
            kernel: "linux-lts",
            microcode: "",
            root: RootParam::Encrypted {
                raw_uuid: "luks-uuid".into(),
                mapped_name: "cryptroot".into(),
            },
            swap_uuid: "swap-uuid".into(),
        };

        let rendered = render_entry(&entry);

        assert!(!rendered.contains("ucode"));
        assert!(rendered.contains("initrd /initramfs-linux-lts.img\n"));
        assert!(rendered.ends_with(
            "options cryptdevice=UUID=luks-uuid:cryptroot root=/dev/mapper/cryptroot resume=UUID=swap-uuid rw\n"
        ));
    }

    #[test]
    fn test_root_param_resolves_raw_container() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("settings.json"));

        let mut role_map = RoleMap::default();
        role_map.record(Role::Efi, RoleEntry::new("/dev/sda1".into())).unwrap();
        role_map.record(Role::Boot, RoleEntry::new("/dev/sda2".into())).unwrap();
        role_map.record(Role::Swap, RoleEntry::new("/dev/sda3".into())).unwrap();
        role_map
            .record(
                Role::Root,
                RoleEntry {
                    device: "/dev/mapper/cryptroot".into(),
                    container: Some(Container {
                        raw_device: "/dev/sda4".into(),
                        name: "cryptroot".into(),
                        uuid: None,
                    }),
                    uuid: None,
                },
            )
            .unwrap();
        rolemap::persist(&role_map, &store).unwrap();

        let probe = StaticProbe {
            uuids: HashMap::from([
                ("/dev/sda4".to_string(), "luks-uuid".to_string()),
                ("/dev/mapper/cryptroot".to_string(), "ext4-uuid".to_string()),
            ]),
            ..Default::default()
        };

        let ctx = RunContext::new(&store, Settings::default(), "/mnt".into());

        assert_eq!(
            root_param(&ctx, &probe).unwrap(),
            RootParam::Encrypted {
                raw_uuid: "luks-uuid".into(),
                mapped_name: "cryptroot".into(),
            }
        );

        let cached = rolemap::load(&store).unwrap();
        let container = cached.get(Role::Root).unwrap().container.as_ref().unwrap();
        assert_eq!(container.uuid.as_deref(), Some("luks-uuid"));
    }
}
