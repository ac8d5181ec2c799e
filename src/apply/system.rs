use super::files::{
    append_lines,
    read,
    replace_pattern,
    write_file,
};
use super::{
    bootloader,
    packages,
    services,
    RunContext,
};
use crate::constants::defaults;
use crate::disk::ops::BlockProbe;
use crate::disk::rolemap;
use crate::disk::Role;
use crate::errors::ProvError;
use crate::linux::user;
use crate::steps::action::ActionSystem;
use crate::utils::fs::{
    backup,
    file_exists,
};
use crate::utils::shell;

const MIRRORLIST: &str = "/etc/pacman.d/mirrorlist";

pub(super) fn apply<P: BlockProbe>(
    ctx: &RunContext,
    action: &ActionSystem,
    probe: &P,
) -> Result<(), ProvError> {
    match action {
        ActionSystem::DisableReflector => {
            services::disable_live(&["reflector.service", "reflector.timer"])
        }
        ActionSystem::UpdateClock => shell::exec("timedatectl", &["set-ntp", "true"]),
        ActionSystem::SetupMirrors => setup_mirrors(ctx),
        ActionSystem::Timezone => timezone(ctx),
        ActionSystem::Localization => localization(ctx),
        ActionSystem::EnableMultilib => enable_multilib(ctx),
        ActionSystem::Network => network(ctx),
        ActionSystem::RootPassword => root_password(ctx),
        ActionSystem::AddUser => add_user(ctx),
        ActionSystem::SudoWheel => sudo_wheel(ctx),
        ActionSystem::SudoTimeout => sudo_timeout(ctx),
        ActionSystem::Hibernation => hibernation(ctx),
        ActionSystem::Bootloader => bootloader::install(ctx, probe),
        ActionSystem::AddUserToGroups { user, groups } => {
            add_user_to_groups(ctx, user.as_deref(), groups)
        }
        ActionSystem::Command { argv, chroot } => command(ctx, argv, *chroot),
    }
}

/// Appends `genfstab -U` output to the new fstab,
/// unless it already mounts something on `/`
pub(super) fn genfstab(ctx: &RunContext) -> Result<(), ProvError> {
    let fstab = ctx.target("/etc/fstab");

    if file_exists(&fstab) && fstab_has_root(&read(&fstab)?) {
        log::info!("{fstab} already has a root entry, skipping");
        return Ok(());
    }

    let entries = shell::exec_output("genfstab", &["-U", &ctx.install_location])?;
    let lines: Vec<&str> = entries.lines().collect();

    append_lines(&fstab, &lines)
}

fn setup_mirrors(ctx: &RunContext) -> Result<(), ProvError> {
    let mirrors = match &ctx.settings.mirrors {
        Some(mirrors) if !mirrors.is_empty() => mirrors,
        _ => {
            log::info!("no mirrors configured, keeping {MIRRORLIST}");
            return Ok(());
        }
    };

    if file_exists(MIRRORLIST) {
        backup(MIRRORLIST)?;
    }

    write_file(MIRRORLIST, &render_mirrorlist(mirrors))
}

fn timezone(ctx: &RunContext) -> Result<(), ProvError> {
    let zoneinfo = format!("/usr/share/zoneinfo/{}", ctx.settings.timezone());

    shell::chroot(
        &ctx.install_location,
        "ln",
        &["-sf", &zoneinfo, "/etc/localtime"],
    )?;

    shell::chroot(&ctx.install_location, "hwclock", &["--systohc"]).map(|_| ())
}

fn localization(ctx: &RunContext) -> Result<(), ProvError> {
    let locale = ctx.settings.locale();

    append_lines(&ctx.target("/etc/locale.gen"), &[render_locale_gen(locale)])?;
    shell::chroot(&ctx.install_location, "locale-gen", &[])?;

    write_file(&ctx.target("/etc/locale.conf"), &format!("LANG={locale}\n"))
}

fn enable_multilib(ctx: &RunContext) -> Result<(), ProvError> {
    let pacman_conf = ctx.target("/etc/pacman.conf");
    let original = read(&pacman_conf)?;

    match uncomment_multilib(&original)? {
        None => {
            log::info!("multilib already enabled in {pacman_conf}");
            Ok(())
        }
        Some(uncommented) => {
            backup(&pacman_conf)?;
            write_file(&pacman_conf, &uncommented)
        }
    }
}

fn network(ctx: &RunContext) -> Result<(), ProvError> {
    let hostname = ctx.settings.hostname();

    write_file(&ctx.target("/etc/hostname"), &format!("{hostname}\n"))?;
    append_lines(&ctx.target("/etc/hosts"), &render_hosts(hostname))?;

    packages::install(ctx, &["networkmanager"])?;
    services::enable(ctx, "NetworkManager")
}

fn root_password(ctx: &RunContext) -> Result<(), ProvError> {
    let password = ctx
        .settings
        .root_password
        .as_deref()
        .ok_or_else(|| ProvError::BadConfig("missing root_password".to_string()))?;

    set_password(ctx, "root", password)
}

fn add_user(ctx: &RunContext) -> Result<(), ProvError> {
    let username = username(ctx, None)?;

    let passwd = ctx.target("/etc/passwd");
    if file_exists(&passwd) && user::user_exists(&read(&passwd)?, username) {
        log::info!("user {username} already exists, skipping");
        return Ok(());
    }

    let groups = ctx.settings.user_groups.clone().unwrap_or_default();
    let args = useradd_args(username, ctx.settings.user_real_name.as_deref(), &groups);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    shell::chroot(&ctx.install_location, "useradd", &args)?;

    match ctx.settings.user_password.as_deref() {
        Some(password) => set_password(ctx, username, password),
        None => {
            log::warn!("no user_password configured, {username} has no password");
            Ok(())
        }
    }
}

fn add_user_to_groups(
    ctx: &RunContext,
    user: Option<&str>,
    groups: &[String],
) -> Result<(), ProvError> {
    let username = username(ctx, user)?;

    if groups.is_empty() {
        return Ok(());
    }

    shell::chroot(
        &ctx.install_location,
        "usermod",
        &["-aG", &groups.join(","), username],
    )
    .map(|_| ())
}

fn sudo_wheel(ctx: &RunContext) -> Result<(), ProvError> {
    let changed = replace_pattern(
        &ctx.target("/etc/sudoers"),
        r"^#\s*(%wheel ALL=\(ALL(:ALL)?\) ALL)\s*$",
        "$1",
    )?;

    if !changed {
        log::info!("wheel group already allowed in sudoers");
    }

    Ok(())
}

fn sudo_timeout(ctx: &RunContext) -> Result<(), ProvError> {
    append_lines(
        &ctx.target("/etc/sudoers"),
        &[
            "## Set sudo timestamp timeout".to_string(),
            format!("Defaults timestamp_timeout={}", defaults::SUDO_TIMESTAMP_TIMEOUT),
        ],
    )
}

/// Adds the resume hook (and encrypt, for encrypted root) to
/// mkinitcpio.conf, then regenerates the initramfs
fn hibernation(ctx: &RunContext) -> Result<(), ProvError> {
    let encrypted = rolemap::load(ctx.store)?
        .get(Role::Root)
        .map(|root| root.container.is_some())
        .unwrap_or(false);

    let conf = ctx.target("/etc/mkinitcpio.conf");
    let original = read(&conf)?;
    let updated = add_initcpio_hooks(&original, encrypted)?;

    if updated != original {
        backup(&conf)?;
        write_file(&conf, &updated)?;
    }

    shell::chroot(
        &ctx.install_location,
        "mkinitcpio",
        &["-p", ctx.settings.kernel()],
    )
    .map(|_| ())
}

fn command(ctx: &RunContext, argv: &[String], chroot: bool) -> Result<(), ProvError> {
    let (cmd, args) = argv
        .split_first()
        .ok_or_else(|| ProvError::BadConfig("empty command".to_string()))?;

    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match chroot {
        true => shell::chroot(&ctx.install_location, cmd, &args).map(|_| ()),
        false => shell::exec(cmd, &args),
    }
}

fn username<'a>(ctx: &'a RunContext, user: Option<&'a str>) -> Result<&'a str, ProvError> {
    user.or(ctx.settings.username.as_deref())
        .ok_or_else(|| ProvError::BadConfig("missing username".to_string()))
}

/// Sets the password of `user` in the new system. Only the hash
/// is ever handed to chpasswd, through stdin.
fn set_password(ctx: &RunContext, user: &str, password: &str) -> Result<(), ProvError> {
    let hash = pwhash::sha512_crypt::hash(password)
        .map_err(|err| ProvError::ProvRsBug(format!("failed to hash password for {user}: {err}")))?;

    shell::chroot_stdin(
        &ctx.install_location,
        "chpasswd",
        &["-e"],
        &format!("{user}:{hash}\n"),
    )
    .map(|_| ())
}

fn render_mirrorlist(mirrors: &[String]) -> String {
    mirrors
        .iter()
        .map(|mirror| match mirror.trim_start().starts_with("Server") {
            true => format!("{mirror}\n"),
            false => format!("Server = {mirror}\n"),
        })
        .collect()
}

fn render_locale_gen(locale: &str) -> String {
    let charset = locale.split_once('.').map(|(_, c)| c).unwrap_or("UTF-8");

    format!("{locale} {charset}")
}

fn render_hosts(hostname: &str) -> [String; 3] {
    [
        "127.0.0.1\tlocalhost".to_string(),
        "::1\tlocalhost".to_string(),
        format!("127.0.1.1\t{hostname}.localdomain\t{hostname}"),
    ]
}

fn useradd_args(username: &str, real_name: Option<&str>, groups: &[String]) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        "-s".to_string(),
        defaults::USER_SHELL.to_string(),
        "-d".to_string(),
        format!("/home/{username}"),
    ];

    if !groups.is_empty() {
        args.push("-G".to_string());
        args.push(groups.join(","));
    }

    if let Some(name) = real_name {
        args.push("-c".to_string());
        args.push(name.to_string());
    }

    args.push(username.to_string());

    args
}

fn fstab_has_root(fstab: &str) -> bool {
    fstab
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|mnt| mnt == "/")
}

/// Uncomments the `[multilib]` section header and its Include line.
/// Returns `None` if multilib is already enabled.
fn uncomment_multilib(pacman_conf: &str) -> Result<Option<String>, ProvError> {
    let lines: Vec<&str> = pacman_conf.lines().collect();

    if lines.iter().any(|line| line.trim() == "[multilib]") {
        return Ok(None);
    }

    let header = lines
        .iter()
        .position(|line| line.trim() == "#[multilib]")
        .ok_or_else(|| ProvError::BadConfig("no [multilib] section in pacman.conf".to_string()))?;

    let mut uncommented: Vec<String> = lines.iter().map(|line| line.to_string()).collect();
    uncommented[header] = "[multilib]".to_string();

    if let Some(include) = uncommented.get_mut(header + 1) {
        if include.trim_start().starts_with("#Include") {
            *include = include.replacen('#', "", 1);
        }
    }

    let mut result = uncommented.join("\n");
    if pacman_conf.ends_with('\n') {
        result.push('\n');
    }

    Ok(Some(result))
}

/// Edits the uncommented HOOKS=(...) line: `encrypt` goes before
/// `filesystems` when root is encrypted, `resume` goes after it.
fn add_initcpio_hooks(conf: &str, encrypted: bool) -> Result<String, ProvError> {
    let mut found = false;

    let lines: Vec<String> = conf
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if found || !trimmed.starts_with("HOOKS=(") {
                return Ok(line.to_string());
            }

            found = true;

            let inner = trimmed
                .trim_start_matches("HOOKS=(")
                .split(')')
                .next()
                .unwrap_or_default();

            let mut hooks: Vec<&str> = inner.split_whitespace().collect();
            let fs_index = hooks.iter().position(|h| *h == "filesystems").ok_or_else(|| {
                ProvError::BadConfig("mkinitcpio HOOKS has no filesystems hook".to_string())
            })?;

            if !hooks.contains(&"resume") {
                hooks.insert(fs_index + 1, "resume");
            }

            if encrypted && !hooks.contains(&"encrypt") {
                hooks.insert(fs_index, "encrypt");
            }

            Ok(format!("HOOKS=({})", hooks.join(" ")))
        })
        .collect::<Result<_, ProvError>>()?;

    if !found {
        return Err(ProvError::BadConfig(
            "no HOOKS line in mkinitcpio.conf".to_string(),
        ));
    }

    let mut result = lines.join("\n");
    if conf.ends_with('\n') {
        result.push('\n');
    }

    Ok(result)
}
