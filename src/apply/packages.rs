use super::RunContext;
use crate::errors::ProvError;
use crate::steps::action::ActionPackages;
use crate::utils::shell;

pub(super) fn apply(ctx: &RunContext, action: &ActionPackages) -> Result<(), ProvError> {
    match action {
        ActionPackages::InstallPackages { packages } => install(ctx, packages),
        ActionPackages::InstallPackagesFromFile { file } => {
            let content = std::fs::read_to_string(file).map_err(|err| {
                ProvError::FileError(err, format!("failed to read package list {file}"))
            })?;

            install(ctx, &parse_package_list(&content))
        }
    }
}

/// Installs the base system into the install location
pub(super) fn pacstrap(ctx: &RunContext) -> Result<(), ProvError> {
    let packages = base_packages(ctx.settings.kernel());

    let mut args: Vec<&str> = vec![ctx.install_location.as_str()];
    args.extend(packages.iter().map(String::as_str));

    shell::exec("pacstrap", &args)
}

/// Installs `packages` inside the new system; already installed
/// packages are skipped by pacman
pub(super) fn install<S: AsRef<str>>(ctx: &RunContext, packages: &[S]) -> Result<(), ProvError> {
    if packages.is_empty() {
        log::info!("no packages to install");
        return Ok(());
    }

    let mut args = vec!["-Syu", "--needed", "--noconfirm"];
    args.extend(packages.iter().map(|p| p.as_ref()));

    shell::chroot(&ctx.install_location, "pacman", &args).map(|_| ())
}

fn base_packages(kernel: &str) -> Vec<String> {
    let mut packages = vec![
        "base".to_string(),
        "base-devel".to_string(),
        kernel.to_string(),
        format!("{kernel}-headers"),
    ];

    packages.extend(
        ["linux-firmware", "man-pages", "man-db", "iptables-nft"]
            .iter()
            .map(|s| s.to_string()),
    );

    packages
}

fn parse_package_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
