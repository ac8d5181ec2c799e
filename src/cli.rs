use clap::{
    Args,
    Parser,
    Subcommand,
};

use crate::constants::{
    defaults,
    ENV_PROV_SETTINGS,
};
use crate::disk::Role;
use crate::errors::ProvError;

#[derive(Debug, Parser)]
#[clap(
    author = "prov-rs developers",
    version,
    about = "Rust-based Arch Linux provisioner"
)]
pub struct Cli {
    #[command(subcommand)]
    pub commands: Option<Commands>,

    /// Settings file (JSON if it ends with .json, YAML otherwise)
    #[arg(
        global = true,
        short = 'f',
        long = "file",
        env = ENV_PROV_SETTINGS,
        value_parser = validate_filename,
        default_value_t = String::from(defaults::SETTINGS_FILE)
    )]
    pub settings: String,

    /// Dry-run, prov-rs will not commit any changes to disks,
    /// and will just print steps to be performed
    #[arg(global = true, short = 'n', long = "dry-run", default_value_t = false)]
    pub dry_run: bool,

    /// Log debug messages, including every external command
    #[arg(global = true, short = 'v', long = "verbose", default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the partition layout for the configured device (default)
    Plan(ArgsPlan),

    /// List provisioning steps in execution order
    Steps,

    /// Run provisioning steps
    Apply(ArgsApply),

    /// Print (and cache) the filesystem UUID of a partition role
    Uuid(ArgsUuid),
}

#[derive(Debug, Default, Args)]
pub struct ArgsPlan {
    /// Plan for this device size instead of probing the device, e.g. 64GiB
    #[arg(long = "capacity", value_parser = parse_size)]
    pub capacity: Option<u64>,

    /// Plan with this alignment instead of probing the device, e.g. 1MiB
    #[arg(long = "alignment", value_parser = parse_size)]
    pub alignment: Option<u64>,

    /// Plan with this logical sector size instead of probing the device
    #[arg(long = "sector-size", value_parser = parse_size)]
    pub sector_size: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ArgsApply {
    /// Confirm wiping the configured device without prompting
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,

    /// Print the run report as JSON
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ArgsUuid {
    /// One of efi, boot, swap, root
    #[arg(value_parser = parse_role)]
    pub role: Role,
}

fn validate_filename(name: &str) -> Result<String, ProvError> {
    if name.is_empty() {
        return Err(ProvError::BadArgs(String::from("empty filename")));
    }

    Ok(name.to_string())
}

fn parse_size(s: &str) -> Result<u64, ProvError> {
    crate::disk::parse_human_bytes(s)
}

fn parse_role(s: &str) -> Result<Role, ProvError> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::try_parse_from(["prov-rs", "-f", "my.yaml"]).unwrap();

        assert!(cli.commands.is_none());
        assert_eq!(cli.settings, "my.yaml");
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from(["prov-rs", "apply", "--yes", "-n", "-v"]).unwrap();

        assert!(cli.dry_run);
        assert!(cli.verbose);
        match cli.commands {
            Some(Commands::Apply(args)) => {
                assert!(args.yes);
                assert!(!args.json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_plan_sizes() {
        let cli = Cli::try_parse_from(["prov-rs", "plan", "--capacity", "64GiB"]).unwrap();

        match cli.commands {
            Some(Commands::Plan(args)) => {
                assert_eq!(args.capacity, Some(64 * 1024 * 1024 * 1024));
                assert_eq!(args.alignment, None);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["prov-rs", "plan", "--capacity", "lots"]).is_err());

        let cli = Cli::try_parse_from(["prov-rs", "plan", "--sector-size", "4096"]).unwrap();
        match cli.commands {
            Some(Commands::Plan(args)) => assert_eq!(args.sector_size, Some(4096)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_author() {
        use clap::CommandFactory;

        assert_eq!(Cli::command().get_author(), Some("prov-rs developers"));
    }

    #[test]
    fn test_parse_uuid_role() {
        let cli = Cli::try_parse_from(["prov-rs", "uuid", "swap"]).unwrap();
        assert!(matches!(
            cli.commands,
            Some(Commands::Uuid(ArgsUuid { role: Role::Swap }))
        ));

        assert!(Cli::try_parse_from(["prov-rs", "uuid", "home"]).is_err());
        assert!(Cli::try_parse_from(["prov-rs", "-f", ""]).is_err());
    }
}
