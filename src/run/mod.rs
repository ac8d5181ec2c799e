pub mod apply;
pub mod plan;
pub mod steps;
pub mod uuid;

use std::env;

use colored::Colorize;

use crate::constants::defaults;
use crate::errors::ProvError;
use crate::settings::ConfigStore;
use crate::steps::report::RunReport;
use crate::{
    cli,
    constants,
};

pub fn run(cli_args: cli::Cli) -> Result<Option<RunReport>, ProvError> {
    let store = ConfigStore::new(&cli_args.settings);

    match cli_args.commands {
        // Default is to plan
        None => plan::run(&store, cli::ArgsPlan::default()).map(|_| None),
        Some(cli::Commands::Plan(args_plan)) => plan::run(&store, args_plan).map(|_| None),
        Some(cli::Commands::Steps) => steps::run(&store).map(|_| None),
        Some(cli::Commands::Uuid(args_uuid)) => uuid::run(&store, args_uuid).map(|_| None),

        // Apply settings in full
        Some(cli::Commands::Apply(args_apply)) => {
            let location = install_location();
            let report = apply::run(&store, &location, cli_args.dry_run, &args_apply)?;

            match args_apply.json {
                true => println!("{}", report.to_json_string()),
                false => println!("{report}"),
            }

            Ok(Some(report))
        }
    }
}

fn install_location() -> String {
    env::var(constants::ENV_PROV_LOC).unwrap_or(defaults::INSTALL_LOCATION.to_string())
}

fn warn(msg: &str) {
    println!("{}", format!("WARN: {msg}").yellow());
}
