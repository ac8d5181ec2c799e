mod apply;
mod cli;
mod constants;
mod disk;
mod errors;
mod linux;
mod logging;
mod run;
mod settings;
mod steps;
mod utils;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use crate::steps::RunState;

fn main() -> ExitCode {
    let cli_args = cli::Cli::parse();

    if let Err(err) = logging::init(cli_args.verbose) {
        eprintln!("failed to initialize logging: {err}");
    }

    match run::run(cli_args) {
        Err(err) => {
            eprintln!("{}", format!("prov-rs error: {err}").red());
            ExitCode::FAILURE
        }

        Ok(Some(report)) if report.state == RunState::Aborted => {
            if let Some(failed) = report.first_fatal() {
                eprintln!(
                    "{}",
                    format!(
                        "aborted at step {}: {}",
                        failed.name,
                        failed.error.as_deref().unwrap_or("unknown error")
                    )
                    .red()
                );
            }

            ExitCode::FAILURE
        }

        Ok(Some(report)) => {
            let warnings = report.warnings();
            if !warnings.is_empty() {
                let names: Vec<&str> = warnings.iter().map(|o| o.name.as_str()).collect();
                log::warn!("completed with failed steps: {}", names.join(", "));
            }

            ExitCode::SUCCESS
        }

        Ok(None) => ExitCode::SUCCESS,
    }
}
