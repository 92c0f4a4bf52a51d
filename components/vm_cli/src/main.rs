//! Tiered VM CLI
//!
//! Entry point for the `tiervm` binary. Parses CLI arguments, installs the
//! log subscriber and delegates to the Runtime.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vm_cli::{Cli, CliError, CliResult, Runtime};

fn init_logging(level: Option<&str>) -> CliResult<()> {
    let filter = match level {
        Some(level) => {
            EnvFilter::try_new(level).map_err(|_| CliError::LogLevel(level.to_string()))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn run(cli: &Cli) -> CliResult<bool> {
    init_logging(cli.log_level.as_deref())?;

    let report = Runtime::new(cli.workload)
        .with_calls(cli.calls())
        .with_iterations(cli.iterations())
        .with_optimization(!cli.no_optimize)
        .with_print_bytecode(cli.print_bytecode)
        .with_optimizer_config(cli.optimizer_config())
        .run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(report.result.is_success())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
