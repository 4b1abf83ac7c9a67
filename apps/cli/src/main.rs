//! nexstage command-line entry point.

mod args;
mod commands;
mod config;

use std::process::ExitCode;

use clap::Parser;
use nexstage_client::ClientError;
use nexstage_deploy::DeployError;
use tracing_subscriber::EnvFilter;

use crate::args::{Args, Command};

fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins over --verbose.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.verbose.as_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    if args.command == Command::Version {
        commands::print_version(&mut std::io::stdout())?;
        return Ok(ExitCode::SUCCESS);
    }

    let file = config::FileConfig::load(args.config.as_deref())?;
    let settings = config::Settings::resolve(&args, file)?;
    tracing::debug!(base = %settings.client.base_uri, "configuration resolved");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(commands::run(args.command, &settings))
}

/// Prints the error chain and any errors the server attached.
fn report(err: &anyhow::Error) {
    eprintln!("error: {err:#}");

    let client_error = err.downcast_ref::<ClientError>().or_else(|| {
        match err.downcast_ref::<DeployError>() {
            Some(DeployError::Client(e)) => Some(e),
            _ => None,
        }
    });
    if let Some(e) = client_error {
        for nexus_error in e.nexus_errors() {
            eprintln!("  {nexus_error}");
        }
    }
}
