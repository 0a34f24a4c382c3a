pub mod cli;
mod commands;
pub mod core;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::core::context::AppContext;
use crate::core::error::CraftResult;
use crate::core::paths::DataPaths;

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "warn,craftctl_lib=debug"
    } else {
        "warn,craftctl_lib=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn execute(cli: Cli) -> CraftResult<()> {
    let ctx = AppContext::new(cli.dir, DataPaths::resolve()).await?;
    commands::dispatch(&ctx, cli.command).await
}

/// Parse arguments, run one command and map the result to an exit code.
pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!("craftctl {} starting", env!("CARGO_PKG_VERSION"));

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
