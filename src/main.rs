// Movbay command line entry point

use anyhow::Result;
use clap::Parser;
use movbay_core::{cli, observability};
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    observability::init(cli.verbose, cli.json_logs)?;

    if let Err(e) = cli::commands::execute(cli).await {
        error!(error = %e, "Command failed");
        cli::error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
