//! `precinct-scan`: run the precinct scanner controller against a simulated scanner.

mod check_config;
mod cli;
mod logging;
mod simulate;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Simulate(args) => {
            info!("Simulating {} sheet(s)", args.sheets);
            let status = simulate::run(args).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::CheckConfig { path } => {
            let config = check_config::load(&path).await?;
            print!("{}", check_config::render(&config));
        }
    }
    Ok(())
}
