pub mod config_cmd;
pub mod simulate;

use anyhow::Result;
use crate::cli::*;

pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Simulate(args) => simulate::run(args, cli.json).await,
        Commands::Config => config_cmd::run(cli.json),
    }
}
