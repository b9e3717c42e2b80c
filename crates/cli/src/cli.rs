use clap::{Parser, Subcommand};
use geneva_core::ActivationMode;

#[derive(Parser)]
#[command(
    name = "geneva",
    about = "Geneva: evolutionary configuration tuning for agent teams",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Output raw JSON (for scripting/piping)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive one category through synthetic executions and report the result
    Simulate(SimulateArgs),

    /// Print the effective configuration (environment + .env)
    Config,
}

#[derive(clap::Args)]
pub struct SimulateArgs {
    /// Category to evolve
    #[arg(short, long, default_value = "routing")]
    pub category: String,

    /// Number of synthetic executions to record
    #[arg(short = 'n', long, default_value = "200")]
    pub executions: u32,

    /// Population size
    #[arg(short, long, default_value = "8")]
    pub population: usize,

    /// Quality of the first execution
    #[arg(long, default_value = "0.7")]
    pub quality: f64,

    /// Quality change per execution (negative to simulate decay)
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    pub drift: f64,

    /// Uniform noise added to every score
    #[arg(long, default_value = "0.05")]
    pub noise: f64,

    /// Activation mode, overriding GENEVA_MODE
    #[arg(long)]
    pub mode: Option<ActivationMode>,

    /// Acknowledge experimental modes for this run
    #[arg(long)]
    pub acknowledge: bool,

    /// Seed for both the engine and the synthetic telemetry
    #[arg(long)]
    pub seed: Option<u64>,

    /// Executions between telemetry-triggered generations
    #[arg(long)]
    pub frequency: Option<u64>,
}
