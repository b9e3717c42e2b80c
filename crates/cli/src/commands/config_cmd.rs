use anyhow::Result;
use colored::Colorize;
use geneva_core::RuntimeConfig;

const ENV_VARS: &[&str] = &[
    "GENEVA_MODE",
    "GENEVA_ACKNOWLEDGE_EXPERIMENTAL",
    "GENEVA_MUTATION_RATE",
    "GENEVA_ELITE_FRACTION",
    "GENEVA_SELECTION_FRACTION",
    "GENEVA_MAX_OFFSPRING",
    "GENEVA_DEGRADATION_THRESHOLD",
    "GENEVA_ROLLBACK_WINDOW",
    "GENEVA_BREAKTHROUGH_THRESHOLD",
    "GENEVA_EVOLUTION_INTERVAL_SECS",
    "GENEVA_RNG_SEED",
    "GENEVA_MIN_EXECUTIONS",
    "GENEVA_EVOLUTION_FREQUENCY",
    "GENEVA_TELEMETRY_BUFFER",
    "GENEVA_MONITOR_INTERVAL_SECS",
];

pub fn run(json_mode: bool) -> Result<()> {
    let config = RuntimeConfig::load()?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!();
    println!("  {}", "Configuration".bold());
    println!("  {}", "─".repeat(36).dimmed());
    println!("  {}", serde_json::to_string_pretty(&config)?.replace('\n', "\n  "));
    println!();

    let active: Vec<&str> = ENV_VARS
        .iter()
        .copied()
        .filter(|name| std::env::var(name).is_ok())
        .collect();
    for name in &active {
        println!("  {} {name} environment variable is active", "ℹ".blue());
    }
    if active.is_empty() {
        println!("  {}", "All values are defaults.".dimmed());
    }

    Ok(())
}
