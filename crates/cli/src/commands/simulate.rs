use anyhow::{Context, Result};
use colored::Colorize;
use geneva_core::{Chromosome, EvolutionRuntime, PerformanceRecord, RuntimeConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

/// Events shown after a run.
const RECENT_EVENTS: usize = 12;

use crate::cli::SimulateArgs;
use crate::output;

pub async fn run(args: SimulateArgs, json_mode: bool) -> Result<()> {
    let mut config = RuntimeConfig::load()?;
    if let Some(mode) = args.mode {
        config.engine.default_mode = mode;
    }
    if args.acknowledge {
        config.engine.acknowledge_experimental = true;
    }
    if let Some(seed) = args.seed {
        config.engine.rng_seed = Some(seed);
    }
    if let Some(frequency) = args.frequency {
        config.adapter.evolution_frequency = frequency;
    }

    let runtime = EvolutionRuntime::new(config)?;
    let seed = Chromosome::seed(&args.category)
        .with_role("planner", &[("depth", 0.6), ("breadth", 0.4)])
        .with_role("executor", &[("parallelism", 0.5)])
        .with_role("reviewer", &[("strictness", 0.7)]);

    if !runtime
        .initialize(&args.category, &seed, args.population)
        .await?
    {
        println!(
            "  {} Evolution is disabled, nothing to simulate",
            "ℹ".blue()
        );
        return Ok(());
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let noise = args.noise.abs();
    let mut jitter = |base: f64| -> f64 {
        let delta = if noise > 0.0 {
            rng.gen_range(-noise..=noise)
        } else {
            0.0
        };
        (base + delta).clamp(0.0, 1.0)
    };

    info!(
        category = %args.category,
        executions = args.executions,
        drift = args.drift,
        "Starting simulation"
    );
    for i in 0..args.executions {
        let quality = jitter(args.quality + args.drift * f64::from(i));
        let speed = jitter(0.7);
        let efficiency = jitter(0.75);
        let reliability = jitter(0.85);
        let success = quality >= 0.5;
        let errors = if success { 0 } else { 1 };
        let record = PerformanceRecord::scores(quality, speed, efficiency, reliability)
            .with_outcome(success, 100.0 + 400.0 * (1.0 - speed), errors);
        runtime
            .record_telemetry(&args.category, record)
            .await
            .with_context(|| format!("Failed to record execution {}", i + 1))?;
    }

    let dashboard = runtime.dashboard().await;
    let report = runtime.status(Some(&args.category)).await?;
    let configuration = runtime.current_configuration(&args.category).await?;
    let events = runtime.recent_events(RECENT_EVENTS).await;
    runtime.shutdown().await;

    if json_mode {
        let data = serde_json::json!({
            "status": report,
            "configuration": configuration,
            "dashboard": dashboard,
            "events": events.iter().map(|e| e.as_ref()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if let Some(status) = report.categories.first() {
        output::print_header(&format!(
            "Category {} (geneva {})",
            status.category, report.version
        ));
        output::print_status(status, report.adapters.first());
        output::print_generations_table(&status.recent_generations);
    }
    output::print_header("Recommended configuration");
    output::print_configuration(&configuration);
    output::print_header(&format!(
        "Alerts {}",
        output::health_label(dashboard.health)
    ));
    output::print_alerts_table(&dashboard.open_alerts);
    output::print_header("Recent events");
    output::print_events_table(&events);
    println!();

    Ok(())
}
