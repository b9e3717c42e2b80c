use colored::Colorize;
use comfy_table::{presets::NOTHING, ContentArrangement, Table};
use geneva_core::evolution::GenerationSummary;
use geneva_core::{
    AdapterStatus, Alert, AlertSeverity, CategoryStatus, ConfigurationRecord, ConfigurationSource,
    EvolutionEvent, HealthStatus,
};
use std::sync::Arc;

/// Print a decorated section header.
pub fn print_header(title: &str) {
    let line = "─".repeat(36);
    println!();
    println!("  {}", title.bold());
    println!("  {}", line.dimmed());
}

/// Health dot plus label: ● healthy, ◐ warning/degraded, ✖ critical.
pub fn health_label(health: HealthStatus) -> String {
    match health {
        HealthStatus::Healthy => format!("{} {}", "●".green(), health),
        HealthStatus::Warning => format!("{} {}", "◐".yellow(), health),
        HealthStatus::Degraded => format!("{} {}", "◐".red(), health),
        HealthStatus::Critical => format!("{} {}", "✖".red().bold(), health),
    }
}

fn severity_label(severity: AlertSeverity) -> String {
    let text = format!("{:?}", severity).to_lowercase();
    match severity {
        AlertSeverity::Low => text.dimmed().to_string(),
        AlertSeverity::Medium => text.yellow().to_string(),
        AlertSeverity::High => text.red().to_string(),
        AlertSeverity::Critical => text.red().bold().to_string(),
    }
}

pub fn print_status(status: &CategoryStatus, adapter: Option<&AdapterStatus>) {
    let baseline = status
        .baseline
        .map_or_else(|| "-".dimmed().to_string(), |b| format!("{b:.3}"));
    println!("  {}       {}", "mode:".dimmed(), status.mode);
    println!("  {} {}", "generation:".dimmed(), status.generation);
    println!("  {} {:.3}", "best fitness:".dimmed(), status.best_fitness);
    println!("  {} {:.3}", "mean fitness:".dimmed(), status.mean_fitness);
    println!("  {}   {}", "baseline:".dimmed(), baseline);
    println!(
        "  {}  {} rollbacks, {} breakthroughs, {} patterns",
        "history:".dimmed(),
        status.rollback_count,
        status.breakthrough_count,
        status.pattern_count
    );
    if let Some(eval) = &status.best_evaluation {
        println!(
            "  {}  {:.3} overall, {:.2} confidence",
            "best score:".dimmed(),
            eval.overall,
            eval.confidence
        );
    }
    if let Some(last) = status.recent_rollbacks.last() {
        println!(
            "  {}  generation {} restored to {}: {}",
            "last rollback:".dimmed(),
            last.generation,
            last.restored_generation,
            last.reason.to_string().yellow()
        );
    }
    if let Some(a) = adapter {
        println!(
            "  {}    {} executions, {} evolutions ({} adopted, {} rejected)",
            "adapter:".dimmed(),
            a.executions,
            a.evolutions,
            a.adopted.to_string().green(),
            a.rejected.to_string().red()
        );
    }
}

/// Print the most recent generations, newest last.
pub fn print_generations_table(summaries: &[GenerationSummary]) {
    if summaries.is_empty() {
        println!("  {}", "No generations committed.".dimmed());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["  gen", "mean", "best", "risk", "size", "committed"]);

    for s in summaries {
        table.add_row(vec![
            format!("  {}", s.generation),
            format!("{:.3}", s.mean_fitness),
            format!("{:.3}", s.best_fitness).bold().to_string(),
            format!("{:.2}", s.mean_risk),
            s.population_size.to_string(),
            s.committed_at.format("%H:%M:%S").to_string().dimmed().to_string(),
        ]);
    }

    println!("{table}");
}

pub fn print_configuration(record: &ConfigurationRecord) {
    let source = match record.source {
        ConfigurationSource::Default => "default".dimmed().to_string(),
        ConfigurationSource::Evolved => "evolved".green().to_string(),
    };
    let id = record
        .chromosome_id
        .map_or_else(|| "-".to_string(), |id| id.short());
    println!(
        "  {} {}  {} {}  {} {}",
        "source:".dimmed(),
        source,
        "chromosome:".dimmed(),
        id,
        "fitness:".dimmed(),
        format!("{:.3}", record.fitness).bold()
    );
    println!(
        "  {} {:?} / {:?} / {:?}",
        "topology:".dimmed(),
        record.coordination,
        record.communication,
        record.consensus
    );

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);
    for (name, value) in &record.parameters {
        table.add_row(vec![format!("  {}", name.dimmed()), format!("{value:.3}")]);
    }
    println!("{table}");
}

/// Print open alerts, most severe first.
pub fn print_alerts_table(alerts: &[Alert]) {
    if alerts.is_empty() {
        println!("  {}", "No open alerts.".dimmed());
        return;
    }

    let mut sorted: Vec<&Alert> = alerts.iter().collect();
    sorted.sort_by(|a, b| b.severity.cmp(&a.severity));

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for alert in sorted {
        table.add_row(vec![
            format!("  {}", severity_label(alert.severity)),
            format!("{:?}", alert.kind).to_lowercase(),
            alert.category.clone().bold().to_string(),
            format!("×{}", alert.occurrences).dimmed().to_string(),
            alert.message.clone(),
        ]);
    }

    println!("{table}");
}

/// Print recent events, oldest first.
pub fn print_events_table(events: &[Arc<EvolutionEvent>]) {
    if events.is_empty() {
        println!("  {}", "No events.".dimmed());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);
    for event in events {
        table.add_row(vec![
            format!("  {}", event.timestamp.format("%H:%M:%S%.3f"))
                .dimmed()
                .to_string(),
            event.data.kind().to_string(),
            event.category().to_string(),
        ]);
    }
    println!("{table}");
}
