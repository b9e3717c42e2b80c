use colored::Colorize;

/// Format an error for CLI display with contextual help messages.
pub fn display_error(err: &anyhow::Error) {
    let msg = format!("{err}");

    if msg.contains("requires explicit experimental acknowledgment") {
        eprintln!("  {} {}", "ERROR".red().bold(), msg);
        eprintln!(
            "        Pass {} or set {}",
            "--acknowledge".dimmed(),
            "GENEVA_ACKNOWLEDGE_EXPERIMENTAL=true".dimmed()
        );
    } else if msg.contains("Configuration error") || msg.starts_with("Failed to parse GENEVA_") {
        eprintln!("  {} {}", "ERROR".red().bold(), msg);
        for cause in err.chain().skip(1) {
            eprintln!("        {} {cause}", "caused by:".dimmed());
        }
        eprintln!(
            "        Check your GENEVA_* variables or .env, then run: {}",
            "geneva config".dimmed()
        );
    } else {
        eprintln!("  {} {}", "ERROR".red().bold(), msg);
        for cause in err.chain().skip(1) {
            eprintln!("        {} {cause}", "caused by:".dimmed());
        }
    }
}
