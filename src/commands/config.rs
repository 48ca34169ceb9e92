//! Config command handler.
//!
//! Contains the implementation of the `config` CLI command and
//! display helpers for configuration output.

use cohortcache::config::CohortCacheConfig;

/// Config command.
pub fn cmd_config(config: &CohortCacheConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !show {
        println!("Use --show to display configuration");
        return Ok(());
    }

    println!("Current Configuration");
    println!("=====================");
    println!();

    println!("Config File:");
    match &config.source {
        Some(path) => println!("  {}", path.display()),
        None => println!("  (none - using defaults)"),
    }
    println!();

    match config.resolved_database_path() {
        Ok(path) => println!("Database: {}", path.display()),
        Err(e) => println!("Database: (unresolved: {e})"),
    }
    println!("Legacy Training Cutover: {}", config.training.legacy_cutover);
    println!(
        "Roster Directory: {}",
        config
            .roster
            .directory
            .as_ref()
            .map_or_else(|| "(not set)".to_string(), |d| d.display().to_string())
    );
    println!();

    println!("Observability:");
    display_logging_config(config);
    display_metrics_config(config);
    println!();

    println!("Effective TOML:");
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Helper to display logging configuration.
fn display_logging_config(config: &CohortCacheConfig) {
    let logging = &config.logging;
    println!(
        "  Log Level: {}",
        logging.level.as_deref().unwrap_or("(default)")
    );
    println!(
        "  Log Format: {}",
        logging.format.as_deref().unwrap_or("pretty")
    );
    if let Some(ref file) = logging.file {
        println!("  Log File: {}", file.display());
    }
}

/// Helper to display metrics configuration.
fn display_metrics_config(config: &CohortCacheConfig) {
    let enabled = config.metrics.enabled.unwrap_or(false);
    println!(
        "  Metrics: {}",
        if enabled { "enabled" } else { "disabled" }
    );
    if let Some(port) = config.metrics.port {
        println!("  Metrics Port: {port}");
    }
}
