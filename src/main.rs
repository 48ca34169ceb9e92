//! Binary entry point for cohortcache.
//!
//! Drives cache recomputation, roster reconciliation, activity ingestion and
//! survey scheduling against a local `SQLite` database.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use cohortcache::config::CohortCacheConfig;
use cohortcache::observability::{self, ObservabilityConfig};
use std::path::PathBuf;
use std::process::ExitCode;

use commands::{CohortAction, CourseAction, RosterAction};

/// cohortcache - aggregate caches and roster sync for course cohorts.
#[derive(Parser)]
#[command(name = "cohortcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding configuration.
    #[arg(long, global = true, env = "COHORTCACHE_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Recompute cached aggregates.
    Recompute {
        /// Course slug.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        slug: Option<String>,

        /// Recompute every course.
        #[arg(long)]
        all: bool,
    },

    /// List cohort courses due for a survey.
    Survey {
        /// Cohort slug.
        #[arg(long)]
        cohort: String,

        /// Offset in days from the anchor date.
        #[arg(long)]
        days: u32,

        /// Count days back from the anchor instead of forward.
        #[arg(long)]
        before: bool,

        /// Anchor date: start or end.
        #[arg(long, default_value = "end")]
        relative_to: String,

        /// List courses whose survey date is still ahead.
        #[arg(long)]
        upcoming: bool,

        /// Evaluate as of this date (YYYY-MM-DD) instead of today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Check a course variant tag.
    ValidateVariant {
        /// Tag to check.
        tag: String,
    },

    /// Course management.
    Course {
        #[command(subcommand)]
        action: CourseAction,
    },

    /// Cohort management.
    Cohort {
        #[command(subcommand)]
        action: CohortAction,
    },

    /// Roster reconciliation.
    Roster {
        #[command(subcommand)]
        action: RosterAction,
    },

    /// Ingest activity records from a JSON file.
    Ingest {
        /// File holding a JSON array of records.
        file: PathBuf,
    },

    /// Show every course and its cached counters.
    Status,

    /// Show configuration.
    Config {
        /// Print the effective configuration.
        #[arg(long)]
        show: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let observability =
        match observability::init(ObservabilityConfig::from_config(&config, cli.verbose)) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("Failed to initialize observability: {e}");
                return ExitCode::FAILURE;
            },
        };

    let result = run_command(cli.command, &config);

    if let Some(metrics) = observability.metrics() {
        eprint!("{}", metrics.render());
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

fn load_config(cli: &Cli) -> cohortcache::Result<CohortCacheConfig> {
    let config = CohortCacheConfig::load(cli.config.as_deref())?;
    Ok(match &cli.db {
        Some(path) => config.with_database_path(path),
        None => config,
    })
}

/// Runs the selected command.
fn run_command(
    command: Commands,
    config: &CohortCacheConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Recompute { slug, all } => commands::cmd_recompute(config, slug, all),

        Commands::Survey {
            cohort,
            days,
            before,
            relative_to,
            upcoming,
            date,
        } => commands::cmd_survey(config, &cohort, days, before, &relative_to, upcoming, date),

        Commands::ValidateVariant { tag } => commands::cmd_validate_variant(&tag),

        Commands::Course { action } => commands::cmd_course(config, action),

        Commands::Cohort { action } => commands::cmd_cohort(config, action),

        Commands::Roster { action } => commands::cmd_roster(config, action),

        Commands::Ingest { file } => commands::cmd_ingest(config, &file),

        Commands::Status => commands::cmd_status(config),

        Commands::Config { show } => commands::cmd_config(config, show),
    }
}
