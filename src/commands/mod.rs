//! Command handlers module.
//!
//! This module organizes the CLI command implementations into separate files:
//! - `core.rs`: recompute, ingest, status, validate-variant
//! - `course.rs`: course and cohort management
//! - `roster.rs`: roster import
//! - `survey.rs`: survey scheduling queries
//! - `config.rs`: configuration display

mod config;
mod core;
mod course;
mod roster;
mod survey;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;
use cohortcache::config::CohortCacheConfig;
use cohortcache::services::CourseLocks;
use cohortcache::{
    ActivityIngestor, CacheAggregator, CourseService, EnrollmentReconciler, ScheduleIndex,
    SqliteCourseBackend,
};

// Re-export command functions
pub use config::cmd_config;
pub use core::{cmd_ingest, cmd_recompute, cmd_status, cmd_validate_variant};
pub use course::{cmd_cohort, cmd_course};
pub use roster::cmd_roster;
pub use survey::cmd_survey;

/// Course subcommands.
#[derive(Subcommand)]
pub enum CourseAction {
    /// Create a course.
    Create {
        /// Unique slug.
        slug: String,

        /// Display title.
        #[arg(long)]
        title: String,

        /// First day (YYYY-MM-DD).
        #[arg(long)]
        start: chrono::NaiveDate,

        /// Last day (YYYY-MM-DD).
        #[arg(long)]
        end: chrono::NaiveDate,

        /// Variant tag.
        #[arg(long, default_value = "classroom_program")]
        variant: String,

        /// Enrollment passcode.
        #[arg(long)]
        passcode: Option<String>,
    },

    /// Show a course.
    Show {
        /// Course slug.
        slug: String,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Cohort subcommands.
#[derive(Subcommand)]
pub enum CohortAction {
    /// Create a cohort.
    Create {
        /// Unique slug.
        slug: String,

        /// Display title.
        #[arg(long, default_value = "")]
        title: String,
    },

    /// Add a course to a cohort.
    Add {
        /// Cohort slug.
        cohort: String,

        /// Course slug.
        course: String,
    },
}

/// Roster subcommands.
#[derive(Subcommand)]
pub enum RosterAction {
    /// Reconcile a course against a roster snapshot.
    Import {
        /// Course slug.
        course: String,

        /// Snapshot file; defaults to `<roster dir>/<slug>.json`.
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Show the planned changes without writing.
        #[arg(long)]
        dry_run: bool,
    },
}

/// Services wired to one database, sharing one lock registry.
pub struct Services {
    /// Course and cohort administration.
    pub courses: CourseService,
    /// Cache recomputation.
    pub aggregator: CacheAggregator,
    /// Roster reconciliation.
    pub reconciler: EnrollmentReconciler,
    /// Activity ingestion.
    pub ingestor: ActivityIngestor,
    /// Survey scheduling.
    pub schedule: ScheduleIndex,
}

impl Services {
    /// Opens the configured database and builds every service over it.
    pub fn open(config: &CohortCacheConfig) -> cohortcache::Result<Self> {
        let path = config.resolved_database_path()?;
        tracing::debug!(path = %path.display(), "Opening database");
        let backend = Arc::new(SqliteCourseBackend::new(&path)?);
        let locks = Arc::new(CourseLocks::new());

        Ok(Self {
            courses: CourseService::new(backend.clone()),
            aggregator: CacheAggregator::new(backend.clone(), backend.clone(), config.training)
                .with_locks(locks.clone()),
            reconciler: EnrollmentReconciler::new(backend.clone(), backend.clone())
                .with_locks(locks.clone()),
            ingestor: ActivityIngestor::new(backend.clone()).with_locks(locks),
            schedule: ScheduleIndex::new(backend),
        })
    }
}
