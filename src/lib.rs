//! # cohortcache
//!
//! Aggregate cache maintenance for course cohorts working on a shared wiki.
//!
//! Courses collect participants, and participants produce edits and training
//! completions that arrive asynchronously from an external roster/content
//! source. This crate keeps the derived per-course counters consistent with
//! that raw activity and answers the date-window questions that drive survey
//! notifications.
//!
//! ## Components
//!
//! - [`models::CourseVariant`]: closed table of course kinds and their flags
//! - [`services::CacheAggregator`]: bottom-up recompute of cached counters
//! - [`services::EnrollmentReconciler`]: roster diff, cascade and atomic apply
//! - [`services::TrainingDueEvaluator`]: who has finished their due training
//! - [`services::ScheduleIndex`]: survey-readiness predicates over a cohort
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cohortcache::services::CacheAggregator;
//! use cohortcache::storage::SqliteCourseBackend;
//!
//! let backend = Arc::new(SqliteCourseBackend::new("cohortcache.db")?);
//! let aggregator = CacheAggregator::new(backend.clone(), backend, config.training);
//! let report = aggregator.recompute(&course_id)?;
//! println!("{} students, {} articles", report.cache.user_count, report.cache.article_count);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{CohortCacheConfig, TrainingConfig};
pub use models::{
    ActivityRecord, Article, ArticleAssociation, ArticleId, Cohort, CohortId, Course, CourseCache,
    CourseId, CourseVariant, Membership, Participant, ParticipantId, RelativeTo, Role,
    RosterSnapshot, SurveyQuery,
};
pub use services::{
    ActivityIngestor, CacheAggregator, CourseService, EnrollmentReconciler, ScheduleIndex,
    TrainingDueEvaluator,
};
pub use storage::{ActivityLedger, CourseBackend, SqliteCourseBackend};

/// Error type for cohortcache operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed roster JSON, unknown role names, empty identifiers |
/// | `Validation` | Unknown variant tag, missing passcode, inverted course dates |
/// | `NotFound` | Recompute or reconcile against a course that does not exist |
/// | `OperationFailed` | `SQLite` failures, file I/O, config parsing |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A roster snapshot cannot be parsed
    /// - A roster names a role outside the known set
    /// - An activity file is not a JSON array of records
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A record failed validation and was not stored.
    ///
    /// Raised by the course create/update flow before anything is persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of entity (course, cohort, participant, ...).
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements or transactions fail
    /// - Filesystem I/O errors occur
    /// - Observability cannot be initialized
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds a [`Error::NotFound`] for a course identifier.
    #[must_use]
    pub fn course_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "course",
            id: id.to_string(),
        }
    }

    /// Returns `true` if this error is a [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for cohortcache operations.
pub type Result<T> = std::result::Result<T, Error>;
