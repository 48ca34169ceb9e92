//! Business logic services.
//!
//! Services orchestrate storage backends and provide the high-level
//! operations: recompute, reconcile, ingest and schedule queries. Services
//! that mutate one course share a [`CourseLocks`] registry so their work on
//! that course never interleaves.

mod aggregator;
mod clock;
mod course;
mod enrollment;
mod ingest;
mod locks;
mod schedule;
mod training;

pub use aggregator::{CacheAggregator, RecomputeAllReport, RecomputeReport};
pub use clock::{Clock, FixedClock, SystemClock};
pub use course::{CourseService, validate_course};
pub use enrollment::{
    Contributors, EnrollmentReconciler, JsonFileRosterSource, ReconcileReport, RosterSource,
    plan_cascade, plan_roster,
};
pub use ingest::{ActivityIngestor, IngestReport, ParsedRecords};
pub use locks::CourseLocks;
pub use schedule::ScheduleIndex;
pub use training::{TrainingDueEvaluator, TrainingMode, TrainingOutcome};
