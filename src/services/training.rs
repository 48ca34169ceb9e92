//! Training completion evaluation.
//!
//! A student is trained when every module due by today is complete. Modules
//! become due through the timeline: each block assigns modules, due at the
//! end of the block's week unless the block names a date. Before any module
//! is due everyone counts as trained.
//!
//! Courses that predate the module system have no timeline at all. For those
//! starting before [`TrainingConfig::legacy_cutover`] the evaluator reads the
//! per-participant `trained` flag instead.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::instrument;

use crate::config::TrainingConfig;
use crate::models::{Course, ModuleId, Participant, ParticipantId, TimelineBlock, TrainingCompletion};

/// How training was judged for a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingMode {
    /// Per-participant legacy flag.
    Legacy,
    /// Due modules from the timeline.
    DueModules,
}

impl TrainingMode {
    /// Returns the mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::DueModules => "due_modules",
        }
    }
}

/// Result of evaluating a set of students.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingOutcome {
    /// Which rule was applied.
    pub mode: TrainingMode,
    /// Modules due as of the evaluation date (empty in legacy mode).
    pub due_modules: BTreeSet<ModuleId>,
    /// Students judged trained.
    pub trained: BTreeSet<ParticipantId>,
}

impl TrainingOutcome {
    /// Number of trained students.
    #[must_use]
    pub fn trained_count(&self) -> u64 {
        u64::try_from(self.trained.len()).unwrap_or(u64::MAX)
    }
}

/// Decides which students have completed their due training.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrainingDueEvaluator {
    config: TrainingConfig,
}

impl TrainingDueEvaluator {
    /// Creates an evaluator.
    #[must_use]
    pub const fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Selects the rule for a course.
    #[must_use]
    pub fn mode(&self, course: &Course, blocks: &[TimelineBlock]) -> TrainingMode {
        let has_timeline = blocks.iter().any(|b| b.course_id == course.id);
        if !has_timeline && course.start < self.config.legacy_cutover {
            TrainingMode::Legacy
        } else {
            TrainingMode::DueModules
        }
    }

    /// Modules assigned by the course's blocks whose due date is strictly
    /// before `today`.
    #[must_use]
    pub fn due_modules(
        course: &Course,
        blocks: &[TimelineBlock],
        today: NaiveDate,
    ) -> BTreeSet<ModuleId> {
        blocks
            .iter()
            .filter(|b| b.course_id == course.id)
            .filter(|b| b.effective_due_date(course.timeline_start) < today)
            .flat_map(|b| b.training_modules.iter().cloned())
            .collect()
    }

    /// Returns `true` if every due module has a finished completion by
    /// `participant`. Vacuously true when nothing is due.
    #[must_use]
    pub fn is_trained(
        participant: &ParticipantId,
        due: &BTreeSet<ModuleId>,
        completions: &[TrainingCompletion],
    ) -> bool {
        if due.is_empty() {
            return true;
        }
        let finished: BTreeSet<&ModuleId> = completions
            .iter()
            .filter(|c| &c.participant_id == participant && c.is_complete())
            .map(|c| &c.module_id)
            .collect();
        due.iter().all(|module| finished.contains(module))
    }

    /// Evaluates every student of a course.
    #[instrument(
        name = "cohortcache.training.evaluate",
        skip_all,
        fields(course_id = %course.id, students = students.len(), %today)
    )]
    pub fn evaluate(
        &self,
        course: &Course,
        blocks: &[TimelineBlock],
        students: &[Participant],
        completions: &[TrainingCompletion],
        today: NaiveDate,
    ) -> TrainingOutcome {
        let mode = self.mode(course, blocks);
        if mode == TrainingMode::Legacy {
            let trained = students
                .iter()
                .filter(|p| p.trained)
                .map(|p| p.id.clone())
                .collect();
            return TrainingOutcome {
                mode,
                due_modules: BTreeSet::new(),
                trained,
            };
        }

        let due = Self::due_modules(course, blocks, today);
        let trained: BTreeSet<ParticipantId> = students
            .iter()
            .filter(|p| Self::is_trained(&p.id, &due, completions))
            .map(|p| p.id.clone())
            .collect();

        tracing::debug!(
            due = due.len(),
            trained = trained.len(),
            "Evaluated training"
        );

        TrainingOutcome {
            mode,
            due_modules: due,
            trained,
        }
    }
}
