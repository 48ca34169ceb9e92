//! Training modules, timeline blocks and completions.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{BlockId, CourseId, ModuleId, ParticipantId};

/// A unit of on-wiki training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingModule {
    /// Identifier.
    pub id: ModuleId,
    /// URL slug.
    pub slug: String,
    /// Display name.
    pub name: String,
}

/// One block of a course timeline.
///
/// Blocks sit in numbered weeks starting from the course's timeline start.
/// Training modules attached to a block are due at the end of that week
/// unless the block carries an explicit due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineBlock {
    /// Identifier.
    pub id: BlockId,
    /// Owning course.
    pub course_id: CourseId,
    /// Zero-based week the block belongs to.
    pub week_index: u32,
    /// Explicit due date overriding the week's last day.
    pub due_date: Option<NaiveDate>,
    /// Training modules assigned by this block.
    pub training_modules: Vec<ModuleId>,
}

impl TimelineBlock {
    /// Returns the day by which this block's modules must be complete.
    #[must_use]
    pub fn effective_due_date(&self, timeline_start: NaiveDate) -> NaiveDate {
        self.due_date.unwrap_or_else(|| {
            let offset = u64::from(self.week_index) * 7 + 6;
            timeline_start
                .checked_add_days(Days::new(offset))
                .unwrap_or(NaiveDate::MAX)
        })
    }
}

/// A participant's progress on one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingCompletion {
    /// The participant.
    pub participant_id: ParticipantId,
    /// The module.
    pub module_id: ModuleId,
    /// When it was completed; `None` means started but not finished.
    pub completed_at: Option<DateTime<Utc>>,
}

impl TrainingCompletion {
    /// Returns `true` if the module was finished.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}
