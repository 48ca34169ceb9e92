//! Courses, their cached counters and cohorts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{CohortId, CourseId, CourseVariant};

/// Derived counters for a course.
///
/// Every field is a pure function of current membership, the activity ledger
/// and the current date. The fields are only ever overwritten as a whole by
/// [`crate::services::CacheAggregator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCache {
    /// Students, not counting anyone who is also an instructor.
    pub user_count: u64,
    /// Distinct mainspace articles edited by students in the window.
    pub article_count: u64,
    /// Subset of `article_count` created by students in the window.
    pub new_article_count: u64,
    /// Edits by students in the window.
    pub revision_count: u64,
    /// Bytes added by students in the window.
    pub character_sum: u64,
    /// Latest view counts summed across the counted articles.
    pub view_sum: u64,
    /// Students with no overdue training.
    pub trained_count: u64,
}

impl CourseCache {
    /// Returns `true` if every counter is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.user_count == 0
            && self.article_count == 0
            && self.new_article_count == 0
            && self.revision_count == 0
            && self.character_sum == 0
            && self.view_sum == 0
            && self.trained_count == 0
    }
}

/// A tracked cohort of participants with a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    /// Unique identifier.
    pub id: CourseId,
    /// Human-facing handle, unique across courses.
    pub slug: String,
    /// Display title.
    pub title: String,
    /// First day of the course.
    pub start: NaiveDate,
    /// Last day of the course.
    pub end: NaiveDate,
    /// First day of the assignment timeline.
    pub timeline_start: NaiveDate,
    /// Last day of the assignment timeline.
    pub timeline_end: NaiveDate,
    /// Course kind.
    pub variant: CourseVariant,
    /// Enrollment passcode, if any.
    pub passcode: Option<String>,
    /// Cached counters.
    pub cache: CourseCache,
    /// Number of activity anomalies seen by the last recompute.
    pub recompute_anomalies: u64,
    /// When the cache was last recomputed.
    pub cache_updated_at: Option<DateTime<Utc>>,
}

impl Course {
    /// Returns `true` if `date` falls inside the course window (inclusive).
    #[must_use]
    pub fn window_contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Returns `true` if the timestamp falls inside the course window.
    #[must_use]
    pub fn window_contains_timestamp(&self, at: DateTime<Utc>) -> bool {
        self.window_contains(at.date_naive())
    }

    /// Returns `true` if edit aggregation applies to this course.
    #[must_use]
    pub const fn tracks_edits(&self) -> bool {
        self.variant.traits().wiki_edits_enabled
    }
}

/// Request to create a course.
///
/// The variant is carried as the proposed tag so it can be validated before
/// anything is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourse {
    /// Human-facing handle.
    pub slug: String,
    /// Display title.
    pub title: String,
    /// First day of the course.
    pub start: NaiveDate,
    /// Last day of the course.
    pub end: NaiveDate,
    /// Timeline start, defaulting to `start`.
    #[serde(default)]
    pub timeline_start: Option<NaiveDate>,
    /// Timeline end, defaulting to `end`.
    #[serde(default)]
    pub timeline_end: Option<NaiveDate>,
    /// Proposed variant tag.
    #[serde(default = "default_variant_tag")]
    pub variant: String,
    /// Enrollment passcode.
    #[serde(default)]
    pub passcode: Option<String>,
}

fn default_variant_tag() -> String {
    CourseVariant::default().as_str().to_string()
}

impl NewCourse {
    /// Creates a request for a default-variant course.
    #[must_use]
    pub fn new(
        slug: impl Into<String>,
        title: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            start,
            end,
            timeline_start: None,
            timeline_end: None,
            variant: default_variant_tag(),
            passcode: None,
        }
    }

    /// Sets the proposed variant tag.
    #[must_use]
    pub fn with_variant(mut self, tag: impl Into<String>) -> Self {
        self.variant = tag.into();
        self
    }

    /// Sets the passcode.
    #[must_use]
    pub fn with_passcode(mut self, passcode: impl Into<String>) -> Self {
        self.passcode = Some(passcode.into());
        self
    }

    /// Sets the timeline window.
    #[must_use]
    pub const fn with_timeline(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.timeline_start = Some(start);
        self.timeline_end = Some(end);
        self
    }
}

/// Partial update to a course. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseUpdate {
    /// New title.
    pub title: Option<String>,
    /// New start date.
    pub start: Option<NaiveDate>,
    /// New end date.
    pub end: Option<NaiveDate>,
    /// New timeline start.
    pub timeline_start: Option<NaiveDate>,
    /// New timeline end.
    pub timeline_end: Option<NaiveDate>,
    /// Proposed variant tag.
    pub variant: Option<String>,
    /// New passcode. `Some("")` clears it.
    pub passcode: Option<String>,
}

/// A grouping of courses used to scope scheduling queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cohort {
    /// Unique identifier.
    pub id: CohortId,
    /// Human-facing handle.
    pub slug: String,
    /// Display title.
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn sample_course() -> Course {
        Course {
            id: CourseId::new("c1"),
            slug: "uni/biology_2025".to_string(),
            title: "Biology".to_string(),
            start: date(2025, 1, 10),
            end: date(2025, 5, 1),
            timeline_start: date(2025, 1, 10),
            timeline_end: date(2025, 5, 1),
            variant: CourseVariant::ClassroomProgram,
            passcode: Some("abc".to_string()),
            cache: CourseCache::default(),
            recompute_anomalies: 0,
            cache_updated_at: None,
        }
    }

    #[test]
    fn test_window_is_inclusive() {
        let course = sample_course();
        assert!(course.window_contains(date(2025, 1, 10)));
        assert!(course.window_contains(date(2025, 5, 1)));
        assert!(!course.window_contains(date(2025, 1, 9)));
        assert!(!course.window_contains(date(2025, 5, 2)));
    }

    #[test]
    fn test_default_cache_is_empty() {
        assert!(CourseCache::default().is_empty());
        let cache = CourseCache {
            view_sum: 1,
            ..Default::default()
        };
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_new_course_defaults_to_classroom_program() {
        let req = NewCourse::new("s", "t", date(2025, 1, 1), date(2025, 2, 1));
        assert_eq!(req.variant, "classroom_program");
        assert!(req.passcode.is_none());
    }
}
