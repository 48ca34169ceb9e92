//! Course storage trait definitions.
//!
//! Defines the interface for the authoritative store of courses, cohorts,
//! participants, memberships, article associations and timelines.

use chrono::{DateTime, Utc};

use crate::Result;
use crate::models::{
    ActivityRecord, Article, ArticleAssociation, ArticleCache, ArticleId, Cohort, CohortId, Course,
    CourseCache, CourseId, Membership, Participant, ParticipantId, RosterChangeSet, TimelineBlock,
    TrainingCompletion, TrainingModule,
};

/// Result of a full cache recomputation, written as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheWrite {
    /// New course-level counters.
    pub cache: CourseCache,
    /// Associations derived from the ledger that do not exist yet. They are
    /// inserted before the article counters are written.
    pub new_associations: Vec<ArticleId>,
    /// New per-article counters.
    pub articles: Vec<(ArticleId, ArticleCache)>,
    /// Activity anomalies seen while computing.
    pub anomalies: u64,
    /// When the values were computed.
    pub computed_at: DateTime<Utc>,
}

/// Trait for course storage backends.
///
/// Implementations must be thread-safe (`Send + Sync`). Methods that write
/// more than one row must do so atomically: either every row is written or
/// none is.
pub trait CourseBackend: Send + Sync {
    // =========================================================================
    // Course Operations
    // =========================================================================

    /// Inserts a new course.
    ///
    /// # Errors
    ///
    /// Returns an error if the slug is taken or storage cannot be accessed.
    fn insert_course(&self, course: &Course) -> Result<()>;

    /// Overwrites a course's descriptive fields (not its cache).
    ///
    /// # Returns
    ///
    /// True if the course existed.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn update_course(&self, course: &Course) -> Result<bool>;

    /// Gets a course by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed or a stored row is
    /// malformed (for example an unknown variant tag).
    fn get_course(&self, id: &CourseId) -> Result<Option<Course>>;

    /// Gets a course by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn get_course_by_slug(&self, slug: &str) -> Result<Option<Course>>;

    /// Lists all courses ordered by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn list_courses(&self) -> Result<Vec<Course>>;

    /// Atomically creates missing associations, then overwrites a course
    /// cache and its article caches.
    ///
    /// # Errors
    ///
    /// Returns an error if the course does not exist or storage cannot be
    /// accessed. On error nothing is written.
    fn write_cache(&self, course_id: &CourseId, write: &CacheWrite) -> Result<()>;

    // =========================================================================
    // Cohort Operations
    // =========================================================================

    /// Inserts a new cohort.
    ///
    /// # Errors
    ///
    /// Returns an error if the slug is taken or storage cannot be accessed.
    fn insert_cohort(&self, cohort: &Cohort) -> Result<()>;

    /// Gets a cohort by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn get_cohort_by_slug(&self, slug: &str) -> Result<Option<Cohort>>;

    /// Adds a course to a cohort. Adding twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if either side does not exist or storage cannot be
    /// accessed.
    fn add_course_to_cohort(&self, cohort_id: &CohortId, course_id: &CourseId) -> Result<()>;

    /// Lists the courses in a cohort.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn courses_in_cohort(&self, cohort_id: &CohortId) -> Result<Vec<Course>>;

    // =========================================================================
    // Participant and Membership Operations
    // =========================================================================

    /// Gets a participant by canonical username.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn get_participant_by_username(&self, username: &str) -> Result<Option<Participant>>;

    /// Creates a participant, or returns the existing one with that username.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn upsert_participant(&self, username: &str, display_name: &str) -> Result<Participant>;

    /// Sets the legacy `trained` flag.
    ///
    /// # Returns
    ///
    /// True if the participant existed.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn set_legacy_trained(&self, participant_id: &ParticipantId, trained: bool) -> Result<bool>;

    /// Loads participants by ID. Unknown IDs are omitted.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn get_participants(&self, ids: &[ParticipantId]) -> Result<Vec<Participant>>;

    /// Lists the memberships of a course.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn list_memberships(&self, course_id: &CourseId) -> Result<Vec<Membership>>;

    /// Lists the courses in which a participant holds the student role.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn courses_for_student(&self, participant_id: &ParticipantId) -> Result<Vec<Course>>;

    /// Applies a reconciliation atomically.
    ///
    /// Creates any participants named by additions, inserts, updates and
    /// deletes memberships, and deletes cascaded article associations, all
    /// in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails. On error nothing is written.
    fn apply_roster(&self, course_id: &CourseId, changes: &RosterChangeSet) -> Result<()>;

    // =========================================================================
    // Article Operations
    // =========================================================================

    /// Inserts or updates an article's metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn upsert_article(&self, article: &Article) -> Result<()>;

    /// Gets an article by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn get_article(&self, id: &ArticleId) -> Result<Option<Article>>;

    /// Lists a course's article associations with their article metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn list_associations(&self, course_id: &CourseId) -> Result<Vec<ArticleAssociation>>;

    /// Creates an association if it does not exist yet.
    ///
    /// # Returns
    ///
    /// True if a new association was created.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn ensure_association(&self, course_id: &CourseId, article_id: &ArticleId) -> Result<bool>;

    /// Appends an edit to the activity ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn append_activity(&self, record: &ActivityRecord) -> Result<()>;

    // =========================================================================
    // Timeline and Training Operations
    // =========================================================================

    /// Inserts a timeline block.
    ///
    /// # Errors
    ///
    /// Returns an error if the course does not exist or storage cannot be
    /// accessed.
    fn insert_timeline_block(&self, block: &TimelineBlock) -> Result<()>;

    /// Lists a course's timeline blocks ordered by week.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn list_timeline_blocks(&self, course_id: &CourseId) -> Result<Vec<TimelineBlock>>;

    /// Inserts or updates a training module.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn upsert_training_module(&self, module: &TrainingModule) -> Result<()>;

    /// Records progress on a training module, replacing earlier progress.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn record_training_completion(&self, completion: &TrainingCompletion) -> Result<()>;
}
