//! Data models for cohortcache.
//!
//! Courses, the people enrolled in them, the articles they touch and the
//! training they owe. Everything here is plain data; behavior that spans
//! entities lives in [`crate::services`].

mod activity;
mod article;
mod course;
mod ids;
mod membership;
mod roster;
mod schedule;
mod training;
mod variant;

pub use activity::ActivityRecord;
pub use article::{Article, ArticleAssociation, ArticleCache, MAINSPACE_NAMESPACE};
pub use course::{Cohort, Course, CourseCache, CourseUpdate, NewCourse};
pub use ids::{ArticleId, BlockId, CohortId, CourseId, ModuleId, ParticipantId};
pub use membership::{Membership, Participant, Role, canonicalize_username};
pub use roster::{
    RoleChange, RosterAddition, RosterChangeSet, RosterDiff, RosterEntry, RosterRemoval,
    RosterSnapshot,
};
pub use schedule::{RelativeTo, SurveyQuery};
pub use training::{TimelineBlock, TrainingCompletion, TrainingModule};
pub use variant::{CourseVariant, VariantTraits, validate_variant};
