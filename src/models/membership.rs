//! Participants, roles and course memberships.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{CourseId, ParticipantId};

/// Role a participant holds in a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Enrolled student; the only role whose activity is aggregated.
    Student,
    /// Instructor. Overrides a student role held in the same course.
    Instructor,
    /// On-campus volunteer.
    CampusVolunteer,
    /// Online volunteer.
    OnlineVolunteer,
    /// Program staff.
    Staff,
}

impl Role {
    /// Returns the role as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Instructor => "instructor",
            Self::CampusVolunteer => "campus_volunteer",
            Self::OnlineVolunteer => "online_volunteer",
            Self::Staff => "staff",
        }
    }

    /// Parses a role name. Case-insensitive; `-` and `_` are interchangeable.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "student" | "students" => Some(Self::Student),
            "instructor" | "instructors" => Some(Self::Instructor),
            "campus_volunteer" | "campus_volunteers" => Some(Self::CampusVolunteer),
            "online_volunteer" | "online_volunteers" => Some(Self::OnlineVolunteer),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonicalizes a wiki username.
///
/// Surrounding whitespace is dropped, underscores become spaces and the first
/// character is uppercased. Comparison after canonicalization is
/// case-sensitive, as on the wiki itself.
///
/// # Examples
///
/// ```rust
/// use cohortcache::models::canonicalize_username;
///
/// assert_eq!(canonicalize_username(" jane_doe "), "Jane doe");
/// assert_eq!(canonicalize_username("Jane doe"), "Jane doe");
/// ```
#[must_use]
pub fn canonicalize_username(raw: &str) -> String {
    let spaced = raw.trim().replace('_', " ");
    let mut chars = spaced.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// A person who can be enrolled in courses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Internal identifier.
    pub id: ParticipantId,
    /// Canonical wiki username; the external identifier used by rosters.
    pub username: String,
    /// Display name from the roster.
    pub display_name: String,
    /// Legacy completion flag, used only for courses that predate modules.
    pub trained: bool,
}

/// Association between a course and a participant in one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// The course.
    pub course_id: CourseId,
    /// The participant.
    pub participant_id: ParticipantId,
    /// Canonical username of the participant, denormalized for diffing.
    pub username: String,
    /// Role held.
    pub role: Role,
    /// Title of the article the participant was assigned, if cached.
    pub assigned_article_title: Option<String>,
}
