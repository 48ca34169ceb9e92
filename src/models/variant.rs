//! Course variants.
//!
//! The set of course kinds is closed. Each kind maps to one row of behavioral
//! constants; adding a kind means adding an enum arm and a row in
//! [`CourseVariant::traits`], never a new type.
//!
//! | Variant | Tag | Prefix | Wiki edits | Passcode |
//! |---------|-----|--------|------------|----------|
//! | `ClassroomProgram` | `classroom_program` | `courses` | yes | required |
//! | `Basic` | `basic` | `courses_generic` | yes | optional |
//! | `VisitingScholarship` | `visiting_scholarship` | `courses_generic` | yes | optional |
//! | `Editathon` | `editathon` | `courses_generic` | yes | optional |
//! | `FellowsCohort` | `fellows_cohort` | `courses_generic` | no | optional |
//! | `Legacy` | `legacy` | `courses` | yes | required |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Behavioral constants attached to a course variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantTraits {
    /// Prefix used for generated message keys and identifiers.
    pub string_prefix: &'static str,
    /// Whether edit aggregation is meaningful for this kind of course.
    pub wiki_edits_enabled: bool,
    /// Whether enrollment requires a non-empty passcode.
    pub passcode_required: bool,
}

/// Closed set of course kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CourseVariant {
    /// The default classroom program course.
    #[default]
    ClassroomProgram,
    /// A generic course with no program-specific requirements.
    Basic,
    /// A visiting scholar attached to an institution.
    VisitingScholarship,
    /// A single-event edit-a-thon.
    Editathon,
    /// A fellows cohort, which does not track wiki edits.
    FellowsCohort,
    /// A course created before variants existed.
    Legacy,
}

impl CourseVariant {
    /// Returns every variant, in table order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::ClassroomProgram,
            Self::Basic,
            Self::VisitingScholarship,
            Self::Editathon,
            Self::FellowsCohort,
            Self::Legacy,
        ]
    }

    /// Returns the canonical tag for this variant.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ClassroomProgram => "classroom_program",
            Self::Basic => "basic",
            Self::VisitingScholarship => "visiting_scholarship",
            Self::Editathon => "editathon",
            Self::FellowsCohort => "fellows_cohort",
            Self::Legacy => "legacy",
        }
    }

    /// Returns the behavioral constants for this variant.
    #[must_use]
    pub const fn traits(&self) -> VariantTraits {
        match self {
            Self::ClassroomProgram | Self::Legacy => VariantTraits {
                string_prefix: "courses",
                wiki_edits_enabled: true,
                passcode_required: true,
            },
            Self::Basic | Self::VisitingScholarship | Self::Editathon => VariantTraits {
                string_prefix: "courses_generic",
                wiki_edits_enabled: true,
                passcode_required: false,
            },
            Self::FellowsCohort => VariantTraits {
                string_prefix: "courses_generic",
                wiki_edits_enabled: false,
                passcode_required: false,
            },
        }
    }

    /// Parses a variant tag leniently, for reading stored data.
    ///
    /// Accepts the canonical tag and the historical class name, both
    /// case-insensitively. Anything else is `None`. New tags coming from
    /// users go through [`validate_variant`], which takes canonical tags only.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cohortcache::models::CourseVariant;
    ///
    /// assert_eq!(CourseVariant::parse("editathon"), Some(CourseVariant::Editathon));
    /// assert_eq!(CourseVariant::parse("BasicCourse"), Some(CourseVariant::Basic));
    /// assert_eq!(CourseVariant::parse("seminar"), None);
    /// ```
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "classroom_program" | "classroomprogramcourse" => Some(Self::ClassroomProgram),
            "basic" | "basiccourse" => Some(Self::Basic),
            "visiting_scholarship" | "visitingscholarship" => Some(Self::VisitingScholarship),
            "editathon" => Some(Self::Editathon),
            "fellows_cohort" | "fellowscohort" => Some(Self::FellowsCohort),
            "legacy" | "legacycourse" => Some(Self::Legacy),
            _ => None,
        }
    }

    /// Builds a message key under this variant's prefix, e.g. `courses_generic.students`.
    #[must_use]
    pub fn message_key(&self, key: &str) -> String {
        format!("{}.{key}", self.traits().string_prefix)
    }
}

/// Validates a proposed variant tag.
///
/// Used by the create and update flows before anything is persisted. Only
/// the exact canonical tags are legal; historical aliases that
/// [`CourseVariant::parse`] still reads are rejected with a hint.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the tag is not a canonical variant tag.
pub fn validate_variant(tag: &str) -> Result<CourseVariant> {
    if let Some(variant) = CourseVariant::all().iter().find(|v| v.as_str() == tag) {
        return Ok(*variant);
    }
    if let Some(alias_of) = CourseVariant::parse(tag) {
        return Err(Error::Validation(format!(
            "'{tag}' is not a canonical course variant; use '{alias_of}'"
        )));
    }
    Err(Error::Validation(format!(
        "unknown course variant '{tag}' (expected one of: {})",
        CourseVariant::all()
            .iter()
            .map(CourseVariant::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

impl fmt::Display for CourseVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CourseVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        validate_variant(s)
    }
}

impl TryFrom<String> for CourseVariant {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        validate_variant(&s)
    }
}

impl From<CourseVariant> for String {
    fn from(v: CourseVariant) -> Self {
        v.as_str().to_string()
    }
}
