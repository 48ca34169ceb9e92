//! String-backed identifiers.
//!
//! Every entity is keyed by an opaque string. Newtypes keep a course id from
//! being passed where an article id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from the given string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier for a course.
    CourseId
);
string_id!(
    /// Unique identifier for a participant (internal, not the wiki username).
    ParticipantId
);
string_id!(
    /// Identifier of a content unit, as supplied by the content source.
    ArticleId
);
string_id!(
    /// Identifier of a training module.
    ModuleId
);
string_id!(
    /// Identifier of a timeline block.
    BlockId
);
string_id!(
    /// Identifier of a cohort (a grouping of courses).
    CohortId
);

/// Generates a short random identifier: the first 12 hex digits of a v4 UUID.
pub(crate) fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

impl CourseId {
    /// Generates a new random course id.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_id())
    }
}

impl ParticipantId {
    /// Generates a new random participant id.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_id())
    }
}

impl BlockId {
    /// Generates a new random block id.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_id())
    }
}

impl CohortId {
    /// Generates a new random cohort id.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = CourseId::generate();
        let b = CourseId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 12);
    }

    #[test]
    fn test_id_display_and_from() {
        let id = ArticleId::from("Q42");
        assert_eq!(id.to_string(), "Q42");
        assert_eq!(id, ArticleId::new(String::from("Q42")));
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = ModuleId::new("wikipedia-essentials");
        let json = serde_json::to_string(&id).expect("serialize id");
        assert_eq!(json, "\"wikipedia-essentials\"");
    }
}
