//! Survey scheduling query parameters.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Course;

/// Which course date a survey offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelativeTo {
    /// The course start date.
    Start,
    /// The course end date.
    #[default]
    End,
}

impl RelativeTo {
    /// Returns the name as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }

    /// Parses `start` or `end`, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            _ => None,
        }
    }
}

impl fmt::Display for RelativeTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelativeTo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("expected 'start' or 'end', got '{s}'"))
    }
}

/// A survey offset: `days` before or after a course's start or end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyQuery {
    /// Offset in days.
    pub days: u32,
    /// `true` for an offset before the anchor date, `false` for after.
    pub before: bool,
    /// Anchor date.
    pub relative_to: RelativeTo,
}

impl SurveyQuery {
    /// Creates a query.
    #[must_use]
    pub const fn new(days: u32, before: bool, relative_to: RelativeTo) -> Self {
        Self {
            days,
            before,
            relative_to,
        }
    }

    /// Returns the day the offset lands on for `course`.
    ///
    /// `None` only if the arithmetic leaves chrono's representable range.
    #[must_use]
    pub fn target_date(&self, course: &Course) -> Option<NaiveDate> {
        let anchor = match self.relative_to {
            RelativeTo::Start => course.start,
            RelativeTo::End => course.end,
        };
        let offset = Days::new(u64::from(self.days));
        if self.before {
            anchor.checked_sub_days(offset)
        } else {
            anchor.checked_add_days(offset)
        }
    }
}
