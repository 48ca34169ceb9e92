//! Training evaluation settings.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Courses starting before this date with no timeline use the legacy flag.
fn default_legacy_cutover() -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Settings for [`crate::TrainingDueEvaluator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Start date before which timeline-less courses fall back to the
    /// per-participant `trained` flag.
    pub legacy_cutover: NaiveDate,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            legacy_cutover: default_legacy_cutover(),
        }
    }
}

impl TrainingConfig {
    /// Creates a config with the default cutover (2016-01-01).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the legacy cutover.
    #[must_use]
    pub const fn with_legacy_cutover(mut self, cutover: NaiveDate) -> Self {
        self.legacy_cutover = cutover;
        self
    }

    /// Parses a `YYYY-MM-DD` cutover date.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the date is malformed.
    pub fn parse_cutover(raw: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
            Error::InvalidInput(format!("legacy cutover '{raw}' is not YYYY-MM-DD: {e}"))
        })
    }
}
