//! Raw activity records from the content source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ArticleId;

/// One edit, as reported by the content source.
///
/// `participant` is the external identifier (the wiki username); it is
/// canonicalized on ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// External identifier of the author.
    pub participant: String,
    /// Content unit edited.
    pub article: ArticleId,
    /// When the edit was made.
    pub timestamp: DateTime<Utc>,
    /// Size change in bytes; negative for removals.
    pub byte_delta: i64,
    /// Cumulative view count of the article as of this record.
    #[serde(default)]
    pub views: u64,
    /// Whether this edit created the article.
    #[serde(default)]
    pub is_new_article: bool,
    /// Article title, used to register articles not seen before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_title: Option<String>,
    /// Article namespace, defaulting to mainspace when registering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_namespace: Option<i32>,
}

impl ActivityRecord {
    /// Bytes this edit adds; removals count as zero.
    #[must_use]
    pub fn characters_added(&self) -> u64 {
        u64::try_from(self.byte_delta).unwrap_or(0)
    }
}
