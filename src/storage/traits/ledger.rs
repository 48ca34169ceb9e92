//! Activity ledger trait.

use crate::Result;
use crate::models::{ActivityRecord, ArticleId, ParticipantId, TrainingCompletion};

/// A ledger entry with the author resolved against known participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRevision {
    /// The raw record.
    pub record: ActivityRecord,
    /// The author, if the username belongs to a known participant.
    pub participant_id: Option<ParticipantId>,
}

/// Read-only view over raw activity.
///
/// The ledger is fed by ingestion; the aggregation core only ever queries it.
pub trait ActivityLedger: Send + Sync {
    /// Returns every recorded edit to the given articles, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn revisions_for_articles(&self, articles: &[ArticleId]) -> Result<Vec<LedgerRevision>>;

    /// Returns every recorded edit by the given (canonical) usernames,
    /// oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn revisions_by_authors(&self, usernames: &[String]) -> Result<Vec<LedgerRevision>>;

    /// Returns training progress for the given participants.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn training_completions(
        &self,
        participants: &[ParticipantId],
    ) -> Result<Vec<TrainingCompletion>>;
}
