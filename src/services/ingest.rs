//! Activity ingestion.
//!
//! Appends edits to the ledger and creates the course-article associations
//! that later recomputes aggregate over. Edits by people who are not enrolled
//! anywhere yet are still kept, so a later enrollment can pick them up at the
//! next recompute. Bad records are skipped and counted; they never abort a
//! batch.

use std::sync::Arc;

use tracing::instrument;

use crate::models::{
    ActivityRecord, Article, MAINSPACE_NAMESPACE, Participant, canonicalize_username,
};
use crate::services::locks::CourseLocks;
use crate::storage::CourseBackend;
use crate::{Error, Result};

/// Outcome of one ingest batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Records appended to the ledger.
    pub accepted: u64,
    /// Malformed records, records for an unregistrable article (both
    /// skipped) and records by unknown participants (kept).
    pub anomalies: u64,
    /// New course-article associations.
    pub associations_created: u64,
}

impl IngestReport {
    /// Returns a one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "accepted {} records, skipped {} anomalies, created {} associations",
            self.accepted, self.anomalies, self.associations_created
        )
    }
}

/// A JSON batch split into usable records and a count of malformed ones.
#[derive(Debug, Clone, Default)]
pub struct ParsedRecords {
    /// Records that deserialized cleanly, in input order.
    pub records: Vec<ActivityRecord>,
    /// Array elements that did not.
    pub malformed: u64,
}

/// Feeds activity records into storage.
pub struct ActivityIngestor {
    backend: Arc<dyn CourseBackend>,
    locks: Arc<CourseLocks>,
}

impl ActivityIngestor {
    /// Creates an ingestor with private locks.
    #[must_use]
    pub fn new(backend: Arc<dyn CourseBackend>) -> Self {
        Self {
            backend,
            locks: Arc::new(CourseLocks::new()),
        }
    }

    /// Shares a lock registry with other services.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<CourseLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Parses a JSON array of records. Elements that are not valid records
    /// are counted and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the text is not a JSON array.
    pub fn parse_records(json: &str) -> Result<ParsedRecords> {
        let values: Vec<serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("activity records: {e}")))?;

        let mut parsed = ParsedRecords::default();
        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<ActivityRecord>(value) {
                Ok(record) => parsed.records.push(record),
                Err(e) => {
                    tracing::debug!(index, error = %e, "skipping malformed activity record");
                    parsed.malformed += 1;
                },
            }
        }
        Ok(parsed)
    }

    /// Parses and ingests a JSON array; malformed elements count as anomalies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the text is not a JSON array, or a
    /// storage error.
    pub fn ingest_json(&self, json: &str) -> Result<IngestReport> {
        let parsed = Self::parse_records(json)?;
        self.ingest_batch(
            &parsed.records,
            IngestReport {
                anomalies: parsed.malformed,
                ..IngestReport::default()
            },
        )
    }

    /// Ingests a batch of records in order.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed. Records processed
    /// before the failure stay ingested.
    pub fn ingest(&self, records: &[ActivityRecord]) -> Result<IngestReport> {
        self.ingest_batch(records, IngestReport::default())
    }

    #[instrument(name = "cohortcache.ingest.batch", skip_all, fields(records = records.len()))]
    fn ingest_batch(
        &self,
        records: &[ActivityRecord],
        mut report: IngestReport,
    ) -> Result<IngestReport> {
        for record in records {
            self.ingest_one(record, &mut report)?;
        }

        if report.anomalies > 0 {
            metrics::counter!("cohortcache_ingest_anomalies_total").increment(report.anomalies);
        }
        metrics::counter!("cohortcache_ingest_records_total").increment(report.accepted);
        tracing::info!(
            accepted = report.accepted,
            anomalies = report.anomalies,
            associations_created = report.associations_created,
            "ingest complete"
        );
        Ok(report)
    }

    fn ingest_one(&self, record: &ActivityRecord, report: &mut IngestReport) -> Result<()> {
        if !self.ensure_article(record)? {
            tracing::debug!(article = %record.article, "skipping record for unknown article");
            report.anomalies += 1;
            return Ok(());
        }

        let username = canonicalize_username(&record.participant);
        let participant = self.backend.get_participant_by_username(&username)?;
        let stored = ActivityRecord {
            participant: username,
            ..record.clone()
        };
        self.backend.append_activity(&stored)?;
        report.accepted += 1;

        match participant {
            Some(participant) => {
                report.associations_created += self.associate(&participant, record)?;
            },
            None => {
                tracing::debug!(participant = %stored.participant, "record by unknown participant");
                report.anomalies += 1;
            },
        }
        Ok(())
    }

    /// Returns `false` if the article is unknown and cannot be registered.
    fn ensure_article(&self, record: &ActivityRecord) -> Result<bool> {
        if self.backend.get_article(&record.article)?.is_some() {
            return Ok(true);
        }
        let Some(title) = record.article_title.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Ok(false);
        };
        self.backend.upsert_article(&Article {
            id: record.article.clone(),
            title: title.to_string(),
            namespace: record.article_namespace.unwrap_or(MAINSPACE_NAMESPACE),
            deleted: false,
        })?;
        Ok(true)
    }

    fn associate(&self, participant: &Participant, record: &ActivityRecord) -> Result<u64> {
        let mut created = 0;
        for course in self.backend.courses_for_student(&participant.id)? {
            if !course.window_contains_timestamp(record.timestamp) {
                continue;
            }
            let added = self.locks.with_lock(&course.id, || {
                self.backend.ensure_association(&course.id, &record.article)
            })?;
            if added {
                created += 1;
            }
        }
        Ok(created)
    }
}
