//! Course cache recomputation.
//!
//! Caches are never patched incrementally. Each recompute reads current
//! memberships, associations and the activity ledger, computes every counter
//! in memory and then overwrites the course cache and all association caches
//! in a single write.
//!
//! The computation runs in three stages, each depending only on earlier ones:
//!
//! 1. **Associations**: every article a current student edited inside the
//!    window is associated with the course (stored associations are kept),
//!    then per-article sums over in-window student edits.
//! 2. **Memberships**: the counted student set (students who are not also
//!    instructors).
//! 3. **Course**: totals over qualifying associations, plus the trained count
//!    for the counted students.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::instrument;

use crate::config::TrainingConfig;
use crate::models::{
    ArticleAssociation, ArticleCache, ArticleId, Course, CourseCache, CourseId, Membership,
    ParticipantId, Role,
};
use crate::services::clock::{Clock, SystemClock};
use crate::services::locks::CourseLocks;
use crate::services::training::{TrainingDueEvaluator, TrainingMode};
use crate::storage::{ActivityLedger, CacheWrite, CourseBackend, LedgerRevision};
use crate::{Error, Result};

/// Result of recomputing one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeReport {
    /// The course.
    pub course_id: CourseId,
    /// Its slug.
    pub slug: String,
    /// The cache that was written.
    pub cache: CourseCache,
    /// Number of association caches refreshed.
    pub associations: usize,
    /// Associations derived from the ledger that did not exist before.
    pub associations_created: usize,
    /// Ledger entries whose author is not a known participant.
    pub anomalies: u64,
    /// Training rule applied.
    pub training_mode: TrainingMode,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl RecomputeReport {
    /// Returns a one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let c = &self.cache;
        format!(
            "{}: {} students ({} trained), {} articles ({} new), {} revisions, {} chars, {} views; {} anomalies",
            self.slug,
            c.user_count,
            c.trained_count,
            c.article_count,
            c.new_article_count,
            c.revision_count,
            c.character_sum,
            c.view_sum,
            self.anomalies
        )
    }
}

/// Result of recomputing every course.
#[derive(Debug, Default)]
pub struct RecomputeAllReport {
    /// Courses recomputed successfully.
    pub recomputed: Vec<RecomputeReport>,
    /// Courses that failed, with the error. Their caches are unchanged.
    pub failures: Vec<(String, Error)>,
}

impl RecomputeAllReport {
    /// Returns `true` if every course was recomputed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns a one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "recomputed {} courses, {} failed",
            self.recomputed.len(),
            self.failures.len()
        )
    }
}

/// Stage 1 output.
struct ArticleStage {
    caches: Vec<(ArticleId, ArticleCache)>,
    anomalies: u64,
}

/// Recomputes course caches from the ledger.
pub struct CacheAggregator {
    backend: Arc<dyn CourseBackend>,
    ledger: Arc<dyn ActivityLedger>,
    evaluator: TrainingDueEvaluator,
    locks: Arc<CourseLocks>,
    clock: Arc<dyn Clock>,
}

impl CacheAggregator {
    /// Creates an aggregator using the system clock and private locks.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CourseBackend>,
        ledger: Arc<dyn ActivityLedger>,
        training: TrainingConfig,
    ) -> Self {
        Self {
            backend,
            ledger,
            evaluator: TrainingDueEvaluator::new(training),
            locks: Arc::new(CourseLocks::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Shares a lock registry with other services.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<CourseLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Recomputes a course as of today.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the course does not exist, or a storage
    /// error. Nothing is written on error.
    pub fn recompute(&self, course_id: &CourseId) -> Result<RecomputeReport> {
        self.recompute_on(course_id, self.clock.today())
    }

    /// Recomputes a course with `today` as the training reference date.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the course does not exist, or a storage
    /// error. Nothing is written on error.
    #[instrument(
        name = "cohortcache.aggregator.recompute",
        skip_all,
        fields(course_id = %course_id, %today)
    )]
    pub fn recompute_on(&self, course_id: &CourseId, today: NaiveDate) -> Result<RecomputeReport> {
        let start = Instant::now();
        let result = self
            .locks
            .with_lock(course_id, || self.recompute_locked(course_id, today, start));

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("cohortcache_recompute_total", "status" => status).increment(1);
        metrics::histogram!("cohortcache_recompute_duration_ms", "status" => status)
            .record(start.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(report) => tracing::info!(
                slug = %report.slug,
                users = report.cache.user_count,
                articles = report.cache.article_count,
                anomalies = report.anomalies,
                "Recomputed course cache"
            ),
            Err(e) => tracing::warn!(error = %e, "Recompute failed"),
        }
        result
    }

    /// Recomputes every course. A failing course does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns an error only if the course list cannot be read.
    #[instrument(name = "cohortcache.aggregator.recompute_all", skip(self))]
    pub fn recompute_all(&self) -> Result<RecomputeAllReport> {
        let today = self.clock.today();
        let mut report = RecomputeAllReport::default();
        for course in self.backend.list_courses()? {
            match self.recompute_on(&course.id, today) {
                Ok(done) => report.recomputed.push(done),
                Err(e) => report.failures.push((course.slug, e)),
            }
        }
        Ok(report)
    }

    fn recompute_locked(
        &self,
        course_id: &CourseId,
        today: NaiveDate,
        start: Instant,
    ) -> Result<RecomputeReport> {
        let course = self
            .backend
            .get_course(course_id)?
            .ok_or_else(|| Error::course_not_found(course_id))?;

        let memberships = self.backend.list_memberships(course_id)?;
        let mut associations = self.backend.list_associations(course_id)?;
        let students = student_set(&memberships);

        // Stage 1
        let discovered =
            self.discover_associations(&course, &memberships, &students, &associations)?;
        let new_associations: Vec<ArticleId> =
            discovered.iter().map(|a| a.article.id.clone()).collect();
        associations.extend(discovered);

        let articles = if course.tracks_edits() {
            let ids: Vec<ArticleId> = associations.iter().map(|a| a.article.id.clone()).collect();
            let revisions = self.ledger.revisions_for_articles(&ids)?;
            article_stage(&course, &associations, &revisions, &students)
        } else {
            ArticleStage {
                caches: associations
                    .iter()
                    .map(|a| (a.article.id.clone(), ArticleCache::default()))
                    .collect(),
                anomalies: 0,
            }
        };

        // Stage 2
        let counted = counted_students(&memberships);

        // Stage 3
        let mut cache = course_totals(&associations, &articles.caches);
        cache.user_count = len_u64(counted.len());

        let counted_ids: Vec<ParticipantId> = counted.into_iter().collect();
        let participants = self.backend.get_participants(&counted_ids)?;
        let blocks = self.backend.list_timeline_blocks(course_id)?;
        let completions = self.ledger.training_completions(&counted_ids)?;
        let outcome =
            self.evaluator
                .evaluate(&course, &blocks, &participants, &completions, today);
        cache.trained_count = outcome.trained_count().min(cache.user_count);

        if articles.anomalies > 0 {
            metrics::counter!("cohortcache_recompute_anomalies_total")
                .increment(articles.anomalies);
            tracing::warn!(
                anomalies = articles.anomalies,
                "Ledger entries by unknown participants"
            );
        }

        let write = CacheWrite {
            cache,
            new_associations,
            articles: articles.caches,
            anomalies: articles.anomalies,
            computed_at: self.clock.now(),
        };
        self.backend.write_cache(course_id, &write)?;

        Ok(RecomputeReport {
            course_id: course.id,
            slug: course.slug,
            cache,
            associations: write.articles.len(),
            associations_created: write.new_associations.len(),
            anomalies: write.anomalies,
            training_mode: outcome.mode,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Articles edited inside the window by current students that have no
    /// association yet.
    fn discover_associations(
        &self,
        course: &Course,
        memberships: &[Membership],
        students: &BTreeSet<ParticipantId>,
        known: &[ArticleAssociation],
    ) -> Result<Vec<ArticleAssociation>> {
        let usernames: Vec<String> = memberships
            .iter()
            .filter(|m| m.role == Role::Student)
            .map(|m| m.username.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        let known: BTreeSet<&ArticleId> = known.iter().map(|a| &a.article.id).collect();
        let candidates: BTreeSet<ArticleId> = self
            .ledger
            .revisions_by_authors(&usernames)?
            .into_iter()
            .filter(|r| {
                r.participant_id
                    .as_ref()
                    .is_some_and(|author| students.contains(author))
                    && course.window_contains_timestamp(r.record.timestamp)
            })
            .map(|r| r.record.article)
            .filter(|id| !known.contains(id))
            .collect();

        let mut discovered = Vec::with_capacity(candidates.len());
        for id in candidates {
            match self.backend.get_article(&id)? {
                Some(article) => discovered.push(ArticleAssociation {
                    course_id: course.id.clone(),
                    article,
                    cache: ArticleCache::default(),
                }),
                None => tracing::debug!(article = %id, "Ledger edit to unregistered article"),
            }
        }
        Ok(discovered)
    }
}

fn len_u64(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

/// Every participant holding the student role.
fn student_set(memberships: &[Membership]) -> BTreeSet<ParticipantId> {
    memberships
        .iter()
        .filter(|m| m.role == Role::Student)
        .map(|m| m.participant_id.clone())
        .collect()
}

/// Students who do not also hold the instructor role.
fn counted_students(memberships: &[Membership]) -> BTreeSet<ParticipantId> {
    let instructors: BTreeSet<&ParticipantId> = memberships
        .iter()
        .filter(|m| m.role == Role::Instructor)
        .map(|m| &m.participant_id)
        .collect();
    memberships
        .iter()
        .filter(|m| m.role == Role::Student && !instructors.contains(&m.participant_id))
        .map(|m| m.participant_id.clone())
        .collect()
}

fn article_stage(
    course: &Course,
    associations: &[ArticleAssociation],
    revisions: &[LedgerRevision],
    students: &BTreeSet<ParticipantId>,
) -> ArticleStage {
    let mut by_article: BTreeMap<&ArticleId, Vec<&LedgerRevision>> = BTreeMap::new();
    for revision in revisions {
        by_article
            .entry(&revision.record.article)
            .or_default()
            .push(revision);
    }

    let mut anomalies = 0_u64;
    let caches = associations
        .iter()
        .map(|association| {
            let id = &association.article.id;
            let mut cache = ArticleCache::default();
            let history = by_article.get(id).map_or(&[][..], Vec::as_slice);

            for revision in history {
                let Some(author) = &revision.participant_id else {
                    anomalies += 1;
                    continue;
                };
                if !students.contains(author)
                    || !course.window_contains_timestamp(revision.record.timestamp)
                {
                    continue;
                }
                cache.revision_count += 1;
                cache.character_sum = cache
                    .character_sum
                    .saturating_add(revision.record.characters_added());
                if revision.record.is_new_article {
                    cache.new_article = true;
                }
            }
            // history is oldest first
            cache.view_sum = history.last().map_or(0, |r| r.record.views);

            (id.clone(), cache)
        })
        .collect();

    ArticleStage { caches, anomalies }
}

fn course_totals(
    associations: &[ArticleAssociation],
    caches: &[(ArticleId, ArticleCache)],
) -> CourseCache {
    let mut totals = CourseCache::default();
    for (association, (_, cache)) in associations.iter().zip(caches) {
        if !association.article.counts_as_article() || cache.revision_count == 0 {
            continue;
        }
        totals.article_count += 1;
        if cache.new_article {
            totals.new_article_count += 1;
        }
        totals.revision_count += cache.revision_count;
        totals.character_sum = totals.character_sum.saturating_add(cache.character_sum);
        totals.view_sum = totals.view_sum.saturating_add(cache.view_sum);
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActivityRecord, Article, CourseVariant, ModuleId, RosterAddition, RosterChangeSet,
        RosterDiff, TimelineBlock, TrainingCompletion,
    };
    use crate::services::clock::FixedClock;
    use crate::storage::SqliteCourseBackend;
    use chrono::{DateTime, TimeZone, Utc};

    struct Fixture {
        backend: Arc<SqliteCourseBackend>,
        aggregator: CacheAggregator,
        course: Course,
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single().expect("valid")
    }

    fn fixture(variant: CourseVariant) -> Fixture {
        let backend = Arc::new(SqliteCourseBackend::in_memory().expect("backend"));
        let course = Course {
            id: CourseId::new("c1"),
            slug: "bio-101".to_string(),
            title: "Biology".to_string(),
            start: date(2024, 1, 1),
            end: date(2024, 3, 31),
            timeline_start: date(2024, 1, 1),
            timeline_end: date(2024, 3, 31),
            variant,
            passcode: Some("pass".to_string()),
            cache: CourseCache::default(),
            recompute_anomalies: 0,
            cache_updated_at: None,
        };
        backend.insert_course(&course).expect("insert course");
        let aggregator = CacheAggregator::new(
            backend.clone(),
            backend.clone(),
            TrainingConfig::default(),
        )
        .with_clock(Arc::new(FixedClock::at_date(date(2024, 2, 1))));
        Fixture {
            backend,
            aggregator,
            course,
        }
    }

    impl Fixture {
        fn enroll(&self, people: &[(&str, Role)]) {
            let additions = people
                .iter()
                .map(|(name, role)| RosterAddition {
                    username: (*name).to_string(),
                    display_name: String::new(),
                    role: *role,
                })
                .collect();
            let changes = RosterChangeSet {
                diff: RosterDiff {
                    additions,
                    ..RosterDiff::default()
                },
                cascaded_articles: vec![],
            };
            self.backend
                .apply_roster(&self.course.id, &changes)
                .expect("enroll");
        }

        fn article(&self, id: &str, namespace: i32) {
            self.backend
                .upsert_article(&Article {
                    id: ArticleId::new(id),
                    title: format!("Title {id}"),
                    namespace,
                    deleted: false,
                })
                .expect("article");
            self.backend
                .ensure_association(&self.course.id, &ArticleId::new(id))
                .expect("associate");
        }

        fn edit(&self, who: &str, article: &str, when: DateTime<Utc>, delta: i64, views: u64, new: bool) {
            self.backend
                .append_activity(&ActivityRecord {
                    participant: who.to_string(),
                    article: ArticleId::new(article),
                    timestamp: when,
                    byte_delta: delta,
                    views,
                    is_new_article: new,
                    article_title: None,
                    article_namespace: None,
                })
                .expect("edit");
        }

        fn participant(&self, name: &str) -> ParticipantId {
            self.backend
                .get_participant_by_username(name)
                .expect("lookup")
                .expect("participant exists")
                .id
        }
    }

    #[test]
    fn test_empty_course_is_all_zero() {
        let f = fixture(CourseVariant::ClassroomProgram);
        let report = f.aggregator.recompute(&f.course.id).expect("recompute");
        assert!(report.cache.is_empty());
        assert_eq!(report.associations, 0);
        let stored = f
            .backend
            .get_course(&f.course.id)
            .expect("get")
            .expect("exists");
        assert!(stored.cache_updated_at.is_some());
    }

    #[test]
    fn test_missing_course_is_not_found() {
        let f = fixture(CourseVariant::ClassroomProgram);
        let err = f
            .aggregator
            .recompute(&CourseId::new("nope"))
            .expect_err("missing course");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_counts_in_window_student_edits() {
        let f = fixture(CourseVariant::ClassroomProgram);
        f.enroll(&[("Alice", Role::Student), ("Bob", Role::Student), ("Prof", Role::Instructor)]);
        f.article("a1", 0);
        f.article("a2", 0);
        f.article("talk", 1);

        f.edit("Alice", "a1", at(2024, 1, 10), 500, 10, true);
        f.edit("Alice", "a1", at(2024, 1, 11), -200, 15, false);
        f.edit("Bob", "a1", at(2024, 4, 2), 900, 40, false); // after the window
        f.edit("Prof", "a2", at(2024, 1, 12), 300, 5, false); // not a student
        f.edit("Bob", "talk", at(2024, 1, 12), 50, 3, false); // not mainspace
        f.edit("Stranger", "a1", at(2024, 1, 13), 10, 50, false);

        let report = f.aggregator.recompute(&f.course.id).expect("recompute");
        let cache = report.cache;
        assert_eq!(cache.user_count, 2);
        assert_eq!(cache.article_count, 1);
        assert_eq!(cache.new_article_count, 1);
        assert_eq!(cache.revision_count, 2);
        assert_eq!(cache.character_sum, 500);
        // latest cumulative views of a1 come from the newest record
        assert_eq!(cache.view_sum, 40);
        assert_eq!(report.anomalies, 1);

        let associations = f.backend.list_associations(&f.course.id).expect("list");
        let talk = associations
            .iter()
            .find(|a| a.article.id.as_str() == "talk")
            .expect("talk association");
        assert_eq!(talk.cache.revision_count, 1);
    }

    #[test]
    fn test_unassociated_student_edits_are_associated() {
        let f = fixture(CourseVariant::ClassroomProgram);
        f.enroll(&[("Alice", Role::Student), ("Prof", Role::Instructor)]);
        for id in ["a1", "a2", "a3"] {
            f.backend
                .upsert_article(&Article {
                    id: ArticleId::new(id),
                    title: format!("Title {id}"),
                    namespace: 0,
                    deleted: false,
                })
                .expect("article");
        }
        f.edit("Alice", "a1", at(2024, 1, 10), 100, 4, false);
        f.edit("Alice", "a2", at(2024, 5, 10), 100, 4, false); // after the window
        f.edit("Prof", "a3", at(2024, 1, 10), 100, 4, false); // not a student

        let report = f.aggregator.recompute(&f.course.id).expect("recompute");
        assert_eq!(report.associations_created, 1);
        assert_eq!(report.cache.article_count, 1);
        assert_eq!(report.cache.character_sum, 100);

        let associated: Vec<String> = f
            .backend
            .list_associations(&f.course.id)
            .expect("list")
            .into_iter()
            .map(|a| a.article.id.as_str().to_string())
            .collect();
        assert_eq!(associated, vec!["a1".to_string()]);

        let again = f.aggregator.recompute(&f.course.id).expect("again");
        assert_eq!(again.associations_created, 0);
        assert_eq!(again.cache, report.cache);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let f = fixture(CourseVariant::ClassroomProgram);
        f.enroll(&[("Alice", Role::Student)]);
        f.article("a1", 0);
        f.edit("Alice", "a1", at(2024, 1, 10), 500, 10, false);

        let first = f.aggregator.recompute(&f.course.id).expect("first");
        let second = f.aggregator.recompute(&f.course.id).expect("second");
        assert_eq!(first.cache, second.cache);
    }

    #[test]
    fn test_student_instructor_counted_once_and_not_as_user() {
        let f = fixture(CourseVariant::ClassroomProgram);
        f.enroll(&[("Dana", Role::Student), ("Dana", Role::Instructor), ("Eve", Role::Student)]);
        let report = f.aggregator.recompute(&f.course.id).expect("recompute");
        assert_eq!(report.cache.user_count, 1);
        assert!(report.cache.trained_count <= report.cache.user_count);
    }

    #[test]
    fn test_edits_disabled_variant_zeroes_edit_stages() {
        let f = fixture(CourseVariant::FellowsCohort);
        f.enroll(&[("Alice", Role::Student)]);
        f.article("a1", 0);
        f.edit("Alice", "a1", at(2024, 1, 10), 500, 10, true);

        let report = f.aggregator.recompute(&f.course.id).expect("recompute");
        assert_eq!(report.cache.user_count, 1);
        assert_eq!(report.cache.article_count, 0);
        assert_eq!(report.cache.revision_count, 0);
        assert_eq!(report.cache.character_sum, 0);
        assert_eq!(report.cache.view_sum, 0);
    }

    #[test]
    fn test_trained_count_follows_completions() {
        let f = fixture(CourseVariant::ClassroomProgram);
        f.enroll(&[("Alice", Role::Student), ("Bob", Role::Student)]);
        f.backend
            .insert_timeline_block(&TimelineBlock {
                id: crate::models::BlockId::generate(),
                course_id: f.course.id.clone(),
                week_index: 0,
                due_date: Some(date(2024, 1, 15)),
                training_modules: vec![ModuleId::new("m1"), ModuleId::new("m2")],
            })
            .expect("block");
        let alice = f.participant("Alice");
        let complete = |module: &str| TrainingCompletion {
            participant_id: alice.clone(),
            module_id: ModuleId::new(module),
            completed_at: Some(at(2024, 1, 14)),
        };

        f.backend.record_training_completion(&complete("m1")).expect("m1");
        let before = f.aggregator.recompute(&f.course.id).expect("recompute");
        assert_eq!(before.cache.trained_count, 0);

        f.backend.record_training_completion(&complete("m2")).expect("m2");
        let after = f.aggregator.recompute(&f.course.id).expect("recompute");
        assert_eq!(after.cache.trained_count, 1);
        assert_eq!(after.training_mode, TrainingMode::DueModules);
    }

    #[test]
    fn test_recompute_all_collects_every_course() {
        let f = fixture(CourseVariant::ClassroomProgram);
        let mut second = f.course.clone();
        second.id = CourseId::new("c2");
        second.slug = "chem-201".to_string();
        f.backend.insert_course(&second).expect("insert");

        let report = f.aggregator.recompute_all().expect("recompute all");
        assert!(report.is_success());
        assert_eq!(report.recomputed.len(), 2);
        assert!(report.summary().contains("recomputed 2 courses"));
    }
}
