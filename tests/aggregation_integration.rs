//! Integration tests for cache recomputation.
//!
//! Drives the public services end to end over an in-memory database:
//! roster import, activity ingest, training progress, then recompute.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use cohortcache::models::{
    ActivityRecord, ArticleId, ModuleId, NewCourse, Role, RosterEntry, RosterSnapshot,
    TrainingCompletion, TrainingModule,
};
use cohortcache::services::{CourseLocks, FixedClock, TrainingMode};
use cohortcache::{
    ActivityIngestor, CacheAggregator, Course, CourseBackend, CourseService, EnrollmentReconciler,
    SqliteCourseBackend, TrainingConfig,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 15, 0, 0).single().expect("valid")
}

struct Harness {
    backend: Arc<SqliteCourseBackend>,
    courses: CourseService,
    reconciler: EnrollmentReconciler,
    ingestor: ActivityIngestor,
    aggregator: CacheAggregator,
}

impl Harness {
    fn new(today: NaiveDate) -> Self {
        let backend = Arc::new(SqliteCourseBackend::in_memory().expect("backend"));
        let locks = Arc::new(CourseLocks::new());
        Self {
            courses: CourseService::new(backend.clone()),
            reconciler: EnrollmentReconciler::new(backend.clone(), backend.clone())
                .with_locks(locks.clone()),
            ingestor: ActivityIngestor::new(backend.clone()).with_locks(locks.clone()),
            aggregator: CacheAggregator::new(
                backend.clone(),
                backend.clone(),
                TrainingConfig::default(),
            )
            .with_locks(locks)
            .with_clock(Arc::new(FixedClock::at_date(today))),
            backend,
        }
    }

    fn course(&self, slug: &str, variant: &str) -> Course {
        self.courses
            .create_course(
                NewCourse::new(slug, "Course", date(2024, 1, 1), date(2024, 3, 31))
                    .with_variant(variant)
                    .with_passcode("letmein"),
            )
            .expect("create course")
    }

    fn enroll(&self, course: &Course, people: &[(&str, Role)]) {
        let snapshot = people.iter().fold(RosterSnapshot::new(), |snap, (name, role)| {
            snap.with_entry(*role, RosterEntry::new(*name, *name))
        });
        self.reconciler
            .reconcile(&course.id, &snapshot)
            .expect("reconcile");
    }

    fn edit(&self, who: &str, article: &str, when: DateTime<Utc>, delta: i64, views: u64) {
        let report = self
            .ingestor
            .ingest(&[ActivityRecord {
                participant: who.to_string(),
                article: ArticleId::new(article),
                timestamp: when,
                byte_delta: delta,
                views,
                is_new_article: false,
                article_title: Some(format!("Article {article}")),
                article_namespace: None,
            }])
            .expect("ingest");
        assert_eq!(report.accepted, 1, "edit by {who} should be accepted");
    }
}

#[test]
fn test_full_pipeline_counts() {
    let h = Harness::new(date(2024, 2, 15));
    let course = h.course("bio-101", "basic");
    h.enroll(
        &course,
        &[
            ("Alice", Role::Student),
            ("Bob", Role::Student),
            ("Carol", Role::Student),
            ("Prof", Role::Instructor),
        ],
    );

    h.edit("Alice", "a1", at(2024, 1, 10), 500, 10);
    h.edit("Alice", "a1", at(2024, 1, 12), -200, 25);
    h.edit("Bob", "a2", at(2024, 2, 1), 300, 7);
    h.edit("Bob", "a2", at(2024, 5, 1), 900, 99); // outside window

    let report = h.aggregator.recompute(&course.id).expect("recompute");
    let cache = report.cache;

    assert_eq!(cache.user_count, 3);
    assert_eq!(cache.article_count, 2);
    assert_eq!(cache.revision_count, 3);
    assert_eq!(cache.character_sum, 800);
    // views are the latest cumulative count, whatever the edit's date
    assert_eq!(cache.view_sum, 25 + 99);
    assert_eq!(cache.new_article_count, 0);
    assert!(cache.trained_count <= cache.user_count);
    assert_eq!(report.training_mode, TrainingMode::DueModules);

    let stored = h.courses.get_course(&course.id).expect("get");
    assert_eq!(stored.cache, cache);
    assert!(stored.cache_updated_at.is_some());
}

#[test]
fn test_recompute_twice_is_identical() {
    let h = Harness::new(date(2024, 2, 15));
    let course = h.course("chem-1", "basic");
    h.enroll(&course, &[("Alice", Role::Student)]);
    h.edit("Alice", "a1", at(2024, 1, 10), 120, 3);

    let first = h.aggregator.recompute(&course.id).expect("first");
    let second = h.aggregator.recompute(&course.id).expect("second");
    assert_eq!(first.cache, second.cache);
    assert_eq!(
        h.backend.list_associations(&course.id).expect("first list"),
        h.backend.list_associations(&course.id).expect("second list")
    );
}

#[test]
fn test_instructor_student_overlap_counts_as_instructor() {
    let h = Harness::new(date(2024, 2, 15));
    let course = h.course("hist-9", "basic");
    h.enroll(
        &course,
        &[
            ("Dana", Role::Student),
            ("Dana", Role::Instructor),
            ("Eve", Role::Student),
        ],
    );

    let report = h.aggregator.recompute(&course.id).expect("recompute");
    assert_eq!(report.cache.user_count, 1);
}

#[test]
fn test_training_completion_moves_trained_count() {
    let h = Harness::new(date(2024, 2, 15));
    let course = h.course("phys-2", "basic");
    h.enroll(&course, &[("Alice", Role::Student)]);

    for slug in ["editing-basics", "plagiarism"] {
        h.courses
            .add_training_module(&TrainingModule {
                id: ModuleId::new(slug),
                slug: slug.to_string(),
                name: slug.to_string(),
            })
            .expect("module");
    }
    h.courses
        .add_timeline_block(
            &course.id,
            0,
            None,
            vec![ModuleId::new("editing-basics"), ModuleId::new("plagiarism")],
        )
        .expect("block");

    let alice = h
        .backend
        .get_participant_by_username("Alice")
        .expect("lookup")
        .expect("alice");
    let complete = |module: &str| {
        h.courses
            .record_training_completion(&TrainingCompletion {
                participant_id: alice.id.clone(),
                module_id: ModuleId::new(module),
                completed_at: Some(at(2024, 1, 5)),
            })
            .expect("completion");
    };

    complete("editing-basics");
    let partial = h.aggregator.recompute(&course.id).expect("partial");
    assert_eq!(partial.cache.trained_count, 0);

    complete("plagiarism");
    let full = h.aggregator.recompute(&course.id).expect("full");
    assert_eq!(full.cache.trained_count, 1);
    assert_eq!(full.cache.user_count, 1);
}

#[test]
fn test_legacy_course_uses_trained_flag() {
    let h = Harness::new(date(2015, 3, 1));
    let course = h
        .courses
        .create_course(
            NewCourse::new("old-1", "Old", date(2015, 1, 1), date(2015, 5, 1))
                .with_variant("legacy")
                .with_passcode("pw"),
        )
        .expect("create");
    h.enroll(&course, &[("Alice", Role::Student), ("Bob", Role::Student)]);
    h.courses
        .set_legacy_trained("alice", true)
        .expect("set trained");

    let report = h.aggregator.recompute(&course.id).expect("recompute");
    assert_eq!(report.training_mode, TrainingMode::Legacy);
    assert_eq!(report.cache.trained_count, 1);
    assert_eq!(report.cache.user_count, 2);
}

#[test]
fn test_edits_disabled_variant_reports_no_edit_metrics() {
    let h = Harness::new(date(2024, 2, 15));
    let course = h.course("fellows", "fellows_cohort");
    h.enroll(&course, &[("Alice", Role::Student)]);
    h.edit("Alice", "a1", at(2024, 1, 10), 120, 3);

    let cache = h.aggregator.recompute(&course.id).expect("recompute").cache;
    assert_eq!(cache.user_count, 1);
    assert_eq!(cache.revision_count, 0);
    assert_eq!(cache.character_sum, 0);
    assert_eq!(cache.article_count, 0);
}

#[test]
fn test_recompute_all_reports_each_course() {
    let h = Harness::new(date(2024, 2, 15));
    let a = h.course("a-course", "basic");
    let b = h.course("b-course", "editathon");
    h.enroll(&a, &[("Alice", Role::Student)]);
    h.enroll(&b, &[("Alice", Role::Student)]);
    h.edit("Alice", "a1", at(2024, 1, 10), 50, 1);

    let report = h.aggregator.recompute_all().expect("recompute all");
    assert!(report.is_success());
    assert_eq!(report.recomputed.len(), 2);
    for course in &report.recomputed {
        assert_eq!(course.cache.article_count, 1, "{}", course.slug);
    }
}
