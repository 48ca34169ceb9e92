//! Integration tests for roster reconciliation.
//!
//! Covers convergence, role changes, the association cascade for departing
//! students, and the effect of a cascade on the next recompute.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use cohortcache::models::{ActivityRecord, ArticleId, NewCourse, Role, RosterEntry, RosterSnapshot};
use cohortcache::services::{FixedClock, JsonFileRosterSource};
use cohortcache::{
    ActivityIngestor, CacheAggregator, Course, CourseBackend, CourseService, EnrollmentReconciler,
    Error, SqliteCourseBackend, TrainingConfig,
};
use tempfile::TempDir;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 8, 0, 0).single().expect("valid")
}

fn students(names: &[&str]) -> RosterSnapshot {
    names.iter().fold(RosterSnapshot::new(), |snap, name| {
        snap.with_entry(Role::Student, RosterEntry::new(*name, *name))
    })
}

struct Setup {
    backend: Arc<SqliteCourseBackend>,
    reconciler: EnrollmentReconciler,
    ingestor: ActivityIngestor,
    course: Course,
}

fn setup() -> Setup {
    let backend = Arc::new(SqliteCourseBackend::in_memory().expect("backend"));
    let course = CourseService::new(backend.clone())
        .create_course(
            NewCourse::new("geo-1", "Geography", date(2024, 1, 1), date(2024, 3, 31))
                .with_variant("basic"),
        )
        .expect("course");
    Setup {
        reconciler: EnrollmentReconciler::new(backend.clone(), backend.clone()),
        ingestor: ActivityIngestor::new(backend.clone()),
        backend,
        course,
    }
}

impl Setup {
    fn edit(&self, who: &str, article: &str) {
        self.ingestor
            .ingest(&[ActivityRecord {
                participant: who.to_string(),
                article: ArticleId::new(article),
                timestamp: at(2024, 2, 1),
                byte_delta: 100,
                views: 1,
                is_new_article: false,
                article_title: Some(article.to_uppercase()),
                article_namespace: None,
            }])
            .expect("ingest");
    }

    fn associated(&self) -> Vec<String> {
        self.backend
            .list_associations(&self.course.id)
            .expect("associations")
            .into_iter()
            .map(|a| a.article.id.as_str().to_string())
            .collect()
    }

    fn roles_of(&self, username: &str) -> Vec<Role> {
        self.backend
            .list_memberships(&self.course.id)
            .expect("memberships")
            .into_iter()
            .filter(|m| m.username == username)
            .map(|m| m.role)
            .collect()
    }
}

#[test]
fn test_rerun_converges_to_empty_diff() {
    let s = setup();
    let snapshot = students(&["Alice", "Bob"]);

    let first = s.reconciler.reconcile(&s.course.id, &snapshot).expect("first");
    assert_eq!(first.additions, 2);

    let second = s.reconciler.reconcile(&s.course.id, &snapshot).expect("second");
    assert!(second.is_noop());
    assert!(
        s.reconciler
            .plan(&s.course.id, &snapshot)
            .expect("plan")
            .is_empty()
    );
}

#[test]
fn test_removing_b_cascades_only_b_owned_articles() {
    let s = setup();
    s.reconciler
        .reconcile(&s.course.id, &students(&["Alice", "Bob"]))
        .expect("enroll");

    s.edit("Alice", "alice-only");
    s.edit("Bob", "bob-only");
    s.edit("Alice", "shared");
    s.edit("Bob", "shared");

    let report = s
        .reconciler
        .reconcile(&s.course.id, &students(&["Alice"]))
        .expect("reconcile");

    assert_eq!(report.removals, 1);
    assert_eq!(report.cascaded, vec![ArticleId::new("bob-only")]);
    assert_eq!(s.roles_of("Alice"), vec![Role::Student]);
    assert!(s.roles_of("Bob").is_empty());

    let mut remaining = s.associated();
    remaining.sort();
    assert_eq!(remaining, vec!["alice-only".to_string(), "shared".to_string()]);
}

#[test]
fn test_cascade_lowers_article_count_on_next_recompute() {
    let s = setup();
    let aggregator = CacheAggregator::new(
        s.backend.clone(),
        s.backend.clone(),
        TrainingConfig::default(),
    )
    .with_clock(Arc::new(FixedClock::at_date(date(2024, 2, 10))));

    s.reconciler
        .reconcile(&s.course.id, &students(&["Alice", "Bob"]))
        .expect("enroll");
    s.edit("Alice", "a1");
    s.edit("Bob", "b1");

    let before = aggregator.recompute(&s.course.id).expect("before");
    assert_eq!(before.cache.article_count, 2);

    s.reconciler
        .reconcile(&s.course.id, &students(&["Alice"]))
        .expect("drop bob");
    let after = aggregator.recompute(&s.course.id).expect("after");
    assert_eq!(after.cache.article_count, 1);
    assert_eq!(after.cache.user_count, 1);
}

#[test]
fn test_promotion_is_a_role_change() {
    let s = setup();
    s.reconciler
        .reconcile(&s.course.id, &students(&["Alice", "Bob"]))
        .expect("enroll");
    s.edit("Bob", "b1");

    let snapshot = students(&["Alice"]).with_entry(Role::Instructor, RosterEntry::new("Bob", "Bob"));
    let report = s.reconciler.reconcile(&s.course.id, &snapshot).expect("promote");

    assert_eq!(report.role_changes, 1);
    assert_eq!(report.additions, 0);
    assert_eq!(report.removals, 0);
    assert_eq!(s.roles_of("Bob"), vec![Role::Instructor]);
    // Bob stops being a student, so his sole article goes with him
    assert_eq!(report.cascaded, vec![ArticleId::new("b1")]);
}

#[test]
fn test_usernames_are_canonicalized() {
    let s = setup();
    s.reconciler
        .reconcile(&s.course.id, &students(&["jane_doe"]))
        .expect("enroll");
    assert_eq!(s.roles_of("Jane doe"), vec![Role::Student]);

    let again = s
        .reconciler
        .reconcile(&s.course.id, &students(&["Jane doe"]))
        .expect("same person");
    assert!(again.is_noop());
}

#[test]
fn test_unknown_course_is_not_found() {
    let s = setup();
    let err = s
        .reconciler
        .reconcile(&cohortcache::CourseId::new("missing"), &students(&["Alice"]))
        .expect_err("missing course");
    assert!(err.is_not_found());
}

#[test]
fn test_file_source_errors_leave_memberships_untouched() {
    let s = setup();
    s.reconciler
        .reconcile(&s.course.id, &students(&["Alice"]))
        .expect("enroll");

    let dir = TempDir::new().expect("tempdir");
    let source = JsonFileRosterSource::new(dir.path());

    // no file yet
    assert!(s.reconciler.reconcile_from(&source, &s.course.id).is_err());

    std::fs::write(source.path_for(&s.course), r#"{"wizard": []}"#).expect("write");
    let err = s
        .reconciler
        .reconcile_from(&source, &s.course.id)
        .expect_err("unknown role");
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(s.roles_of("Alice"), vec![Role::Student]);

    std::fs::write(
        source.path_for(&s.course),
        r#"{"student": [{"external_id": "Bob", "display_name": "Bob B"}]}"#,
    )
    .expect("write");
    let report = s
        .reconciler
        .reconcile_from(&source, &s.course.id)
        .expect("reconcile from file");
    assert_eq!((report.additions, report.removals), (1, 1));
    assert!(s.roles_of("Alice").is_empty());
}

impl Setup {
    fn aggregator(&self) -> CacheAggregator {
        CacheAggregator::new(
            self.backend.clone(),
            self.backend.clone(),
            TrainingConfig::default(),
        )
        .with_clock(Arc::new(FixedClock::at_date(date(2024, 2, 10))))
    }
}

#[test]
fn test_late_enrollment_counts_earlier_edits() {
    let s = setup();
    s.reconciler
        .reconcile(&s.course.id, &students(&["Ada"]))
        .expect("enroll in first course");
    s.edit("Ada", "x");

    let later = CourseService::new(s.backend.clone())
        .create_course(
            NewCourse::new("geo-2", "Geography II", date(2024, 1, 1), date(2024, 3, 31))
                .with_variant("basic"),
        )
        .expect("second course");
    s.reconciler
        .reconcile(&later.id, &students(&["Ada"]))
        .expect("enroll in second course");

    let aggregator = s.aggregator();
    let first = aggregator.recompute(&s.course.id).expect("first course");
    let second = aggregator.recompute(&later.id).expect("second course");

    assert_eq!(second.associations_created, 1);
    assert_eq!(second.cache, first.cache);
    assert_eq!(second.cache.article_count, 1);
    assert_eq!(second.cache.revision_count, 1);
    assert_eq!(second.cache.character_sum, 100);
}

#[test]
fn test_reenrolled_student_regains_counted_work() {
    let s = setup();
    let aggregator = s.aggregator();
    s.reconciler
        .reconcile(&s.course.id, &students(&["Ada"]))
        .expect("enroll");
    s.edit("Ada", "x");
    let before = aggregator.recompute(&s.course.id).expect("before");
    assert_eq!(before.cache.article_count, 1);

    let removed = s
        .reconciler
        .reconcile(&s.course.id, &RosterSnapshot::new())
        .expect("remove");
    assert_eq!(removed.cascaded, vec![ArticleId::new("x")]);
    assert!(s.associated().is_empty());

    s.reconciler
        .reconcile(&s.course.id, &students(&["Ada"]))
        .expect("re-enroll");
    let after = aggregator.recompute(&s.course.id).expect("after");

    assert_eq!(after.cache, before.cache);
    assert_eq!(after.cache.character_sum, 100);
    assert_eq!(s.associated(), vec!["x".to_string()]);
}

#[test]
fn test_edits_before_any_enrollment_are_kept() {
    let s = setup();
    s.edit("Newcomer", "n1");
    assert!(s.associated().is_empty());

    s.reconciler
        .reconcile(&s.course.id, &students(&["Newcomer"]))
        .expect("enroll");
    let report = s.aggregator().recompute(&s.course.id).expect("recompute");

    assert_eq!(report.cache.article_count, 1);
    assert_eq!(report.cache.revision_count, 1);
    assert_eq!(report.anomalies, 0);
}
