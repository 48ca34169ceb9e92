//! Table-driven tests for course variants and create/update validation.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::NaiveDate;
use cohortcache::models::{CourseUpdate, NewCourse, validate_variant};
use cohortcache::{CourseService, CourseVariant, Error, SqliteCourseBackend};
use test_case::test_case;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn service() -> CourseService {
    CourseService::new(Arc::new(SqliteCourseBackend::in_memory().expect("backend")))
}

#[test_case("classroom_program", CourseVariant::ClassroomProgram ; "canonical default")]
#[test_case("basic", CourseVariant::Basic ; "basic")]
#[test_case("visiting_scholarship", CourseVariant::VisitingScholarship ; "visiting scholarship")]
#[test_case("editathon", CourseVariant::Editathon ; "editathon")]
#[test_case("fellows_cohort", CourseVariant::FellowsCohort ; "fellows cohort")]
#[test_case("legacy", CourseVariant::Legacy ; "legacy")]
fn test_canonical_tags_validate(tag: &str, expected: CourseVariant) {
    assert_eq!(validate_variant(tag).expect("known tag"), expected);
}

#[test_case("ClassroomProgramCourse", CourseVariant::ClassroomProgram ; "legacy class name")]
#[test_case("BASIC", CourseVariant::Basic ; "upper case")]
#[test_case("BasicCourse", CourseVariant::Basic ; "basic class name")]
#[test_case("Editathon", CourseVariant::Editathon ; "mixed case editathon")]
#[test_case(" legacy ", CourseVariant::Legacy ; "padded legacy")]
fn test_aliases_read_but_do_not_validate(tag: &str, read_as: CourseVariant) {
    assert_eq!(CourseVariant::parse(tag), Some(read_as));
    assert!(matches!(validate_variant(tag), Err(Error::Validation(_))));
}

#[test_case("" ; "empty")]
#[test_case("seminar" ; "unknown word")]
#[test_case("classroom-program" ; "dash instead of underscore")]
#[test_case("MysteryCourse" ; "unknown class name")]
fn test_unknown_tags_are_validation_errors(tag: &str) {
    assert!(matches!(validate_variant(tag), Err(Error::Validation(_))));
    assert_eq!(CourseVariant::parse(tag), None);
}

#[test]
fn test_alias_is_rejected_on_create() {
    let svc = service();
    let result = svc.create_course(
        NewCourse::new("slug-1", "Title", date(2025, 1, 1), date(2025, 2, 1))
            .with_variant("BasicCourse"),
    );
    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(svc.list_courses().expect("list").is_empty());
}

#[test_case(CourseVariant::ClassroomProgram, "courses", true, true)]
#[test_case(CourseVariant::Basic, "courses_generic", true, false)]
#[test_case(CourseVariant::VisitingScholarship, "courses_generic", true, false)]
#[test_case(CourseVariant::Editathon, "courses_generic", true, false)]
#[test_case(CourseVariant::FellowsCohort, "courses_generic", false, false)]
#[test_case(CourseVariant::Legacy, "courses", true, true)]
fn test_variant_table(variant: CourseVariant, prefix: &str, edits: bool, passcode: bool) {
    let traits = variant.traits();
    assert_eq!(traits.string_prefix, prefix);
    assert_eq!(traits.wiki_edits_enabled, edits);
    assert_eq!(traits.passcode_required, passcode);
}

#[test_case("classroom_program", None, false ; "passcode variant without passcode")]
#[test_case("classroom_program", Some("pw"), true ; "passcode variant with passcode")]
#[test_case("legacy", Some(""), false ; "legacy with empty passcode")]
#[test_case("basic", None, true ; "basic without passcode")]
#[test_case("editathon", Some("pw"), true ; "optional passcode given")]
#[test_case("seminar", Some("pw"), false ; "unknown variant")]
fn test_create_validation(tag: &str, passcode: Option<&str>, accepted: bool) {
    let svc = service();
    let mut request =
        NewCourse::new("slug-1", "Title", date(2025, 1, 1), date(2025, 2, 1)).with_variant(tag);
    if let Some(passcode) = passcode {
        request = request.with_passcode(passcode);
    }

    let result = svc.create_course(request);
    assert_eq!(result.is_ok(), accepted, "{result:?}");
    if !accepted {
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(svc.list_courses().expect("list").is_empty());
    }
}

#[test_case(CourseUpdate { title: Some("  ".to_string()), ..CourseUpdate::default() } ; "blank title")]
#[test_case(CourseUpdate { end: Some(NaiveDate::from_ymd_opt(2024, 12, 1).expect("date")), ..CourseUpdate::default() } ; "end before start")]
#[test_case(CourseUpdate { variant: Some("nope".to_string()), ..CourseUpdate::default() } ; "unknown variant")]
#[test_case(CourseUpdate { variant: Some("legacy".to_string()), ..CourseUpdate::default() } ; "variant needing passcode")]
fn test_rejected_update_changes_nothing(update: CourseUpdate) {
    let svc = service();
    let course = svc
        .create_course(
            NewCourse::new("slug-1", "Title", date(2025, 1, 1), date(2025, 2, 1))
                .with_variant("basic"),
        )
        .expect("create");

    let err = svc.update_course(&course.id, update).expect_err("rejected");
    assert!(matches!(err, Error::Validation(_)));

    let stored = svc.get_course(&course.id).expect("get");
    assert_eq!(stored.title, "Title");
    assert_eq!(stored.end, date(2025, 2, 1));
    assert_eq!(stored.variant, CourseVariant::Basic);
}
