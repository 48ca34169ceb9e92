//! Survey command handler.

use chrono::NaiveDate;
use cohortcache::config::CohortCacheConfig;
use cohortcache::models::{RelativeTo, SurveyQuery};

use super::Services;

/// Survey command.
///
/// Prints the slug of every matching course, one per line.
pub fn cmd_survey(
    config: &CohortCacheConfig,
    cohort: &str,
    days: u32,
    before: bool,
    relative_to: &str,
    upcoming: bool,
    date: Option<NaiveDate>,
) -> Result<(), Box<dyn std::error::Error>> {
    let relative_to: RelativeTo = relative_to.parse()?;
    let query = SurveyQuery::new(days, before, relative_to);

    let services = Services::open(config)?;
    let cohort = services.courses.get_cohort_by_slug(cohort)?;
    let schedule = &services.schedule;

    let matched = match (upcoming, date) {
        (false, None) => schedule.ready_for_survey_in_cohort(&cohort.id, &query)?,
        (false, Some(today)) => schedule.ready_for_survey_in_cohort_on(&cohort.id, &query, today)?,
        (true, None) => schedule.will_be_ready_for_survey_in_cohort(&cohort.id, &query)?,
        (true, Some(today)) => {
            schedule.will_be_ready_for_survey_in_cohort_on(&cohort.id, &query, today)?
        },
    };

    for course_id in &matched {
        let course = services.courses.get_course(course_id)?;
        println!("{}", course.slug);
    }
    Ok(())
}
