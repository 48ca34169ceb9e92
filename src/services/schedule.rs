//! Survey scheduling.
//!
//! Answers whether a course reaches a survey date today, or will reach it
//! later. Only course `start` and `end` are read; no cache or lock is involved.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::instrument;

use crate::Result;
use crate::models::{CohortId, Course, CourseId, SurveyQuery};
use crate::services::clock::{Clock, SystemClock};
use crate::storage::CourseBackend;

/// Date-window queries over course schedules.
pub struct ScheduleIndex {
    backend: Arc<dyn CourseBackend>,
    clock: Arc<dyn Clock>,
}

impl ScheduleIndex {
    /// Creates an index reading dates from `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn CourseBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// True when today is exactly the survey date.
    #[must_use]
    pub fn ready_for_survey(&self, course: &Course, query: &SurveyQuery) -> bool {
        Self::ready_for_survey_on(course, query, self.clock.today())
    }

    /// True when `today` is exactly the survey date.
    ///
    /// A target date outside chrono's range is never ready.
    #[must_use]
    pub fn ready_for_survey_on(course: &Course, query: &SurveyQuery, today: NaiveDate) -> bool {
        query.target_date(course).is_some_and(|target| target == today)
    }

    /// True when the survey date is strictly after today.
    #[must_use]
    pub fn will_be_ready_for_survey(&self, course: &Course, query: &SurveyQuery) -> bool {
        Self::will_be_ready_for_survey_on(course, query, self.clock.today())
    }

    /// True when the survey date is strictly after `today`.
    #[must_use]
    pub fn will_be_ready_for_survey_on(
        course: &Course,
        query: &SurveyQuery,
        today: NaiveDate,
    ) -> bool {
        query.target_date(course).is_some_and(|target| target > today)
    }

    /// Courses in a cohort that are ready for the survey today.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    pub fn ready_for_survey_in_cohort(
        &self,
        cohort_id: &CohortId,
        query: &SurveyQuery,
    ) -> Result<Vec<CourseId>> {
        self.ready_for_survey_in_cohort_on(cohort_id, query, self.clock.today())
    }

    /// Courses in a cohort that are ready for the survey on `today`.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    #[instrument(
        name = "cohortcache.schedule.ready_in_cohort",
        skip(self, query),
        fields(cohort_id = %cohort_id, days = query.days, before = query.before)
    )]
    pub fn ready_for_survey_in_cohort_on(
        &self,
        cohort_id: &CohortId,
        query: &SurveyQuery,
        today: NaiveDate,
    ) -> Result<Vec<CourseId>> {
        self.select(cohort_id, |course| {
            Self::ready_for_survey_on(course, query, today)
        })
    }

    /// Courses in a cohort whose survey date is still ahead.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    pub fn will_be_ready_for_survey_in_cohort(
        &self,
        cohort_id: &CohortId,
        query: &SurveyQuery,
    ) -> Result<Vec<CourseId>> {
        self.will_be_ready_for_survey_in_cohort_on(cohort_id, query, self.clock.today())
    }

    /// Courses in a cohort whose survey date is after `today`.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    #[instrument(
        name = "cohortcache.schedule.upcoming_in_cohort",
        skip(self, query),
        fields(cohort_id = %cohort_id, days = query.days, before = query.before)
    )]
    pub fn will_be_ready_for_survey_in_cohort_on(
        &self,
        cohort_id: &CohortId,
        query: &SurveyQuery,
        today: NaiveDate,
    ) -> Result<Vec<CourseId>> {
        self.select(cohort_id, |course| {
            Self::will_be_ready_for_survey_on(course, query, today)
        })
    }

    fn select(&self, cohort_id: &CohortId, keep: impl Fn(&Course) -> bool) -> Result<Vec<CourseId>> {
        let courses = self.backend.courses_in_cohort(cohort_id)?;
        let matched: Vec<CourseId> = courses
            .into_iter()
            .filter(|course| keep(course))
            .map(|course| course.id)
            .collect();
        tracing::debug!(matched = matched.len(), "schedule query evaluated");
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cohort, CourseCache, CourseVariant, RelativeTo};
    use crate::services::clock::FixedClock;
    use crate::storage::SqliteCourseBackend;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn course(id: &str, start: NaiveDate, end: NaiveDate) -> Course {
        Course {
            id: CourseId::new(id),
            slug: id.to_string(),
            title: id.to_uppercase(),
            start,
            end,
            timeline_start: start,
            timeline_end: end,
            variant: CourseVariant::Basic,
            passcode: None,
            cache: CourseCache::default(),
            recompute_anomalies: 0,
            cache_updated_at: None,
        }
    }

    #[test]
    fn test_ready_only_on_exact_day() {
        let c = course("c1", date(2025, 1, 10), date(2025, 5, 1));
        let query = SurveyQuery::new(7, true, RelativeTo::End);

        assert!(ScheduleIndex::ready_for_survey_on(&c, &query, date(2025, 4, 24)));
        assert!(!ScheduleIndex::ready_for_survey_on(&c, &query, date(2025, 4, 23)));
        assert!(!ScheduleIndex::ready_for_survey_on(&c, &query, date(2025, 4, 25)));
    }

    #[test]
    fn test_will_be_ready_is_strictly_future() {
        let c = course("c1", date(2025, 1, 10), date(2025, 5, 1));
        let query = SurveyQuery::new(3, false, RelativeTo::Start);

        assert!(ScheduleIndex::will_be_ready_for_survey_on(&c, &query, date(2025, 1, 12)));
        assert!(!ScheduleIndex::will_be_ready_for_survey_on(&c, &query, date(2025, 1, 13)));
        assert!(!ScheduleIndex::will_be_ready_for_survey_on(&c, &query, date(2025, 2, 1)));
    }

    #[test]
    fn test_plain_forms_use_clock() {
        let backend = Arc::new(SqliteCourseBackend::in_memory().expect("backend"));
        let index = ScheduleIndex::new(backend)
            .with_clock(Arc::new(FixedClock::at_date(date(2025, 4, 24))));
        let c = course("c1", date(2025, 1, 10), date(2025, 5, 1));

        assert!(index.ready_for_survey(&c, &SurveyQuery::new(7, true, RelativeTo::End)));
        assert!(index.will_be_ready_for_survey(&c, &SurveyQuery::new(0, false, RelativeTo::End)));
    }

    #[test]
    fn test_cohort_queries_only_return_members() {
        let backend = Arc::new(SqliteCourseBackend::in_memory().expect("backend"));
        let cohort = Cohort {
            id: CohortId::new("spring"),
            slug: "spring-2025".to_string(),
            title: "Spring 2025".to_string(),
        };
        backend.insert_cohort(&cohort).expect("cohort");

        let due = course("due", date(2025, 1, 10), date(2025, 5, 1));
        let later = course("later", date(2025, 1, 10), date(2025, 6, 1));
        let outside = course("outside", date(2025, 1, 10), date(2025, 5, 1));
        for c in [&due, &later, &outside] {
            backend.insert_course(c).expect("course");
        }
        backend
            .add_course_to_cohort(&cohort.id, &due.id)
            .expect("add due");
        backend
            .add_course_to_cohort(&cohort.id, &later.id)
            .expect("add later");

        let index = ScheduleIndex::new(backend);
        let query = SurveyQuery::new(7, true, RelativeTo::End);
        let today = date(2025, 4, 24);

        let ready = index
            .ready_for_survey_in_cohort_on(&cohort.id, &query, today)
            .expect("ready");
        assert_eq!(ready, vec![due.id.clone()]);

        let upcoming = index
            .will_be_ready_for_survey_in_cohort_on(&cohort.id, &query, today)
            .expect("upcoming");
        assert_eq!(upcoming, vec![later.id]);
    }
}
