//! Course administration.
//!
//! Every write is validated in full before it reaches storage, so a rejected
//! request leaves nothing behind.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::instrument;

use crate::models::{
    BlockId, Cohort, CohortId, Course, CourseCache, CourseId, CourseUpdate, CourseVariant,
    ModuleId, NewCourse, Participant, TimelineBlock, TrainingCompletion, TrainingModule,
    canonicalize_username, validate_variant,
};
use crate::storage::CourseBackend;
use crate::{Error, Result};

/// Creates, updates and looks up courses, cohorts and training data.
pub struct CourseService {
    backend: Arc<dyn CourseBackend>,
}

impl CourseService {
    /// Creates a service over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn CourseBackend>) -> Self {
        Self { backend }
    }

    /// Validates and stores a new course.
    ///
    /// The timeline defaults to the course window. The cache starts at zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the request is invalid or the slug is
    /// taken, or an error if storage cannot be accessed.
    #[instrument(name = "cohortcache.course.create", skip_all, fields(slug = %request.slug))]
    pub fn create_course(&self, request: NewCourse) -> Result<Course> {
        if request.slug.trim().is_empty() {
            return Err(Error::Validation("course slug must not be empty".to_string()));
        }
        let variant = validate_variant(&request.variant)?;
        let course = Course {
            id: CourseId::generate(),
            slug: request.slug.trim().to_string(),
            title: request.title.trim().to_string(),
            start: request.start,
            end: request.end,
            timeline_start: request.timeline_start.unwrap_or(request.start),
            timeline_end: request.timeline_end.unwrap_or(request.end),
            variant,
            passcode: normalize_passcode(request.passcode),
            cache: CourseCache::default(),
            recompute_anomalies: 0,
            cache_updated_at: None,
        };
        validate_course(&course)?;

        self.backend.insert_course(&course)?;
        tracing::info!(course_id = %course.id, variant = %course.variant, "course created");
        Ok(course)
    }

    /// Applies a partial update after validating the merged result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown course, [`Error::Validation`]
    /// if the merged course is invalid, or an error if storage cannot be
    /// accessed.
    #[instrument(name = "cohortcache.course.update", skip(self, update), fields(course_id = %course_id))]
    pub fn update_course(&self, course_id: &CourseId, update: CourseUpdate) -> Result<Course> {
        let mut course = self.get_course(course_id)?;

        if let Some(tag) = update.variant {
            course.variant = validate_variant(&tag)?;
        }
        if let Some(title) = update.title {
            course.title = title.trim().to_string();
        }
        if let Some(start) = update.start {
            course.start = start;
        }
        if let Some(end) = update.end {
            course.end = end;
        }
        if let Some(start) = update.timeline_start {
            course.timeline_start = start;
        }
        if let Some(end) = update.timeline_end {
            course.timeline_end = end;
        }
        if let Some(passcode) = update.passcode {
            course.passcode = normalize_passcode(Some(passcode));
        }
        validate_course(&course)?;

        if !self.backend.update_course(&course)? {
            return Err(Error::course_not_found(course_id));
        }
        Ok(course)
    }

    /// Gets a course by ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the course does not exist.
    pub fn get_course(&self, course_id: &CourseId) -> Result<Course> {
        self.backend
            .get_course(course_id)?
            .ok_or_else(|| Error::course_not_found(course_id))
    }

    /// Gets a course by slug.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no course has that slug.
    pub fn get_course_by_slug(&self, slug: &str) -> Result<Course> {
        self.backend
            .get_course_by_slug(slug)?
            .ok_or_else(|| Error::course_not_found(slug))
    }

    /// Lists every course ordered by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    pub fn list_courses(&self) -> Result<Vec<Course>> {
        self.backend.list_courses()
    }

    /// Creates a cohort.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the slug is empty or taken.
    pub fn create_cohort(&self, slug: &str, title: &str) -> Result<Cohort> {
        let slug = slug.trim();
        if slug.is_empty() {
            return Err(Error::Validation("cohort slug must not be empty".to_string()));
        }
        let cohort = Cohort {
            id: CohortId::generate(),
            slug: slug.to_string(),
            title: title.trim().to_string(),
        };
        self.backend.insert_cohort(&cohort)?;
        Ok(cohort)
    }

    /// Gets a cohort by slug.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no cohort has that slug.
    pub fn get_cohort_by_slug(&self, slug: &str) -> Result<Cohort> {
        self.backend
            .get_cohort_by_slug(slug)?
            .ok_or_else(|| Error::NotFound {
                kind: "cohort",
                id: slug.to_string(),
            })
    }

    /// Adds a course to a cohort, both named by slug.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if either side does not exist.
    pub fn add_course_to_cohort(&self, cohort_slug: &str, course_slug: &str) -> Result<()> {
        let cohort = self.get_cohort_by_slug(cohort_slug)?;
        let course = self.get_course_by_slug(course_slug)?;
        self.backend.add_course_to_cohort(&cohort.id, &course.id)
    }

    /// Adds a timeline block to a course.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown course.
    pub fn add_timeline_block(
        &self,
        course_id: &CourseId,
        week_index: u32,
        due_date: Option<NaiveDate>,
        training_modules: Vec<ModuleId>,
    ) -> Result<TimelineBlock> {
        self.get_course(course_id)?;
        let block = TimelineBlock {
            id: BlockId::generate(),
            course_id: course_id.clone(),
            week_index,
            due_date,
            training_modules,
        };
        self.backend.insert_timeline_block(&block)?;
        Ok(block)
    }

    /// Registers or renames a training module.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    pub fn add_training_module(&self, module: &TrainingModule) -> Result<()> {
        self.backend.upsert_training_module(module)
    }

    /// Records a participant's progress on a module.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    pub fn record_training_completion(&self, completion: &TrainingCompletion) -> Result<()> {
        self.backend.record_training_completion(completion)
    }

    /// Sets the legacy trained flag by username.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no participant has that username.
    pub fn set_legacy_trained(&self, username: &str, trained: bool) -> Result<Participant> {
        let participant = self.require_participant(username)?;
        if !self.backend.set_legacy_trained(&participant.id, trained)? {
            return Err(participant_not_found(&participant.username));
        }
        Ok(Participant {
            trained,
            ..participant
        })
    }

    fn require_participant(&self, username: &str) -> Result<Participant> {
        let canonical = canonicalize_username(username);
        self.backend
            .get_participant_by_username(&canonical)?
            .ok_or_else(|| participant_not_found(&canonical))
    }
}

fn participant_not_found(username: &str) -> Error {
    Error::NotFound {
        kind: "participant",
        id: username.to_string(),
    }
}

fn normalize_passcode(passcode: Option<String>) -> Option<String> {
    passcode
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

/// Checks a complete course record.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the first failed rule.
pub fn validate_course(course: &Course) -> Result<()> {
    if course.title.is_empty() {
        return Err(Error::Validation("course title must not be empty".to_string()));
    }
    if course.start > course.end {
        return Err(Error::Validation(format!(
            "course start {} is after end {}",
            course.start, course.end
        )));
    }
    if course.timeline_start > course.timeline_end {
        return Err(Error::Validation(format!(
            "timeline start {} is after timeline end {}",
            course.timeline_start, course.timeline_end
        )));
    }
    if passcode_missing(course.variant, course.passcode.as_deref()) {
        return Err(Error::Validation(format!(
            "a passcode is required for {} courses",
            course.variant
        )));
    }
    Ok(())
}

fn passcode_missing(variant: CourseVariant, passcode: Option<&str>) -> bool {
    variant.traits().passcode_required && passcode.is_none_or(str::is_empty)
}
