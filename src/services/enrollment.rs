//! Roster reconciliation.
//!
//! Reconciliation is split into pure planning and a single atomic apply:
//!
//! 1. [`plan_roster`] diffs current memberships against a snapshot.
//! 2. [`plan_cascade`] picks the article associations that only departing
//!    students contributed to.
//! 3. [`CourseBackend::apply_roster`] writes both in one transaction.
//!
//! A failure anywhere before or during the apply leaves memberships and
//! associations untouched, and re-running the same snapshot converges to an
//! empty diff.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::instrument;

use crate::models::{
    ArticleAssociation, ArticleId, Course, CourseId, Membership, ParticipantId, Role, RoleChange,
    RosterAddition, RosterChangeSet, RosterDiff, RosterRemoval, RosterSnapshot,
};
use crate::services::locks::CourseLocks;
use crate::storage::{ActivityLedger, CourseBackend};
use crate::{Error, Result};

/// Usernames of the students who edited each article inside the window.
pub type Contributors = BTreeMap<ArticleId, BTreeSet<String>>;

/// Diffs current memberships against a roster snapshot.
///
/// Entries are matched by canonical username. For each person, roles they
/// hold but are not listed under are removed and roles they are listed under
/// but do not hold are added; a removal and an addition for the same person
/// are paired into an in-place [`RoleChange`]. Applying the result and
/// planning again yields an empty diff.
#[must_use]
pub fn plan_roster(current: &[Membership], snapshot: &RosterSnapshot) -> RosterDiff {
    let mut held: BTreeMap<&str, (&ParticipantId, BTreeSet<Role>)> = BTreeMap::new();
    for membership in current {
        held.entry(membership.username.as_str())
            .or_insert_with(|| (&membership.participant_id, BTreeSet::new()))
            .1
            .insert(membership.role);
    }

    let mut listed: BTreeMap<String, (String, BTreeSet<Role>)> = BTreeMap::new();
    for (role, entry) in snapshot.iter() {
        let username = entry.canonical_id();
        let slot = listed
            .entry(username)
            .or_insert_with(|| (entry.display_name.trim().to_string(), BTreeSet::new()));
        if slot.0.is_empty() {
            slot.0 = entry.display_name.trim().to_string();
        }
        slot.1.insert(role);
    }

    let mut diff = RosterDiff::default();
    let no_roles = BTreeSet::new();

    for (username, (participant_id, roles)) in &held {
        let wanted = listed.get(*username).map_or(&no_roles, |(_, r)| r);
        let mut dropped = roles.difference(wanted).copied();
        let mut gained = wanted.difference(roles).copied();

        loop {
            match (dropped.next(), gained.next()) {
                (Some(from), Some(to)) => diff.role_changes.push(RoleChange {
                    participant_id: (*participant_id).clone(),
                    username: (*username).to_string(),
                    from,
                    to,
                }),
                (Some(role), None) => diff.removals.push(RosterRemoval {
                    participant_id: (*participant_id).clone(),
                    username: (*username).to_string(),
                    role,
                }),
                (None, Some(role)) => diff.additions.push(RosterAddition {
                    username: (*username).to_string(),
                    display_name: listed
                        .get(*username)
                        .map(|(name, _)| name.clone())
                        .unwrap_or_default(),
                    role,
                }),
                (None, None) => break,
            }
        }
    }

    for (username, (display_name, roles)) in &listed {
        if held.contains_key(username.as_str()) {
            continue;
        }
        for role in roles {
            diff.additions.push(RosterAddition {
                username: username.clone(),
                display_name: display_name.clone(),
                role: *role,
            });
        }
    }

    diff
}

/// Picks the associations to drop alongside a roster diff.
///
/// An association goes when it has at least one contributor and every
/// contributor is a departing student. Associations nobody has edited yet
/// are kept.
#[must_use]
pub fn plan_cascade(
    diff: &RosterDiff,
    associations: &[ArticleAssociation],
    contributors: &Contributors,
) -> Vec<ArticleId> {
    let departing = diff.departing_students();
    if departing.is_empty() {
        return Vec::new();
    }
    associations
        .iter()
        .filter(|association| {
            contributors
                .get(&association.article.id)
                .is_some_and(|authors| {
                    !authors.is_empty() && authors.iter().all(|a| departing.contains(a))
                })
        })
        .map(|association| association.article.id.clone())
        .collect()
}

/// Supplies roster snapshots for courses.
pub trait RosterSource: Send + Sync {
    /// Fetches the current roster of `course`.
    ///
    /// # Errors
    ///
    /// Returns an error if the roster cannot be fetched or parsed.
    fn fetch(&self, course: &Course) -> Result<RosterSnapshot>;
}

/// Reads `<directory>/<course-slug>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileRosterSource {
    directory: PathBuf,
}

impl JsonFileRosterSource {
    /// Creates a source reading from `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The file holding a course's roster.
    #[must_use]
    pub fn path_for(&self, course: &Course) -> PathBuf {
        self.directory.join(format!("{}.json", course.slug))
    }
}

impl RosterSource for JsonFileRosterSource {
    fn fetch(&self, course: &Course) -> Result<RosterSnapshot> {
        let path = self.path_for(course);
        let json = std::fs::read_to_string(&path).map_err(|e| Error::OperationFailed {
            operation: "read_roster".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        RosterSnapshot::from_json(&json)
    }
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The course.
    pub course_id: CourseId,
    /// Memberships created.
    pub additions: usize,
    /// Memberships deleted.
    pub removals: usize,
    /// Memberships whose role changed.
    pub role_changes: usize,
    /// Associations dropped with departing students.
    pub cascaded: Vec<ArticleId>,
}

impl ReconcileReport {
    fn from_changes(course_id: &CourseId, changes: &RosterChangeSet) -> Self {
        Self {
            course_id: course_id.clone(),
            additions: changes.diff.additions.len(),
            removals: changes.diff.removals.len(),
            role_changes: changes.diff.role_changes.len(),
            cascaded: changes.cascaded_articles.clone(),
        }
    }

    /// Returns `true` if nothing was written.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.additions == 0 && self.removals == 0 && self.role_changes == 0 && self.cascaded.is_empty()
    }

    /// Returns a one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_noop() {
            return "roster unchanged".to_string();
        }
        format!(
            "{} added, {} removed, {} role changes, {} associations dropped",
            self.additions,
            self.removals,
            self.role_changes,
            self.cascaded.len()
        )
    }
}

/// Applies roster snapshots to course memberships.
pub struct EnrollmentReconciler {
    backend: Arc<dyn CourseBackend>,
    ledger: Arc<dyn ActivityLedger>,
    locks: Arc<CourseLocks>,
}

impl EnrollmentReconciler {
    /// Creates a reconciler with private locks.
    #[must_use]
    pub fn new(backend: Arc<dyn CourseBackend>, ledger: Arc<dyn ActivityLedger>) -> Self {
        Self {
            backend,
            ledger,
            locks: Arc::new(CourseLocks::new()),
        }
    }

    /// Shares a lock registry with other services.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<CourseLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Computes the changes a snapshot would make, without writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown course, or a storage error.
    pub fn plan(&self, course_id: &CourseId, snapshot: &RosterSnapshot) -> Result<RosterChangeSet> {
        let course = self.require_course(course_id)?;
        self.plan_for(&course, snapshot)
    }

    /// Reconciles a course against a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown course, or a storage error.
    /// On error nothing is written.
    #[instrument(
        name = "cohortcache.enrollment.reconcile",
        skip_all,
        fields(course_id = %course_id, listed = snapshot.len())
    )]
    pub fn reconcile(
        &self,
        course_id: &CourseId,
        snapshot: &RosterSnapshot,
    ) -> Result<ReconcileReport> {
        let start = Instant::now();
        let result: Result<ReconcileReport> = self.locks.with_lock(course_id, || {
            let course = self.require_course(course_id)?;
            let changes = self.plan_for(&course, snapshot)?;
            if !changes.is_empty() {
                self.backend.apply_roster(course_id, &changes)?;
            }
            Ok(ReconcileReport::from_changes(course_id, &changes))
        });

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("cohortcache_reconcile_total", "status" => status).increment(1);
        metrics::histogram!("cohortcache_reconcile_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(report) => {
                metrics::counter!("cohortcache_reconcile_cascaded_total")
                    .increment(u64::try_from(report.cascaded.len()).unwrap_or(u64::MAX));
                tracing::info!(
                    additions = report.additions,
                    removals = report.removals,
                    role_changes = report.role_changes,
                    cascaded = report.cascaded.len(),
                    "Reconciled roster"
                );
            },
            Err(e) => tracing::warn!(error = %e, "Roster reconciliation failed"),
        }
        result
    }

    /// Fetches a snapshot from `source` and reconciles against it.
    ///
    /// # Errors
    ///
    /// Returns the fetch or parse error before anything is written, or any
    /// error from [`Self::reconcile`].
    pub fn reconcile_from(
        &self,
        source: &dyn RosterSource,
        course_id: &CourseId,
    ) -> Result<ReconcileReport> {
        let course = self.require_course(course_id)?;
        let snapshot = source.fetch(&course)?;
        self.reconcile(course_id, &snapshot)
    }

    fn require_course(&self, course_id: &CourseId) -> Result<Course> {
        self.backend
            .get_course(course_id)?
            .ok_or_else(|| Error::course_not_found(course_id))
    }

    fn plan_for(&self, course: &Course, snapshot: &RosterSnapshot) -> Result<RosterChangeSet> {
        let memberships = self.backend.list_memberships(&course.id)?;
        let diff = plan_roster(&memberships, snapshot);

        let cascaded_articles = if diff.departing_students().is_empty() {
            Vec::new()
        } else {
            let associations = self.backend.list_associations(&course.id)?;
            let contributors = self.contributors(course, &memberships, &associations)?;
            plan_cascade(&diff, &associations, &contributors)
        };

        Ok(RosterChangeSet {
            diff,
            cascaded_articles,
        })
    }

    /// Students (as of now) who edited each associated article in the window.
    fn contributors(
        &self,
        course: &Course,
        memberships: &[Membership],
        associations: &[ArticleAssociation],
    ) -> Result<Contributors> {
        let students: BTreeMap<&ParticipantId, &str> = memberships
            .iter()
            .filter(|m| m.role == Role::Student)
            .map(|m| (&m.participant_id, m.username.as_str()))
            .collect();
        let ids: Vec<ArticleId> = associations.iter().map(|a| a.article.id.clone()).collect();

        let mut contributors = Contributors::new();
        for revision in self.ledger.revisions_for_articles(&ids)? {
            let Some(username) = revision
                .participant_id
                .as_ref()
                .and_then(|id| students.get(id))
            else {
                continue;
            };
            if course.window_contains_timestamp(revision.record.timestamp) {
                contributors
                    .entry(revision.record.article.clone())
                    .or_default()
                    .insert((*username).to_string());
            }
        }
        Ok(contributors)
    }
}
