//! `SQLite` implementation of [`CourseBackend`] and [`ActivityLedger`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use tracing::instrument;

use super::connection::{acquire_lock, configure_connection, storage_error};
use super::metrics::{record_operation_metrics, status_of};
use super::rows::{
    article_cache_from_row, article_from_row, count_from_db, count_to_db, course_from_row, date_from_db,
    date_to_db, membership_from_row, timestamp_from_db, timestamp_to_db,
};
use super::schema::{COURSE_COLUMNS, SCHEMA};
use crate::models::{
    ActivityRecord, Article, ArticleAssociation, ArticleId, BlockId, Cohort, CohortId, Course,
    CourseId, Membership, ModuleId, Participant, ParticipantId, RosterChangeSet, TimelineBlock,
    TrainingCompletion, TrainingModule,
};
use crate::storage::traits::{ActivityLedger, CacheWrite, CourseBackend, LedgerRevision};
use crate::{Error, Result};

/// Upper bound on bound parameters per `IN (...)` query.
const MAX_IN_PARAMS: usize = 500;

/// SQLite-based course storage and activity ledger.
pub struct SqliteCourseBackend {
    /// Database connection (mutex for interior mutability).
    conn: Mutex<Connection>,
}

impl SqliteCourseBackend {
    /// Opens (or creates) a database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_database_dir".to_string(),
                cause: e.to_string(),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| storage_error("open_database", &e))?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| storage_error("open_database_memory", &e))?;
        Self::from_connection(conn)
    }

    /// Returns the default database location, `<data dir>/cohortcache/cohortcache.db`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|d| {
            d.data_local_dir()
                .join("cohortcache")
                .join("cohortcache.db")
        })
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure_connection(&conn)?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| storage_error("initialize_schema", &e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_courses(
        conn: &Connection,
        sql: &str,
        args: impl rusqlite::Params,
        operation: &str,
    ) -> Result<Vec<Course>> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| storage_error(operation, &e))?;
        stmt.query_map(args, course_from_row)
            .map_err(|e| storage_error(operation, &e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| storage_error(operation, &e))
    }

    fn query_course(
        conn: &Connection,
        sql: &str,
        args: impl rusqlite::Params,
        operation: &str,
    ) -> Result<Option<Course>> {
        conn.query_row(sql, args, course_from_row)
            .optional()
            .map_err(|e| storage_error(operation, &e))
    }

    /// Reads ledger rows whose `column` is one of `keys`, oldest first.
    fn query_revisions<'k>(
        conn: &Connection,
        column: &str,
        keys: impl Iterator<Item = &'k str>,
    ) -> Result<Vec<LedgerRevision>> {
        let keys: Vec<&str> = keys.collect();
        let mut sequenced = Vec::new();
        for chunk in keys.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT r.seq, r.username, r.article_id, r.timestamp, r.byte_delta, r.views,
                        r.is_new_article, p.id
                 FROM revisions r LEFT JOIN participants p ON p.username = r.username
                 WHERE {column} IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| storage_error("prepare_query_revisions", &e))?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter().copied()), |row| {
                    let seq: i64 = row.get(0)?;
                    let record = ActivityRecord {
                        participant: row.get(1)?,
                        article: ArticleId::new(row.get::<_, String>(2)?),
                        timestamp: timestamp_from_db(3, row.get(3)?)?,
                        byte_delta: row.get(4)?,
                        views: row.get::<_, i64>(5).map(count_from_db)?,
                        is_new_article: row.get(6)?,
                        article_title: None,
                        article_namespace: None,
                    };
                    let participant_id = row.get::<_, Option<String>>(7)?.map(ParticipantId::new);
                    Ok((seq, LedgerRevision {
                        record,
                        participant_id,
                    }))
                })
                .map_err(|e| storage_error("query_revisions", &e))?;
            for row in rows {
                sequenced.push(row.map_err(|e| storage_error("query_revisions", &e))?);
            }
        }
        sequenced.sort_by(|(seq_a, a), (seq_b, b)| {
            a.record
                .timestamp
                .cmp(&b.record.timestamp)
                .then(seq_a.cmp(seq_b))
        });
        Ok(sequenced.into_iter().map(|(_, revision)| revision).collect())
    }

    /// Inserts or refreshes a participant and returns its stored form.
    fn upsert_participant_in(
        conn: &Connection,
        username: &str,
        display_name: &str,
    ) -> Result<Participant> {
        let display_name = if display_name.trim().is_empty() {
            username
        } else {
            display_name
        };
        conn.execute(
            "INSERT INTO participants (id, username, display_name, trained)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT(username) DO UPDATE SET display_name = excluded.display_name",
            params![ParticipantId::generate().as_str(), username, display_name],
        )
        .map_err(|e| storage_error("upsert_participant", &e))?;

        conn.query_row(
            "SELECT id, username, display_name, trained FROM participants WHERE username = ?1",
            params![username],
            participant_from_row,
        )
        .map_err(|e| storage_error("get_participant", &e))
    }

    fn apply_roster_in(
        tx: &Transaction<'_>,
        course_id: &CourseId,
        changes: &RosterChangeSet,
    ) -> Result<()> {
        let diff = &changes.diff;

        for removal in &diff.removals {
            let deleted = tx
                .execute(
                    "DELETE FROM memberships
                     WHERE course_id = ?1 AND participant_id = ?2 AND role = ?3",
                    params![
                        course_id.as_str(),
                        removal.participant_id.as_str(),
                        removal.role.as_str()
                    ],
                )
                .map_err(|e| storage_error("remove_membership", &e))?;
            if deleted == 0 {
                return Err(stale_plan(&removal.username, "removal"));
            }
        }

        for change in &diff.role_changes {
            let updated = tx
                .execute(
                    "UPDATE memberships SET role = ?4
                     WHERE course_id = ?1 AND participant_id = ?2 AND role = ?3",
                    params![
                        course_id.as_str(),
                        change.participant_id.as_str(),
                        change.from.as_str(),
                        change.to.as_str()
                    ],
                )
                .map_err(|e| storage_error("change_membership_role", &e))?;
            if updated == 0 {
                return Err(stale_plan(&change.username, "role change"));
            }
        }

        for addition in &diff.additions {
            let participant =
                Self::upsert_participant_in(tx, &addition.username, &addition.display_name)?;
            tx.execute(
                "INSERT INTO memberships (course_id, participant_id, role)
                 VALUES (?1, ?2, ?3)",
                params![
                    course_id.as_str(),
                    participant.id.as_str(),
                    addition.role.as_str()
                ],
            )
            .map_err(|e| storage_error("add_membership", &e))?;
        }

        for article_id in &changes.cascaded_articles {
            tx.execute(
                "DELETE FROM article_associations WHERE course_id = ?1 AND article_id = ?2",
                params![course_id.as_str(), article_id.as_str()],
            )
            .map_err(|e| storage_error("cascade_article_association", &e))?;
        }

        Ok(())
    }

    fn write_cache_in(tx: &Transaction<'_>, course_id: &CourseId, write: &CacheWrite) -> Result<()> {
        let cache = &write.cache;
        let updated = tx
            .execute(
                "UPDATE courses SET
                    user_count = ?2, article_count = ?3, new_article_count = ?4,
                    revision_count = ?5, character_sum = ?6, view_sum = ?7,
                    trained_count = ?8, recompute_anomalies = ?9, cache_updated_at = ?10
                 WHERE id = ?1",
                params![
                    course_id.as_str(),
                    count_to_db(cache.user_count),
                    count_to_db(cache.article_count),
                    count_to_db(cache.new_article_count),
                    count_to_db(cache.revision_count),
                    count_to_db(cache.character_sum),
                    count_to_db(cache.view_sum),
                    count_to_db(cache.trained_count),
                    count_to_db(write.anomalies),
                    timestamp_to_db(write.computed_at),
                ],
            )
            .map_err(|e| storage_error("write_course_cache", &e))?;
        if updated == 0 {
            return Err(Error::course_not_found(course_id));
        }

        for article_id in &write.new_associations {
            tx.execute(
                "INSERT INTO article_associations (course_id, article_id) VALUES (?1, ?2)
                 ON CONFLICT DO NOTHING",
                params![course_id.as_str(), article_id.as_str()],
            )
            .map_err(|e| storage_error("derive_article_association", &e))?;
        }

        let mut stmt = tx
            .prepare(
                "UPDATE article_associations SET
                    character_sum = ?3, view_sum = ?4, revision_count = ?5, new_article = ?6
                 WHERE course_id = ?1 AND article_id = ?2",
            )
            .map_err(|e| storage_error("prepare_write_article_cache", &e))?;
        for (article_id, article_cache) in &write.articles {
            stmt.execute(params![
                course_id.as_str(),
                article_id.as_str(),
                count_to_db(article_cache.character_sum),
                count_to_db(article_cache.view_sum),
                count_to_db(article_cache.revision_count),
                article_cache.new_article,
            ])
            .map_err(|e| storage_error("write_article_cache", &e))?;
        }
        Ok(())
    }
}

fn stale_plan(username: &str, what: &str) -> Error {
    Error::OperationFailed {
        operation: "apply_roster".to_string(),
        cause: format!("stale roster plan: {what} for '{username}' matched no membership"),
    }
}

fn participant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: ParticipantId::new(row.get::<_, String>(0)?),
        username: row.get(1)?,
        display_name: row.get(2)?,
        trained: row.get(3)?,
    })
}

/// Builds `?1, ?2, ..., ?n`.
fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn unique_violation(e: &rusqlite::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

impl CourseBackend for SqliteCourseBackend {
    #[instrument(name = "cohortcache.storage.insert_course", skip(self, course), fields(slug = %course.slug))]
    fn insert_course(&self, course: &Course) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO courses (id, slug, title, start_date, end_date, timeline_start,
                timeline_end, variant, passcode)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                course.id.as_str(),
                course.slug,
                course.title,
                date_to_db(course.start),
                date_to_db(course.end),
                date_to_db(course.timeline_start),
                date_to_db(course.timeline_end),
                course.variant.as_str(),
                course.passcode,
            ],
        )
        .map_err(|e| {
            if unique_violation(&e) {
                Error::Validation(format!("course slug '{}' is already taken", course.slug))
            } else {
                storage_error("insert_course", &e)
            }
        })?;
        Ok(())
    }

    fn update_course(&self, course: &Course) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let updated = conn
            .execute(
                "UPDATE courses SET slug = ?2, title = ?3, start_date = ?4, end_date = ?5,
                    timeline_start = ?6, timeline_end = ?7, variant = ?8, passcode = ?9
                 WHERE id = ?1",
                params![
                    course.id.as_str(),
                    course.slug,
                    course.title,
                    date_to_db(course.start),
                    date_to_db(course.end),
                    date_to_db(course.timeline_start),
                    date_to_db(course.timeline_end),
                    course.variant.as_str(),
                    course.passcode,
                ],
            )
            .map_err(|e| {
                if unique_violation(&e) {
                    Error::Validation(format!("course slug '{}' is already taken", course.slug))
                } else {
                    storage_error("update_course", &e)
                }
            })?;
        Ok(updated > 0)
    }

    fn get_course(&self, id: &CourseId) -> Result<Option<Course>> {
        let conn = acquire_lock(&self.conn);
        Self::query_course(
            &conn,
            &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"),
            params![id.as_str()],
            "get_course",
        )
    }

    fn get_course_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        let conn = acquire_lock(&self.conn);
        Self::query_course(
            &conn,
            &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE slug = ?1"),
            params![slug],
            "get_course_by_slug",
        )
    }

    fn list_courses(&self) -> Result<Vec<Course>> {
        let conn = acquire_lock(&self.conn);
        Self::query_courses(
            &conn,
            &format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY slug"),
            [],
            "list_courses",
        )
    }

    #[instrument(
        name = "cohortcache.storage.write_cache",
        skip(self, write),
        fields(course_id = %course_id, articles = write.articles.len())
    )]
    fn write_cache(&self, course_id: &CourseId, write: &CacheWrite) -> Result<()> {
        let start = Instant::now();
        let mut conn = acquire_lock(&self.conn);
        let result = conn
            .transaction()
            .map_err(|e| storage_error("begin_write_cache", &e))
            .and_then(|tx| {
                Self::write_cache_in(&tx, course_id, write)?;
                tx.commit().map_err(|e| storage_error("commit_write_cache", &e))
            });
        record_operation_metrics("sqlite", "write_cache", start, status_of(&result));
        result
    }

    fn insert_cohort(&self, cohort: &Cohort) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO cohorts (id, slug, title) VALUES (?1, ?2, ?3)",
            params![cohort.id.as_str(), cohort.slug, cohort.title],
        )
        .map_err(|e| {
            if unique_violation(&e) {
                Error::Validation(format!("cohort slug '{}' is already taken", cohort.slug))
            } else {
                storage_error("insert_cohort", &e)
            }
        })?;
        Ok(())
    }

    fn get_cohort_by_slug(&self, slug: &str) -> Result<Option<Cohort>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT id, slug, title FROM cohorts WHERE slug = ?1",
            params![slug],
            |row| {
                Ok(Cohort {
                    id: CohortId::new(row.get::<_, String>(0)?),
                    slug: row.get(1)?,
                    title: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| storage_error("get_cohort_by_slug", &e))
    }

    fn add_course_to_cohort(&self, cohort_id: &CohortId, course_id: &CourseId) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO cohort_courses (cohort_id, course_id) VALUES (?1, ?2)
             ON CONFLICT DO NOTHING",
            params![cohort_id.as_str(), course_id.as_str()],
        )
        .map_err(|e| storage_error("add_course_to_cohort", &e))?;
        Ok(())
    }

    fn courses_in_cohort(&self, cohort_id: &CohortId) -> Result<Vec<Course>> {
        let conn = acquire_lock(&self.conn);
        Self::query_courses(
            &conn,
            &format!(
                "SELECT {COURSE_COLUMNS} FROM courses
                 WHERE id IN (SELECT course_id FROM cohort_courses WHERE cohort_id = ?1)
                 ORDER BY slug"
            ),
            params![cohort_id.as_str()],
            "courses_in_cohort",
        )
    }

    fn get_participant_by_username(&self, username: &str) -> Result<Option<Participant>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT id, username, display_name, trained FROM participants WHERE username = ?1",
            params![username],
            participant_from_row,
        )
        .optional()
        .map_err(|e| storage_error("get_participant_by_username", &e))
    }

    fn upsert_participant(&self, username: &str, display_name: &str) -> Result<Participant> {
        let conn = acquire_lock(&self.conn);
        Self::upsert_participant_in(&conn, username, display_name)
    }

    fn set_legacy_trained(&self, participant_id: &ParticipantId, trained: bool) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let updated = conn
            .execute(
                "UPDATE participants SET trained = ?2 WHERE id = ?1",
                params![participant_id.as_str(), trained],
            )
            .map_err(|e| storage_error("set_legacy_trained", &e))?;
        Ok(updated > 0)
    }

    fn get_participants(&self, ids: &[ParticipantId]) -> Result<Vec<Participant>> {
        let conn = acquire_lock(&self.conn);
        let mut participants = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT id, username, display_name, trained FROM participants
                 WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| storage_error("prepare_get_participants", &e))?;
            let rows = stmt
                .query_map(
                    params_from_iter(chunk.iter().map(ParticipantId::as_str)),
                    participant_from_row,
                )
                .map_err(|e| storage_error("get_participants", &e))?;
            for row in rows {
                participants.push(row.map_err(|e| storage_error("get_participants", &e))?);
            }
        }
        participants.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(participants)
    }

    fn list_memberships(&self, course_id: &CourseId) -> Result<Vec<Membership>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT m.course_id, m.participant_id, p.username, m.role, m.assigned_article_title
                 FROM memberships m JOIN participants p ON p.id = m.participant_id
                 WHERE m.course_id = ?1
                 ORDER BY p.username, m.role",
            )
            .map_err(|e| storage_error("prepare_list_memberships", &e))?;
        stmt.query_map(params![course_id.as_str()], membership_from_row)
            .map_err(|e| storage_error("list_memberships", &e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| storage_error("collect_memberships", &e))
    }

    fn courses_for_student(&self, participant_id: &ParticipantId) -> Result<Vec<Course>> {
        let conn = acquire_lock(&self.conn);
        Self::query_courses(
            &conn,
            &format!(
                "SELECT {COURSE_COLUMNS} FROM courses
                 WHERE id IN (SELECT course_id FROM memberships
                              WHERE participant_id = ?1 AND role = 'student')
                 ORDER BY slug"
            ),
            params![participant_id.as_str()],
            "courses_for_student",
        )
    }

    #[instrument(
        name = "cohortcache.storage.apply_roster",
        skip(self, changes),
        fields(
            course_id = %course_id,
            additions = changes.diff.additions.len(),
            removals = changes.diff.removals.len(),
            role_changes = changes.diff.role_changes.len(),
            cascaded = changes.cascaded_articles.len()
        )
    )]
    fn apply_roster(&self, course_id: &CourseId, changes: &RosterChangeSet) -> Result<()> {
        let start = Instant::now();
        let mut conn = acquire_lock(&self.conn);
        let result = conn
            .transaction()
            .map_err(|e| storage_error("begin_apply_roster", &e))
            .and_then(|tx| {
                Self::apply_roster_in(&tx, course_id, changes)?;
                tx.commit().map_err(|e| storage_error("commit_apply_roster", &e))
            });
        record_operation_metrics("sqlite", "apply_roster", start, status_of(&result));
        result
    }

    fn upsert_article(&self, article: &Article) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO articles (id, title, namespace, deleted) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title, namespace = excluded.namespace, deleted = excluded.deleted",
            params![
                article.id.as_str(),
                article.title,
                article.namespace,
                article.deleted
            ],
        )
        .map_err(|e| storage_error("upsert_article", &e))?;
        Ok(())
    }

    fn get_article(&self, id: &ArticleId) -> Result<Option<Article>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT id, title, namespace, deleted FROM articles WHERE id = ?1",
            params![id.as_str()],
            |row| article_from_row(row, 0),
        )
        .optional()
        .map_err(|e| storage_error("get_article", &e))
    }

    fn list_associations(&self, course_id: &CourseId) -> Result<Vec<ArticleAssociation>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT a.id, a.title, a.namespace, a.deleted,
                        aa.character_sum, aa.view_sum, aa.revision_count, aa.new_article
                 FROM article_associations aa JOIN articles a ON a.id = aa.article_id
                 WHERE aa.course_id = ?1
                 ORDER BY a.title, a.id",
            )
            .map_err(|e| storage_error("prepare_list_associations", &e))?;
        stmt.query_map(params![course_id.as_str()], |row| {
            Ok(ArticleAssociation {
                course_id: course_id.clone(),
                article: article_from_row(row, 0)?,
                cache: article_cache_from_row(row, 4)?,
            })
        })
        .map_err(|e| storage_error("list_associations", &e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| storage_error("collect_associations", &e))
    }

    fn ensure_association(&self, course_id: &CourseId, article_id: &ArticleId) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let inserted = conn
            .execute(
                "INSERT INTO article_associations (course_id, article_id) VALUES (?1, ?2)
                 ON CONFLICT DO NOTHING",
                params![course_id.as_str(), article_id.as_str()],
            )
            .map_err(|e| storage_error("ensure_association", &e))?;
        Ok(inserted > 0)
    }

    fn append_activity(&self, record: &ActivityRecord) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO revisions (username, article_id, timestamp, byte_delta, views, is_new_article)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.participant,
                record.article.as_str(),
                timestamp_to_db(record.timestamp),
                record.byte_delta,
                count_to_db(record.views),
                record.is_new_article,
            ],
        )
        .map_err(|e| storage_error("append_activity", &e))?;
        Ok(())
    }

    fn insert_timeline_block(&self, block: &TimelineBlock) -> Result<()> {
        let modules = serde_json::to_string(&block.training_modules).map_err(|e| {
            Error::OperationFailed {
                operation: "encode_block_modules".to_string(),
                cause: e.to_string(),
            }
        })?;
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO timeline_blocks (id, course_id, week_index, due_date, training_modules)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                block.id.as_str(),
                block.course_id.as_str(),
                block.week_index,
                block.due_date.map(date_to_db),
                modules,
            ],
        )
        .map_err(|e| storage_error("insert_timeline_block", &e))?;
        Ok(())
    }

    fn list_timeline_blocks(&self, course_id: &CourseId) -> Result<Vec<TimelineBlock>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, course_id, week_index, due_date, training_modules
                 FROM timeline_blocks WHERE course_id = ?1
                 ORDER BY week_index, id",
            )
            .map_err(|e| storage_error("prepare_list_timeline_blocks", &e))?;
        stmt.query_map(params![course_id.as_str()], |row| {
            let due_date = row
                .get::<_, Option<String>>(3)?
                .map(|raw| date_from_db(3, &raw))
                .transpose()?;
            let raw_modules: String = row.get(4)?;
            let training_modules: Vec<ModuleId> =
                serde_json::from_str(&raw_modules).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        4,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
            Ok(TimelineBlock {
                id: BlockId::new(row.get::<_, String>(0)?),
                course_id: CourseId::new(row.get::<_, String>(1)?),
                week_index: row.get(2)?,
                due_date,
                training_modules,
            })
        })
        .map_err(|e| storage_error("list_timeline_blocks", &e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| storage_error("collect_timeline_blocks", &e))
    }

    fn upsert_training_module(&self, module: &TrainingModule) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO training_modules (id, slug, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET slug = excluded.slug, name = excluded.name",
            params![module.id.as_str(), module.slug, module.name],
        )
        .map_err(|e| storage_error("upsert_training_module", &e))?;
        Ok(())
    }

    fn record_training_completion(&self, completion: &TrainingCompletion) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO training_completions (participant_id, module_id, completed_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(participant_id, module_id) DO UPDATE SET completed_at = excluded.completed_at",
            params![
                completion.participant_id.as_str(),
                completion.module_id.as_str(),
                completion.completed_at.map(timestamp_to_db),
            ],
        )
        .map_err(|e| storage_error("record_training_completion", &e))?;
        Ok(())
    }
}

impl ActivityLedger for SqliteCourseBackend {
    fn revisions_for_articles(&self, articles: &[ArticleId]) -> Result<Vec<LedgerRevision>> {
        let conn = acquire_lock(&self.conn);
        Self::query_revisions(&conn, "r.article_id", articles.iter().map(ArticleId::as_str))
    }

    fn revisions_by_authors(&self, usernames: &[String]) -> Result<Vec<LedgerRevision>> {
        let conn = acquire_lock(&self.conn);
        Self::query_revisions(&conn, "r.username", usernames.iter().map(String::as_str))
    }

    fn training_completions(
        &self,
        participants: &[ParticipantId],
    ) -> Result<Vec<TrainingCompletion>> {
        let conn = acquire_lock(&self.conn);
        let mut completions = Vec::new();
        for chunk in participants.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT participant_id, module_id, completed_at FROM training_completions
                 WHERE participant_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| storage_error("prepare_training_completions", &e))?;
            let rows = stmt
                .query_map(
                    params_from_iter(chunk.iter().map(ParticipantId::as_str)),
                    |row| {
                        let completed_at = row
                            .get::<_, Option<i64>>(2)?
                            .map(|secs| timestamp_from_db(2, secs))
                            .transpose()?;
                        Ok(TrainingCompletion {
                            participant_id: ParticipantId::new(row.get::<_, String>(0)?),
                            module_id: ModuleId::new(row.get::<_, String>(1)?),
                            completed_at,
                        })
                    },
                )
                .map_err(|e| storage_error("training_completions", &e))?;
            for row in rows {
                completions.push(row.map_err(|e| storage_error("training_completions", &e))?);
            }
        }
        Ok(completions)
    }
}
