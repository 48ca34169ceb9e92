//! Table definitions.
//!
//! Dates are stored as `YYYY-MM-DD` text and instants as Unix seconds.
//! Counters are non-negative and stored as `INTEGER`.

/// DDL applied on every open. Idempotent.
pub const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS courses (
        id TEXT PRIMARY KEY,
        slug TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        timeline_start TEXT NOT NULL,
        timeline_end TEXT NOT NULL,
        variant TEXT NOT NULL,
        passcode TEXT,
        user_count INTEGER NOT NULL DEFAULT 0,
        article_count INTEGER NOT NULL DEFAULT 0,
        new_article_count INTEGER NOT NULL DEFAULT 0,
        revision_count INTEGER NOT NULL DEFAULT 0,
        character_sum INTEGER NOT NULL DEFAULT 0,
        view_sum INTEGER NOT NULL DEFAULT 0,
        trained_count INTEGER NOT NULL DEFAULT 0,
        recompute_anomalies INTEGER NOT NULL DEFAULT 0,
        cache_updated_at INTEGER
    );

    CREATE TABLE IF NOT EXISTS cohorts (
        id TEXT PRIMARY KEY,
        slug TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS cohort_courses (
        cohort_id TEXT NOT NULL,
        course_id TEXT NOT NULL,
        PRIMARY KEY (cohort_id, course_id),
        FOREIGN KEY (cohort_id) REFERENCES cohorts(id) ON DELETE CASCADE,
        FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS participants (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        trained INTEGER NOT NULL DEFAULT 0
    );

    -- One row per (course, participant, role); a participant may hold
    -- several roles in the same course.
    CREATE TABLE IF NOT EXISTS memberships (
        course_id TEXT NOT NULL,
        participant_id TEXT NOT NULL,
        role TEXT NOT NULL,
        assigned_article_title TEXT,
        PRIMARY KEY (course_id, participant_id, role),
        FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
        FOREIGN KEY (participant_id) REFERENCES participants(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_memberships_participant ON memberships(participant_id, role);

    CREATE TABLE IF NOT EXISTS articles (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        namespace INTEGER NOT NULL DEFAULT 0,
        deleted INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS article_associations (
        course_id TEXT NOT NULL,
        article_id TEXT NOT NULL,
        character_sum INTEGER NOT NULL DEFAULT 0,
        view_sum INTEGER NOT NULL DEFAULT 0,
        revision_count INTEGER NOT NULL DEFAULT 0,
        new_article INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (course_id, article_id),
        FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
        FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE
    );

    -- Raw ledger. Authors are usernames, resolved at read time.
    CREATE TABLE IF NOT EXISTS revisions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        article_id TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        byte_delta INTEGER NOT NULL,
        views INTEGER NOT NULL DEFAULT 0,
        is_new_article INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_revisions_article ON revisions(article_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_revisions_username ON revisions(username, timestamp);

    CREATE TABLE IF NOT EXISTS training_modules (
        id TEXT PRIMARY KEY,
        slug TEXT NOT NULL,
        name TEXT NOT NULL
    );

    -- training_modules holds a JSON array of module ids.
    CREATE TABLE IF NOT EXISTS timeline_blocks (
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        week_index INTEGER NOT NULL,
        due_date TEXT,
        training_modules TEXT NOT NULL DEFAULT '[]',
        FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_timeline_blocks_course ON timeline_blocks(course_id, week_index);

    CREATE TABLE IF NOT EXISTS training_completions (
        participant_id TEXT NOT NULL,
        module_id TEXT NOT NULL,
        completed_at INTEGER,
        PRIMARY KEY (participant_id, module_id)
    );
";

/// Columns selected for a [`crate::models::Course`], in the order
/// [`super::rows::course_from_row`] reads them.
pub const COURSE_COLUMNS: &str = "id, slug, title, start_date, end_date, timeline_start, \
     timeline_end, variant, passcode, user_count, article_count, new_article_count, \
     revision_count, character_sum, view_sum, trained_count, recompute_anomalies, \
     cache_updated_at";
