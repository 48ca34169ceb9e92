//! Conversions between rows and models.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

use crate::models::{
    Article, ArticleCache, ArticleId, Course, CourseCache, CourseId, CourseVariant, Membership,
    ParticipantId, Role,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn conversion_error(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, message.into())
}

pub fn date_to_db(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn date_from_db(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| conversion_error(idx, Type::Text, format!("bad date '{raw}': {e}")))
}

pub fn timestamp_to_db(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

pub fn timestamp_from_db(idx: usize, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| conversion_error(idx, Type::Integer, format!("bad timestamp {secs}")))
}

/// Counters never exceed `i64::MAX` in practice; saturate rather than wrap.
pub fn count_to_db(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

pub fn count_from_db(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}

/// Reads an unsigned counter column.
fn count(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    row.get::<_, i64>(idx).map(count_from_db)
}

/// An unknown stored tag is corruption, never silently coerced.
pub fn variant_from_db(idx: usize, raw: &str) -> rusqlite::Result<CourseVariant> {
    CourseVariant::parse(raw)
        .ok_or_else(|| conversion_error(idx, Type::Text, format!("unknown course variant '{raw}'")))
}

pub fn role_from_db(idx: usize, raw: &str) -> rusqlite::Result<Role> {
    Role::parse(raw)
        .ok_or_else(|| conversion_error(idx, Type::Text, format!("unknown role '{raw}'")))
}

/// Reads a row selected with [`super::schema::COURSE_COLUMNS`].
pub fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    let date = |idx: usize| -> rusqlite::Result<NaiveDate> {
        date_from_db(idx, &row.get::<_, String>(idx)?)
    };
    let cache_updated_at = row
        .get::<_, Option<i64>>(17)?
        .map(|secs| timestamp_from_db(17, secs))
        .transpose()?;

    Ok(Course {
        id: CourseId::new(row.get::<_, String>(0)?),
        slug: row.get(1)?,
        title: row.get(2)?,
        start: date(3)?,
        end: date(4)?,
        timeline_start: date(5)?,
        timeline_end: date(6)?,
        variant: variant_from_db(7, &row.get::<_, String>(7)?)?,
        passcode: row.get(8)?,
        cache: CourseCache {
            user_count: count(row, 9)?,
            article_count: count(row, 10)?,
            new_article_count: count(row, 11)?,
            revision_count: count(row, 12)?,
            character_sum: count(row, 13)?,
            view_sum: count(row, 14)?,
            trained_count: count(row, 15)?,
        },
        recompute_anomalies: count(row, 16)?,
        cache_updated_at,
    })
}

/// Reads `course_id, participant_id, username, role, assigned_article_title`.
pub fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<Membership> {
    Ok(Membership {
        course_id: CourseId::new(row.get::<_, String>(0)?),
        participant_id: ParticipantId::new(row.get::<_, String>(1)?),
        username: row.get(2)?,
        role: role_from_db(3, &row.get::<_, String>(3)?)?,
        assigned_article_title: row.get(4)?,
    })
}

/// Reads `id, title, namespace, deleted` starting at `offset`.
pub fn article_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Article> {
    Ok(Article {
        id: ArticleId::new(row.get::<_, String>(offset)?),
        title: row.get(offset + 1)?,
        namespace: row.get(offset + 2)?,
        deleted: row.get(offset + 3)?,
    })
}

/// Reads `character_sum, view_sum, revision_count, new_article` starting at `offset`.
pub fn article_cache_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<ArticleCache> {
    Ok(ArticleCache {
        character_sum: count(row, offset)?,
        view_sum: count(row, offset + 1)?,
        revision_count: count(row, offset + 2)?,
        new_article: row.get(offset + 3)?,
    })
}
