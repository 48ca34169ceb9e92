//! Storage layer.
//!
//! The authoritative store for courses, memberships, article associations
//! and timelines sits behind [`CourseBackend`]; raw activity is read through
//! [`ActivityLedger`]. `SQLite` is the only backend: both traits are served by
//! the same database so reconciliation and cache writes can share a
//! transaction boundary.

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteCourseBackend;
pub use traits::{ActivityLedger, CacheWrite, CourseBackend, LedgerRevision};
