//! `SQLite` storage backend.
//!
//! A single [`SqliteCourseBackend`] serves both the course store and the
//! activity ledger. The connection sits behind a mutex; multi-row writes
//! run inside one transaction.

mod backend;
mod connection;
mod metrics;
mod rows;
mod schema;

pub use backend::SqliteCourseBackend;
pub use connection::{acquire_lock, configure_connection};
pub use metrics::record_operation_metrics;
