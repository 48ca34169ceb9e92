//! Storage backend traits.

mod course;
mod ledger;

pub use course::{CacheWrite, CourseBackend};
pub use ledger::{ActivityLedger, LedgerRevision};
