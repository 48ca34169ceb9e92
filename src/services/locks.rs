//! Per-course critical sections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::CourseId;
use crate::storage::sqlite::acquire_lock;

/// Registry of one mutex per course.
///
/// Reconciliation, recomputation and association creation for a course run
/// under that course's lock, so they never interleave. Different courses do
/// not contend. Share one registry between services with `Arc`.
#[derive(Debug, Default)]
pub struct CourseLocks {
    locks: Mutex<HashMap<CourseId, Arc<Mutex<()>>>>,
}

impl CourseLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for a course, creating it on first use.
    ///
    /// Entries held only by the registry are dropped on each call, so the map
    /// stays as large as the set of courses currently in use.
    #[must_use]
    pub fn lock_for(&self, course_id: &CourseId) -> Arc<Mutex<()>> {
        let mut locks = acquire_lock(&self.locks);
        locks.retain(|id, lock| id == course_id || Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(course_id.clone()).or_default())
    }

    /// Runs `f` while holding the course lock.
    pub fn with_lock<T>(&self, course_id: &CourseId, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(course_id);
        let _guard = acquire_lock(&lock);
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_same_course_shares_lock() {
        let locks = CourseLocks::new();
        let a = locks.lock_for(&CourseId::new("c1"));
        let b = locks.lock_for(&CourseId::new("c1"));
        let other = locks.lock_for(&CourseId::new("c2"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn test_idle_locks_are_pruned() {
        let locks = CourseLocks::new();
        let held = locks.lock_for(&CourseId::new("held"));
        let idle = Arc::downgrade(&locks.lock_for(&CourseId::new("idle")));

        let again = locks.lock_for(&CourseId::new("other"));
        assert!(idle.upgrade().is_none());
        assert!(Arc::ptr_eq(&held, &locks.lock_for(&CourseId::new("held"))));
        drop(again);
    }

    #[test]
    fn test_with_lock_serializes_one_course() {
        let locks = Arc::new(CourseLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_lock(&CourseId::new("c1"), || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked");
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
