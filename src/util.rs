//! Process-wide id allocation.
//!
//! The original implementation used object pointer addresses as identity.
//! A counter gives the same properties (stable, comparable, non-zero)
//! without reaching for `unsafe` pointer tricks, and a thread-local
//! counter sidesteps the nightly-only `thread_id_value` feature for
//! getting a numeric thread id on stable Rust.

use crate::types::{ObjectId, ThreadId};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_OBJECT_ID: AtomicUsize = AtomicUsize::new(1);
static NEXT_THREAD_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static THIS_THREAD_ID: Cell<ThreadId> = const { Cell::new(0) };
}

/// Allocate a fresh, non-zero object id.
pub(crate) fn next_object_id() -> ObjectId {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// The calling thread's stable id, assigned on first use.
pub(crate) fn current_thread_id() -> ThreadId {
    THIS_THREAD_ID.with(|cell| {
        let existing = cell.get();
        if existing != 0 {
            return existing;
        }
        let assigned = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        cell.set(assigned);
        assigned
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_unique_and_nonzero() {
        let a = next_object_id();
        let b = next_object_id();
        assert_ne!(a, b);
        assert_ne!(a, 0);
        assert_ne!(b, 0);
    }

    #[test]
    fn thread_id_is_stable_within_a_thread() {
        let first = current_thread_id();
        let second = current_thread_id();
        assert_eq!(first, second);
    }

    #[test]
    fn threads_get_distinct_ids() {
        let main_id = current_thread_id();
        let spawned = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(main_id, spawned);
    }
}
