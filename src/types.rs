//! Core identifiers and result codes shared across the lock subsystem.

use std::time::{Duration, Instant};

/// Stable, process-unique identifier for a lockable object.
///
/// Assigned by a monotonically increasing counter starting at 1; 0 is
/// reserved and always treated as "no object".
pub type ObjectId = usize;

/// Stable, process-unique identifier for a thread, assigned lazily on
/// first use by that thread.
pub type ThreadId = usize;

/// How long `LockObject::wait` blocks on its condition variable before
/// reporting that the lock could not be acquired.
pub const LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(1000);

/// The two modes a lock-object can be held in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Read,
    Write,
}

/// Outcome of checking whether a lock-object can be acquired right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AcquireResult {
    /// The lock is free, or the requester already qualifies (recursive
    /// write, or a reader joining an existing read-lock).
    Available,
    /// The requester must wait or be told the object is busy.
    Cannot,
    /// The requester is the sole reader and asked for Write: drop the
    /// read-lock and re-register as a write-lock.
    NeedToConvert,
}

/// Result reported by an [`crate::wrapper::AccessWrapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperStatus {
    /// The wrapper owns a live lock on the object.
    Success,
    /// The lock could not be acquired before the timeout.
    Busy,
    /// The requested object does not exist, or the id was invalid.
    DataAbsent,
}

/// Result of enrolling a deferred operation on an object's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOperationResult {
    /// The closure was enqueued and will run once the lock is released.
    Added,
    /// The lock freed up before the closure could be scheduled; retry
    /// acquisition immediately instead of waiting on a deferred run.
    LockAvailable,
    /// Scheduling failed for an internal reason; the closure was dropped.
    Failed,
}

/// Per-thread bookkeeping for one lock-object: when this thread first
/// took the lock, and how many times it has recursively acquired it.
pub(crate) struct OwnerRecord {
    pub first_acquired: Instant,
    pub count: usize,
}
