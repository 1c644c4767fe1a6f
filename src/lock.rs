//! The per-object lock: a `parking_lot` rw-mutex augmented with owner
//! tracking, a bounded condition-variable wait, and the ability to drop
//! and recreate its guard outside of RAII (needed by the tracker during
//! reorder and by deferred-operation drain).

use crate::types::{AcquireResult, LockMode, ObjectId, OwnerRecord, LOCK_ACQUIRE_TIMEOUT};
use crate::util;
use fxhash::FxHashMap;
use parking_lot::lock_api::RawRwLock;
use parking_lot::{Condvar, Mutex, RwLock as PlRwLock};
use std::sync::Arc;
use std::time::Instant;

/// A type-erased handle onto the raw rw-mutex of some `Protected<T>`.
///
/// `LockObject` needs to take and release the underlying lock manually
/// (outside of a RAII guard) without being generic over `T`. Implemented
/// once, below, directly on top of `parking_lot`'s `lock_api` raw-lock
/// surface.
pub trait RawLockHandle: Send + Sync {
    fn id(&self) -> ObjectId;
    fn lock_shared(&self);
    fn lock_exclusive(&self);
    /// # Safety
    /// Caller must currently hold the shared lock taken via `lock_shared`.
    unsafe fn unlock_shared(&self);
    /// # Safety
    /// Caller must currently hold the exclusive lock taken via `lock_exclusive`.
    unsafe fn unlock_exclusive(&self);
}

/// Application data placed under subsystem control. Replaces the
/// original's `ISafeData` base struct with composition: a stable id plus
/// a `parking_lot::RwLock` guarding the value.
pub struct Protected<T> {
    id: ObjectId,
    data: PlRwLock<T>,
}

impl<T> Protected<T> {
    pub fn new(value: T) -> Arc<Self> {
        Arc::new(Protected {
            id: util::next_object_id(),
            data: PlRwLock::new(value),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub(crate) fn data(&self) -> &PlRwLock<T> {
        &self.data
    }
}

impl<T: Send + Sync + 'static> RawLockHandle for Protected<T> {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn lock_shared(&self) {
        // Safety: `raw()` is only ever driven by `LockObject`, which is the
        // sole owner of the lock/unlock discipline for this object.
        unsafe { self.data.raw().lock_shared() }
    }

    fn lock_exclusive(&self) {
        unsafe { self.data.raw().lock_exclusive() }
    }

    unsafe fn unlock_shared(&self) {
        unsafe { self.data.raw().unlock_shared() }
    }

    unsafe fn unlock_exclusive(&self) {
        unsafe { self.data.raw().unlock_exclusive() }
    }
}

/// Shared state behind both lock-object variants.
struct LockCore {
    id: ObjectId,
    handle: Arc<dyn RawLockHandle>,
    /// Whether the real underlying rw-mutex is currently held on this
    /// object's behalf. Doubles as the condvar's mutex.
    guard_held: Mutex<bool>,
    cv: Condvar,
    owners: Mutex<FxHashMap<crate::types::ThreadId, OwnerRecord>>,
}

impl LockCore {
    fn new(id: ObjectId, handle: Arc<dyn RawLockHandle>) -> Self {
        Self {
            id,
            handle,
            guard_held: Mutex::new(false),
            cv: Condvar::new(),
            owners: Mutex::new(FxHashMap::default()),
        }
    }
}

/// One lockable object's state: which rw-mutex it wraps, in which mode,
/// who currently owns it, and whether the real guard is engaged.
///
/// Kept as a tagged enum over a common core (rather than a trait-object
/// hierarchy) since the two variants differ only in their `can_acquire`
/// rule.
pub(crate) enum LockObject {
    Read(LockCore),
    Write(LockCore),
}

impl LockObject {
    pub fn new(mode: LockMode, handle: Arc<dyn RawLockHandle>) -> Self {
        let core = LockCore::new(handle.id(), handle);
        match mode {
            LockMode::Read => LockObject::Read(core),
            LockMode::Write => LockObject::Write(core),
        }
    }

    fn core(&self) -> &LockCore {
        match self {
            LockObject::Read(core) | LockObject::Write(core) => core,
        }
    }

    pub fn mode(&self) -> LockMode {
        match self {
            LockObject::Read(_) => LockMode::Read,
            LockObject::Write(_) => LockMode::Write,
        }
    }

    pub fn mutex_id(&self) -> ObjectId {
        self.core().id
    }

    /// Non-blocking check of whether `requested` could be granted right now.
    pub fn can_acquire(&self, requested: LockMode) -> AcquireResult {
        let has_guard = *self.core().guard_held.lock();
        self.compute_result(has_guard, requested)
    }

    /// Shared by `can_acquire` (which locks fresh) and `wait` (which
    /// already holds the guard-state lock across its loop) so neither
    /// path re-enters `guard_held`.
    fn compute_result(&self, has_guard: bool, requested: LockMode) -> AcquireResult {
        if !has_guard {
            return AcquireResult::Available;
        }
        let thread = util::current_thread_id();
        let owners = self.core().owners.lock();
        match self {
            LockObject::Read(_) => match requested {
                LockMode::Read => AcquireResult::Available,
                LockMode::Write => {
                    if owners.len() == 1 && owners.contains_key(&thread) {
                        AcquireResult::NeedToConvert
                    } else {
                        AcquireResult::Cannot
                    }
                }
            },
            LockObject::Write(_) => {
                if owners.contains_key(&thread) {
                    AcquireResult::Available
                } else {
                    AcquireResult::Cannot
                }
            }
        }
    }

    /// Block up to `LOCK_ACQUIRE_TIMEOUT` for `requested` to become
    /// grantable, re-checking on every guard drop/recreation notification.
    pub fn wait(&self, requested: LockMode) -> AcquireResult {
        let core = self.core();
        let mut state = core.guard_held.lock();
        loop {
            let result = self.compute_result(*state, requested);
            if result != AcquireResult::Cannot {
                return result;
            }
            let timed_out = core.cv.wait_for(&mut state, LOCK_ACQUIRE_TIMEOUT).timed_out();
            if timed_out {
                return AcquireResult::Cannot;
            }
        }
    }

    fn take_real_lock(&self) {
        match self {
            LockObject::Read(core) => core.handle.lock_shared(),
            LockObject::Write(core) => core.handle.lock_exclusive(),
        }
    }

    /// # Safety
    /// Only valid while this object's real guard is actually held.
    unsafe fn release_real_lock(&self) {
        match self {
            LockObject::Read(core) => unsafe { core.handle.unlock_shared() },
            LockObject::Write(core) => unsafe { core.handle.unlock_exclusive() },
        }
    }

    /// Engage the guard if not already engaged, then record (or bump)
    /// the calling thread's ownership.
    pub fn acquire(&self, mode: LockMode) {
        debug_assert_eq!(mode, self.mode());
        let core = self.core();
        {
            let mut has_guard = core.guard_held.lock();
            if !*has_guard {
                self.take_real_lock();
                *has_guard = true;
            }
        }
        self.add_ownership();
    }

    /// Record (or bump) ownership without touching the real guard.
    /// Used when the tracker re-adds a thread's ownership ahead of
    /// scheduling a deferred drain.
    pub fn add_ownership(&self) {
        let thread = util::current_thread_id();
        let mut owners = self.core().owners.lock();
        owners
            .entry(thread)
            .and_modify(|record| record.count += 1)
            .or_insert_with(|| OwnerRecord {
                first_acquired: Instant::now(),
                count: 1,
            });
    }

    /// Decrement the calling thread's recursive count, dropping its
    /// owner record entirely once it reaches zero. Returns `true` iff
    /// the record was dropped, i.e. this was the thread's last recursive
    /// release rather than one of several — the caller uses this to
    /// decide whether the thread should also come off its held list.
    pub fn remove_ownership(&self) -> bool {
        let thread = util::current_thread_id();
        let mut owners = self.core().owners.lock();
        if let Some(record) = owners.get_mut(&thread) {
            record.count -= 1;
            if record.count == 0 {
                owners.remove(&thread);
                return true;
            }
        }
        false
    }

    pub fn is_owner(&self, thread: crate::types::ThreadId) -> bool {
        self.core().owners.lock().contains_key(&thread)
    }

    pub fn should_remove(&self) -> bool {
        let core = self.core();
        let has_guard = *core.guard_held.lock();
        !has_guard || core.owners.lock().is_empty()
    }

    /// Release the real guard (if held) without touching ownership.
    /// Notifies waiters either way, since a waiter may have been
    /// blocked on a state this call is about to change.
    pub fn drop_guard(&self) {
        let core = self.core();
        let mut has_guard = core.guard_held.lock();
        if *has_guard {
            unsafe { self.release_real_lock() };
            *has_guard = false;
        }
        core.cv.notify_all();
    }

    /// Re-take the real guard (if not held) without touching ownership.
    pub fn recreate_guard(&self) {
        let core = self.core();
        let mut has_guard = core.guard_held.lock();
        if !*has_guard {
            self.take_real_lock();
            *has_guard = true;
        }
        core.cv.notify_all();
    }

    /// Take the underlying mutex exclusively regardless of this
    /// lock-object's own mode. Used only to run deferred operations
    /// against a read-lock, after its shared guard has been dropped.
    pub fn force_exclusive(&self) {
        self.core().handle.lock_exclusive();
    }

    /// # Safety
    /// Must be paired with a prior `force_exclusive` call on this object.
    pub fn force_release_exclusive(&self) {
        unsafe { self.core().handle.unlock_exclusive() };
    }

    pub(crate) fn owner_count(&self) -> usize {
        self.core().owners.lock().len()
    }

    #[cfg(test)]
    pub fn has_guard(&self) -> bool {
        *self.core().guard_held.lock()
    }
}
