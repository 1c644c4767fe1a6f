//! The thread tracker: the object registry, the per-thread held-lock
//! lists, acquisition, reorder-on-violation, release, and deferred-work
//! dispatch. Grounded line-by-line in `thread_tracker.h`'s
//! `CNewThreadTracker`.

use crate::executor::Executor;
use crate::lock::{LockObject, RawLockHandle};
use crate::logger::{EventLogger, LogEvent};
use crate::queue::ObjectQueue;
use crate::types::{AcquireResult, AddOperationResult, LockMode, ObjectId, ThreadId};
use crate::util;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// What `try_acquire` learned; the caller (an `AccessWrapper`) decides
/// what to do with it.
pub(crate) enum TryAcquire {
    /// The calling thread now owns the lock.
    Acquired,
    /// Contended; wait on this lock-object's condition variable.
    MustWait(Arc<LockObject>),
    /// The id was invalid; there is nothing to wait on.
    Busy,
}

/// Registry of lock-objects keyed by object id, plus each thread's
/// currently-held ids kept sorted ascending whenever no acquisition is
/// in flight. `objects` is always locked before `held`.
pub struct ThreadTracker {
    objects: Mutex<FxHashMap<ObjectId, Arc<ObjectQueue>>>,
    held: Mutex<FxHashMap<ThreadId, Vec<ObjectId>>>,
    executor: Arc<dyn Executor>,
    logger: Option<Arc<EventLogger>>,
}

impl ThreadTracker {
    pub(crate) fn new(executor: Arc<dyn Executor>, logger: Option<Arc<EventLogger>>) -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(FxHashMap::default()),
            held: Mutex::new(FxHashMap::default()),
            executor,
            logger,
        })
    }

    fn log(&self, thread_id: ThreadId, object_id: ObjectId, event: LogEvent) {
        if let Some(logger) = &self.logger {
            logger.record(thread_id, object_id, event);
        }
    }

    /// Called by the access wrapper whenever it settles on `Busy`, so the
    /// event log carries contention that never resulted in an acquisition.
    pub(crate) fn log_busy(&self, id: ObjectId) {
        self.log(util::current_thread_id(), id, LogEvent::AcquireBusy);
    }

    /// Attempt to acquire `mode` on `id`, using `handle` to build a
    /// fresh lock-object if one doesn't exist yet.
    pub(crate) fn try_acquire(
        self: &Arc<Self>,
        handle: &Arc<dyn RawLockHandle>,
        id: ObjectId,
        mode: LockMode,
    ) -> TryAcquire {
        if id == 0 {
            return TryAcquire::Busy;
        }
        self.log(util::current_thread_id(), id, LogEvent::AcquireAttempt);

        let existing = {
            let objects = self.objects.lock();
            objects.get(&id).cloned()
        };

        let Some(queue) = existing else {
            self.register(handle, id, mode);
            self.log(util::current_thread_id(), id, LogEvent::AcquireSuccess);
            return TryAcquire::Acquired;
        };

        let lock = Arc::clone(queue.lock_object());
        match lock.can_acquire(mode) {
            AcquireResult::Cannot => TryAcquire::MustWait(lock),
            AcquireResult::NeedToConvert => {
                self.release(id, false);
                self.register(handle, id, LockMode::Write);
                self.log(util::current_thread_id(), id, LogEvent::AcquireSuccess);
                TryAcquire::Acquired
            }
            AcquireResult::Available => {
                self.add_to_held(id);
                lock.acquire(mode);
                if mode == LockMode::Write {
                    self.maybe_reorder(id);
                }
                self.log(util::current_thread_id(), id, LogEvent::AcquireSuccess);
                TryAcquire::Acquired
            }
        }
    }

    /// Create a fresh lock-object for `id` and acquire it for the
    /// calling thread. Returns `false` if `id` was registered by
    /// another thread in the meantime (the caller should re-query).
    fn register(self: &Arc<Self>, handle: &Arc<dyn RawLockHandle>, id: ObjectId, mode: LockMode) -> bool {
        let lock = {
            let mut objects = self.objects.lock();
            if objects.contains_key(&id) {
                return false;
            }
            let lock = Arc::new(LockObject::new(mode, Arc::clone(handle)));
            objects.insert(id, Arc::new(ObjectQueue::new(Arc::clone(&lock))));
            self.log(util::current_thread_id(), id, LogEvent::ObjectRegistered);
            lock
        };
        self.add_to_held(id);
        lock.acquire(mode);
        if mode == LockMode::Write {
            self.maybe_reorder(id);
        }
        true
    }

    /// Mirrors the original `AddToHeldLocks`: only appends when `id`
    /// isn't already present, since recursive/coalesced acquisitions
    /// (recursive Write, a second Read) call this again for an id the
    /// thread already holds.
    fn add_to_held(&self, id: ObjectId) {
        let thread = util::current_thread_id();
        let mut held = self.held.lock();
        let ids = held.entry(thread).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Reorder the calling thread's locks iff adding `newly_added`
    /// broke ascending order.
    fn maybe_reorder(self: &Arc<Self>, newly_added: ObjectId) {
        let thread = util::current_thread_id();
        let needs_reorder = {
            let held = self.held.lock();
            held.get(&thread)
                .is_some_and(|ids| ids.iter().any(|&id| id > newly_added))
        };
        if needs_reorder {
            self.reorder(thread);
        }
    }

    /// Drop every guard the thread holds, discard ids whose lock-object
    /// has since vanished, sort what remains ascending, then recreate
    /// the guards in that order — re-taking the underlying rw-mutexes
    /// in globally consistent ascending order.
    fn reorder(&self, thread: ThreadId) {
        let objects = self.objects.lock();
        let mut held = self.held.lock();
        let ids = held.entry(thread).or_default();

        let mut still_valid: Vec<(ObjectId, Arc<LockObject>)> = ids
            .iter()
            .filter_map(|&id| objects.get(&id).map(|queue| (id, Arc::clone(queue.lock_object()))))
            .collect();

        for (_, lock) in &still_valid {
            lock.drop_guard();
        }
        still_valid.sort_by_key(|(id, _)| *id);
        for (_, lock) in &still_valid {
            lock.recreate_guard();
        }

        *ids = still_valid.into_iter().map(|(id, _)| id).collect();
        self.log(thread, 0, LogEvent::Reorder);
    }

    /// Release the calling thread's ownership of `id`.
    ///
    /// `operation_call` is set only by the deferred-drain task (§4.3.5
    /// in the design notes): in that case the object is purged
    /// unconditionally, since the drain task (not any application
    /// thread) was the temporary "owner".
    pub(crate) fn release(self: &Arc<Self>, id: ObjectId, operation_call: bool) {
        if operation_call {
            self.remove_object(id);
            return;
        }

        let queue = {
            let objects = self.objects.lock();
            objects.get(&id).cloned()
        };

        let Some(queue) = queue else { return };
        let lock = queue.lock_object();
        // Only drop the id off the calling thread's held list once this
        // was its last recursive release — a thread that still owns the
        // lock (recursive Write, or one of several coalesced Reads) must
        // stay visible to `reorder`, otherwise the underlying rw-mutex it
        // still holds would no longer be re-taken in ascending order.
        let fully_released = lock.remove_ownership();
        if fully_released {
            self.remove_from_held(id);
        }
        self.log(util::current_thread_id(), id, LogEvent::Release);

        if lock.should_remove() {
            if queue.operation_count() > 0 {
                lock.add_ownership();
                self.schedule_drain(id, Arc::clone(&queue));
            } else {
                self.remove_object(id);
            }
        }
    }

    fn remove_from_held(&self, id: ObjectId) {
        let thread = util::current_thread_id();
        let mut held = self.held.lock();
        if let Some(ids) = held.get_mut(&thread) {
            ids.retain(|&held_id| held_id != id);
            if ids.is_empty() {
                held.remove(&thread);
            }
        }
    }

    fn remove_object(&self, id: ObjectId) {
        let queue = self.objects.lock().remove(&id);
        if let Some(queue) = queue {
            queue.lock_object().drop_guard();
            self.log(0, id, LogEvent::ObjectRemoved);
        }
    }

    /// Schedule `Operations_<id>` on the executor to drain `queue`'s
    /// pending closures. A read-lock is temporarily converted to
    /// exclusive for the duration of the drain.
    fn schedule_drain(self: &Arc<Self>, id: ObjectId, queue: Arc<ObjectQueue>) {
        let tracker = Arc::clone(self);
        let name = format!("Operations_{id}");
        self.executor.add_task(
            name,
            true,
            Box::new(move |cancel| {
                let lock = Arc::clone(queue.lock_object());
                let converted_from_read = lock.mode() == LockMode::Read;
                if converted_from_read {
                    // Ownership was re-added before scheduling, but the
                    // real shared guard is dropped here: nothing else
                    // can be a concurrent reader at this point because
                    // this drain is the sole remaining "owner".
                    debug_assert_eq!(lock.owner_count(), 1, "read->write conversion requires a sole owner");
                    lock.drop_guard();
                    lock.force_exclusive();
                }

                tracker.log(0, id, LogEvent::DeferredRun);
                queue.drain(cancel);

                if converted_from_read {
                    lock.force_release_exclusive();
                }
                tracker.release(id, true);
            }),
        );
    }

    /// Enroll a deferred closure on `id`'s queue. Returns
    /// `LockAvailable` if the object no longer exists (the lock freed
    /// up in the meantime; the caller should just retry acquisition).
    pub(crate) fn add_operation<D: Send + 'static>(
        &self,
        id: ObjectId,
        data: D,
        op: impl FnOnce(D) + Send + 'static,
    ) -> AddOperationResult {
        let queue = {
            let objects = self.objects.lock();
            objects.get(&id).cloned()
        };
        match queue {
            None => AddOperationResult::LockAvailable,
            Some(queue) => {
                queue.push(data, op);
                self.log(util::current_thread_id(), id, LogEvent::DeferredEnqueued);
                AddOperationResult::Added
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn held_ids(&self, thread: ThreadId) -> Vec<ObjectId> {
        self.held.lock().get(&thread).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn lock_object_for(&self, id: ObjectId) -> Option<Arc<LockObject>> {
        self.objects.lock().get(&id).map(|q| Arc::clone(q.lock_object()))
    }
}
