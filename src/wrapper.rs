//! Scoped, move-only access handle produced by the tracker. Grounded in
//! `data_wrapper.h`'s `CDataWrapper<TData>`; the non-copyable discipline
//! that needed an explicit guard in C++ falls out for free here from
//! `Arc` ownership plus `Drop`.

use crate::lock::{Protected, RawLockHandle};
use crate::tracker::{ThreadTracker, TryAcquire};
use crate::types::{AcquireResult, LockMode, ObjectId, WrapperStatus};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

pub struct AccessWrapper<T> {
    tracker: Arc<ThreadTracker>,
    protected: Option<Arc<Protected<T>>>,
    id: ObjectId,
    status: WrapperStatus,
}

impl<T: Send + Sync + 'static> AccessWrapper<T> {
    pub(crate) fn new(tracker: Arc<ThreadTracker>, protected: Arc<Protected<T>>, mode: LockMode) -> Self {
        let id = protected.id();
        if id == 0 {
            return Self {
                tracker,
                protected: None,
                id,
                status: WrapperStatus::DataAbsent,
            };
        }

        let handle: Arc<dyn RawLockHandle> = Arc::clone(&protected) as Arc<dyn RawLockHandle>;
        let status = Self::acquire(&tracker, &handle, id, mode);

        let protected = if status == WrapperStatus::Success { Some(protected) } else { None };
        Self {
            tracker,
            protected,
            id,
            status,
        }
    }

    /// Construction algorithm: try the fast path, then fall back to a
    /// bounded wait, handling the three outcomes a wait can report.
    fn acquire(
        tracker: &Arc<ThreadTracker>,
        handle: &Arc<dyn RawLockHandle>,
        id: ObjectId,
        mode: LockMode,
    ) -> WrapperStatus {
        match tracker.try_acquire(handle, id, mode) {
            TryAcquire::Acquired => WrapperStatus::Success,
            TryAcquire::Busy => {
                tracker.log_busy(id);
                WrapperStatus::Busy
            }
            TryAcquire::MustWait(lock) => match lock.wait(mode) {
                AcquireResult::NeedToConvert => {
                    tracker.release(id, false);
                    match tracker.try_acquire(handle, id, LockMode::Write) {
                        TryAcquire::Acquired => WrapperStatus::Success,
                        _ => {
                            tracker.log_busy(id);
                            WrapperStatus::Busy
                        }
                    }
                }
                AcquireResult::Available => match tracker.try_acquire(handle, id, mode) {
                    TryAcquire::Acquired => WrapperStatus::Success,
                    _ => {
                        tracker.log_busy(id);
                        WrapperStatus::Busy
                    }
                },
                AcquireResult::Cannot => {
                    tracker.log_busy(id);
                    WrapperStatus::Busy
                }
            },
        }
    }

    /// A wrapper over an id that was never registered with this
    /// tracker, or over a key the caller's data manager didn't find.
    pub(crate) fn absent(tracker: Arc<ThreadTracker>) -> Self {
        Self {
            tracker,
            protected: None,
            id: 0,
            status: WrapperStatus::DataAbsent,
        }
    }

    pub fn status(&self) -> WrapperStatus {
        self.status
    }

    /// True iff the wrapper owns a live lock and may be dereferenced.
    pub fn is_live(&self) -> bool {
        self.status == WrapperStatus::Success && self.protected.is_some()
    }
}

impl<T> Deref for AccessWrapper<T> {
    type Target = T;

    fn deref(&self) -> &T {
        let protected = self
            .protected
            .as_ref()
            .expect("AccessWrapper::deref called on a non-Success wrapper");
        // Safety: a Success wrapper holds the real guard for the
        // lifetime of the wrapper; parking_lot's safe read()/write()
        // API is bypassed on purpose since the guard was taken manually
        // through `RawLockHandle`.
        unsafe { &*protected.data().data_ptr() }
    }
}

impl<T> DerefMut for AccessWrapper<T> {
    fn deref_mut(&mut self) -> &mut T {
        let protected = self
            .protected
            .as_ref()
            .expect("AccessWrapper::deref_mut called on a non-Success wrapper");
        unsafe { &mut *protected.data().data_ptr() }
    }
}

impl<T> Drop for AccessWrapper<T> {
    fn drop(&mut self) {
        if self.status == WrapperStatus::Success {
            self.tracker.release(self.id, false);
        }
    }
}
