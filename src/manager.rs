//! Generic, keyed collaborator applications use to reach the tracker
//! without handling object identity themselves. Grounded in
//! `example.cpp`'s `CPersonManager::Access`.

use crate::lock::Protected;
use crate::tracker::ThreadTracker;
use crate::types::{AddOperationResult, LockMode, WrapperStatus};
use crate::wrapper::AccessWrapper;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;

pub struct DataManager<K, T> {
    tracker: Arc<ThreadTracker>,
    objects: Mutex<FxHashMap<K, Arc<Protected<T>>>>,
}

impl<K, T> DataManager<K, T>
where
    K: Eq + Hash + Clone,
    T: Send + Sync + 'static,
{
    pub fn new(tracker: Arc<ThreadTracker>) -> Self {
        Self {
            tracker,
            objects: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn insert(&self, key: K, value: T) {
        self.objects.lock().insert(key, Protected::new(value));
    }

    pub fn remove(&self, key: &K) -> bool {
        self.objects.lock().remove(key).is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.objects.lock().contains_key(key)
    }

    /// Attempt to access `key` in `mode`. Returns a `DataAbsent` wrapper
    /// if no object is stored under `key`.
    pub fn access(&self, key: &K, mode: LockMode) -> AccessWrapper<T> {
        match self.objects.lock().get(key).cloned() {
            Some(protected) => AccessWrapper::new(Arc::clone(&self.tracker), protected, mode),
            None => AccessWrapper::absent(Arc::clone(&self.tracker)),
        }
    }

    /// Like `access`, but if the lock is busy, enroll `(data, op)` as a
    /// deferred operation on the object instead of giving up. If the
    /// lock had already freed up by the time enrollment was attempted,
    /// retries acquisition once immediately.
    pub fn access_or_defer<D, F>(&self, key: &K, mode: LockMode, data: D, op: F) -> AccessWrapper<T>
    where
        D: Send + 'static,
        F: FnOnce(D) + Send + 'static,
    {
        let Some(protected) = self.objects.lock().get(key).cloned() else {
            return AccessWrapper::absent(Arc::clone(&self.tracker));
        };

        let wrapper = AccessWrapper::new(Arc::clone(&self.tracker), Arc::clone(&protected), mode);
        if wrapper.status() != WrapperStatus::Busy {
            return wrapper;
        }

        let id = protected.id();
        if self.tracker.add_operation(id, data, op) == AddOperationResult::LockAvailable {
            return AccessWrapper::new(Arc::clone(&self.tracker), protected, mode);
        }
        wrapper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ThreadExecutor;

    fn tracker() -> Arc<ThreadTracker> {
        ThreadTracker::new(ThreadExecutor::new(), None)
    }

    #[test]
    fn missing_key_is_data_absent() {
        let manager: DataManager<u32, String> = DataManager::new(tracker());
        let wrapper = manager.access(&1, LockMode::Read);
        assert_eq!(wrapper.status(), WrapperStatus::DataAbsent);
    }

    #[test]
    fn insert_then_access_succeeds() {
        let manager: DataManager<u32, String> = DataManager::new(tracker());
        manager.insert(1, "hello".to_string());
        let wrapper = manager.access(&1, LockMode::Read);
        assert_eq!(wrapper.status(), WrapperStatus::Success);
        assert_eq!(&*wrapper, "hello");
    }

    #[test]
    fn write_through_the_wrapper_is_visible_after_release() {
        let manager: DataManager<u32, i32> = DataManager::new(tracker());
        manager.insert(1, 0);
        {
            let mut wrapper = manager.access(&1, LockMode::Write);
            *wrapper += 1;
        }
        let wrapper = manager.access(&1, LockMode::Read);
        assert_eq!(*wrapper, 1);
    }
}
