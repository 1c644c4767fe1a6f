//! Per-object FIFO of deferred operations, paired with the lock-object
//! they will eventually run under.

use crate::lock::LockObject;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type BoxedOp = Box<dyn FnOnce() + Send>;

pub(crate) struct ObjectQueue {
    lock: Arc<LockObject>,
    pending: Mutex<VecDeque<BoxedOp>>,
}

impl ObjectQueue {
    pub fn new(lock: Arc<LockObject>) -> Self {
        Self {
            lock,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn lock_object(&self) -> &Arc<LockObject> {
        &self.lock
    }

    /// Curry `data` into `op` and enqueue the resulting zero-argument
    /// closure; called `push(closure, data)` in the system this was
    /// translated from, expressed here as a single generic call.
    pub fn push<D: Send + 'static>(&self, data: D, op: impl FnOnce(D) + Send + 'static) {
        self.pending.lock().push_back(Box::new(move || op(data)));
    }

    pub fn operation_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run queued operations FIFO until empty or `cancel` is set. A
    /// panicking closure does not abort the drain; it is caught and the
    /// remaining operations still run.
    pub fn drain(&self, cancel: &AtomicBool) {
        loop {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            let next = self.pending.lock().pop_front();
            let Some(op) = next else { return };
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(op)) {
                crate::logger::log_deferred_panic(self.lock.mutex_id(), panic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{LockObject, Protected, RawLockHandle};
    use crate::types::LockMode;

    fn test_lock() -> Arc<LockObject> {
        let protected = Protected::new(0u32);
        let handle: Arc<dyn RawLockHandle> = protected;
        Arc::new(LockObject::new(LockMode::Write, handle))
    }

    #[test]
    fn drains_in_fifo_order() {
        let queue = ObjectQueue::new(test_lock());
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            queue.push(i, move |i| order.lock().push(i));
        }
        assert_eq!(queue.operation_count(), 5);
        queue.drain(&AtomicBool::new(false));
        assert_eq!(queue.operation_count(), 0);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cancel_flag_stops_the_drain_early() {
        let queue = ObjectQueue::new(test_lock());
        for i in 0..10 {
            queue.push(i, |_| ());
        }
        let cancel = AtomicBool::new(true);
        queue.drain(&cancel);
        assert_eq!(queue.operation_count(), 10);
    }

    #[test]
    fn a_panicking_operation_does_not_stop_later_ones() {
        let queue = ObjectQueue::new(test_lock());
        let ran = Arc::new(Mutex::new(false));
        queue.push((), |_| panic!("boom"));
        {
            let ran = Arc::clone(&ran);
            queue.push((), move |_| *ran.lock() = true);
        }
        queue.drain(&AtomicBool::new(false));
        assert!(*ran.lock());
    }
}
