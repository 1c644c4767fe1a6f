//! Bounded FIFO processed by N worker threads, with retry, age-based
//! eviction, and a periodic cleaner. Grounded in `queue_normal.h`'s
//! `CNormalQueue<TData>`; an optional collaborator used by the tracker's
//! deferred-drain path and available directly for demo workloads.

use crate::executor::Executor;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const MIN_WORKER_THREAD_COUNT: usize = 1;
pub const MAX_WORKER_THREAD_COUNT: usize = 10;
pub const MAX_RETRY_COUNT: u32 = 3;
pub const MAX_QUEUE_SIZE: usize = 20_000;
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(300);
pub const CLEANER_INTERVAL: Duration = Duration::from_secs(120);
const QUEUE_CLEANER_PREFIX: &str = "ClearQueue_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Working,
    Idle,
    ThreadsStopped,
}

struct QueuedItem<D> {
    data: D,
    enqueued_at: Instant,
    retry_count: u32,
}

/// A bounded, multi-worker FIFO. Overflow drops the oldest item — kept
/// verbatim from the system this was translated from even though a
/// batch push can displace an item that arrived in the same push.
pub struct BoundedWorkerQueue<D> {
    name: String,
    items: Mutex<VecDeque<QueuedItem<D>>>,
    not_empty: Condvar,
    state: Mutex<QueueState>,
    executor: Arc<dyn Executor>,
    processor: Arc<dyn Fn(&D) -> bool + Send + Sync>,
}

impl<D: Send + 'static> BoundedWorkerQueue<D> {
    pub fn new(
        name: impl Into<String>,
        executor: Arc<dyn Executor>,
        worker_count: usize,
        processor: impl Fn(&D) -> bool + Send + Sync + 'static,
    ) -> Arc<Self> {
        let worker_count = worker_count.clamp(MIN_WORKER_THREAD_COUNT, MAX_WORKER_THREAD_COUNT);
        let queue = Arc::new(Self {
            name: name.into(),
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            state: Mutex::new(QueueState::Working),
            executor,
            processor: Arc::new(processor),
        });
        queue.start_threads(worker_count);
        queue.start_cleaner();
        queue
    }

    pub fn state(&self) -> QueueState {
        *self.state.lock()
    }

    fn set_state(&self, state: QueueState) {
        *self.state.lock() = state;
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, data: D) {
        {
            let mut items = self.items.lock();
            if items.len() >= MAX_QUEUE_SIZE {
                items.pop_front();
            }
            items.push_back(QueuedItem {
                data,
                enqueued_at: Instant::now(),
                retry_count: 0,
            });
        }
        self.not_empty.notify_one();
    }

    pub fn push_batch(&self, batch: impl IntoIterator<Item = D>) {
        {
            let mut items = self.items.lock();
            for data in batch {
                if items.len() >= MAX_QUEUE_SIZE {
                    items.pop_front();
                }
                items.push_back(QueuedItem {
                    data,
                    enqueued_at: Instant::now(),
                    retry_count: 0,
                });
            }
        }
        self.not_empty.notify_all();
    }

    fn start_threads(self: &Arc<Self>, worker_count: usize) {
        for index in 0..worker_count {
            let queue = Arc::clone(self);
            let task_name = format!("{}_worker_{worker_count}_{index}", self.name);
            self.executor
                .add_task(task_name, true, Box::new(move |cancel| queue.worker_loop(cancel)));
        }
    }

    fn worker_loop(self: Arc<Self>, cancel: &AtomicBool) {
        loop {
            if cancel.load(Ordering::Relaxed) || self.state() == QueueState::ThreadsStopped {
                return;
            }

            let mut items = self.items.lock();
            while items.is_empty() {
                if self.state() != QueueState::Working || cancel.load(Ordering::Relaxed) {
                    return;
                }
                self.not_empty.wait_for(&mut items, Duration::from_millis(200));
            }

            if self.state() != QueueState::Working {
                return;
            }
            let Some(mut item) = items.pop_front() else { continue };
            drop(items);

            if !(self.processor)(&item.data) {
                item.retry_count += 1;
                if item.retry_count < MAX_RETRY_COUNT {
                    self.items.lock().push_back(item);
                    self.not_empty.notify_one();
                }
            }
        }
    }

    fn start_cleaner(self: &Arc<Self>) {
        let queue = Arc::clone(self);
        let task_name = format!("{QUEUE_CLEANER_PREFIX}{}", self.name);
        self.executor.add_task(
            task_name,
            true,
            Box::new(move |cancel| {
                while !cancel.load(Ordering::Relaxed) {
                    thread::sleep(CLEANER_INTERVAL);
                    if cancel.load(Ordering::Relaxed) {
                        return;
                    }
                    queue
                        .items
                        .lock()
                        .retain(|item| item.enqueued_at.elapsed() < OPERATION_TIMEOUT);
                }
            }),
        );
    }

    /// Stop accepting new work from the workers, cancel the worker and
    /// cleaner tasks, and optionally drop whatever is still queued.
    pub fn stop(&self, clear_backlog: bool) {
        self.set_state(QueueState::ThreadsStopped);
        self.executor.force_stop(&format!("{}_worker", self.name), true);
        self.executor
            .force_stop(&format!("{QUEUE_CLEANER_PREFIX}{}", self.name), false);
        if clear_backlog {
            self.items.lock().clear();
        }
        self.not_empty.notify_all();
    }
}
