//! The background task collaborator the tracker and worker queue depend
//! on. Grounded in the original `CFuture` singleton, but injected
//! explicitly rather than reached through a process-global instance —
//! callers construct a `ThreadExecutor` (or supply their own
//! `Executor`) and hand it to `LockSubsystemBuilder::executor`.

use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A named, cancellable background task runner.
pub trait Executor: Send + Sync {
    /// Start `task` under `name`. If a task with that exact name is
    /// already running (or hasn't been reaped yet), the call is a no-op
    /// — this is what lets the tracker schedule `Operations_<id>` from
    /// multiple release paths without double-draining a queue.
    fn add_task(&self, name: String, blocking: bool, task: Box<dyn FnOnce(&AtomicBool) + Send>);

    /// Ask one task (`prefix = false`) or every task whose name starts
    /// with `name` (`prefix = true`) to observe its cancel flag.
    fn force_stop(&self, name: &str, prefix: bool);

    /// True if no task is currently running under `name` (including if
    /// one never existed).
    fn is_complete(&self, name: &str) -> bool;
}

struct TaskHandle {
    cancel: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

/// Default `Executor`: one OS thread per task.
pub struct ThreadExecutor {
    tasks: Mutex<FxHashMap<String, TaskHandle>>,
}

impl ThreadExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Drop bookkeeping for tasks whose thread has already exited, so
    /// a task name can be reused once its prior run is truly done.
    fn reap_finished(tasks: &mut FxHashMap<String, TaskHandle>) {
        tasks.retain(|_, handle| !handle.is_finished());
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self {
            tasks: Mutex::new(FxHashMap::default()),
        }
    }
}

impl Executor for ThreadExecutor {
    fn add_task(&self, name: String, _blocking: bool, task: Box<dyn FnOnce(&AtomicBool) + Send>) {
        let mut tasks = self.tasks.lock();
        Self::reap_finished(&mut tasks);
        if tasks.contains_key(&name) {
            return;
        }
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_for_thread = Arc::clone(&cancel);
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || task(&cancel_for_thread))
            .ok();
        tasks.insert(name, TaskHandle { cancel, join });
    }

    fn force_stop(&self, name: &str, prefix: bool) {
        let tasks = self.tasks.lock();
        for (task_name, handle) in tasks.iter() {
            let matches = if prefix {
                task_name.starts_with(name)
            } else {
                task_name == name
            };
            if matches {
                handle.cancel.store(true, Ordering::Relaxed);
            }
        }
    }

    fn is_complete(&self, name: &str) -> bool {
        self.tasks.lock().get(name).is_none_or(TaskHandle::is_finished)
    }
}
