//! Per-object reader/writer locking with deadlock avoidance by global
//! ordering, cooperative deferred work, and scoped access wrappers.
//!
//! Three ideas make this more than a map of `RwLock`s:
//!
//! - **Ordering instead of detection.** A thread may only hold its
//!   locks in strictly increasing order of object id. When a new
//!   acquisition would break that order, the thread's existing locks
//!   are dropped and re-taken in sorted order before the call returns.
//!   This avoids deadlock cycles outright rather than detecting them
//!   after the fact.
//! - **Deferred work.** If a lock is busy, a caller can hand over a
//!   closure instead of waiting; it runs exactly once, under a
//!   correctly-held lock, once the current holder releases.
//! - **Scoped wrappers.** [`AccessWrapper`] reports `Success`, `Busy`,
//!   or `DataAbsent` and releases automatically on drop — callers never
//!   unlock by hand.
//!
//! ## Usage Example
//!
//! ```rust
//! use ranklock::{DataManager, LockMode, LockSubsystemBuilder};
//!
//! let tracker = LockSubsystemBuilder::new().build().expect("failed to build tracker");
//! let people: DataManager<u32, String> = DataManager::new(tracker);
//! people.insert(1, "Ada".to_string());
//!
//! let wrapper = people.access(&1, LockMode::Read);
//! assert!(wrapper.is_live());
//! assert_eq!(&*wrapper, "Ada");
//! ```

mod builder;
mod executor;
mod lock;
mod logger;
mod manager;
mod queue;
mod tracker;
mod types;
mod util;
mod worker_queue;
mod wrapper;

pub use builder::LockSubsystemBuilder;
pub use executor::{Executor, ThreadExecutor};
pub use lock::Protected;
pub use logger::{EventLogger, LogEvent};
pub use manager::DataManager;
pub use tracker::ThreadTracker;
pub use types::{AddOperationResult, LockMode, WrapperStatus};
pub use worker_queue::{BoundedWorkerQueue, QueueState};
pub use wrapper::AccessWrapper;
