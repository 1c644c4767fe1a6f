//! Ambient structured logging for the lock subsystem.
//!
//! Modeled on the teacher crate's `core::logger::event_logger`: a
//! background thread owns the file handle, callers hand it
//! already-timestamped, `serde_json`-serializable records over a
//! channel, and a `flush` call can be used to synchronize before
//! reading the file back (e.g. in tests).

mod event_logger;

pub use event_logger::{EventLogger, LogEvent};

use crate::types::ObjectId;
use std::any::Any;

/// Called by the queue drain loop when a deferred closure panics. Kept
/// as a free function (rather than threading a logger reference through
/// every `ObjectQueue`) since it only ever prints a diagnostic; nothing
/// downstream depends on it being delivered.
pub(crate) fn log_deferred_panic(object_id: ObjectId, panic: Box<dyn Any + Send>) {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<non-string panic payload>".to_string());
    eprintln!("ranklock: deferred operation on object {object_id} panicked: {message}");
}
