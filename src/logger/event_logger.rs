use crate::types::{ObjectId, ThreadId};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::Duration;

/// Events the tracker and queue emit for observability.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    ObjectRegistered,
    ObjectRemoved,
    AcquireAttempt,
    AcquireSuccess,
    AcquireBusy,
    Release,
    Reorder,
    DeferredEnqueued,
    DeferredRun,
}

#[derive(Debug, Serialize)]
struct LogRecord {
    thread_id: ThreadId,
    object_id: ObjectId,
    event: LogEvent,
    timestamp: f64,
}

enum Command {
    Record(LogRecord),
    Flush(Sender<()>),
}

/// Background-threaded, batched event logger. Disabled by default: a
/// `ThreadTracker` only logs when constructed with
/// `LockSubsystemBuilder::with_log`.
pub struct EventLogger {
    sender: Sender<Command>,
}

impl EventLogger {
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;

        let (sender, receiver) = channel();
        thread::Builder::new()
            .name("ranklock-event-logger".into())
            .spawn(move || writer_loop(file, receiver))
            .context("spawning event logger thread")?;

        Ok(Self { sender })
    }

    pub fn record(&self, thread_id: ThreadId, object_id: ObjectId, event: LogEvent) {
        let now = Utc::now();
        let timestamp = now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0;
        let record = LogRecord {
            thread_id,
            object_id,
            event,
            timestamp,
        };
        // Non-blocking: a full or closed channel should never stall a
        // lock acquisition.
        let _ = self.sender.send(Command::Record(record));
    }

    /// Block until every record sent so far has been written to disk.
    pub fn flush(&self) -> Result<()> {
        let (tx, rx) = channel();
        self.sender
            .send(Command::Flush(tx))
            .map_err(|_| anyhow::anyhow!("event logger thread is gone"))?;
        rx.recv_timeout(Duration::from_secs(5))
            .map_err(|_| anyhow::anyhow!("event logger flush timed out"))
    }
}

fn writer_loop(file: File, receiver: Receiver<Command>) {
    let mut writer = BufWriter::new(file);
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Record(record) => {
                if let Ok(json) = serde_json::to_string(&record) {
                    if let Err(e) = writeln!(writer, "{json}").and_then(|_| writer.flush()) {
                        eprintln!("ranklock: event logger write failed: {e}");
                    }
                }
            }
            Command::Flush(responder) => {
                if let Err(e) = writer.flush() {
                    eprintln!("ranklock: event logger flush failed: {e}");
                }
                let _ = responder.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn records_are_flushed_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");
        let logger = EventLogger::with_file(&path).unwrap();

        logger.record(1, 10, LogEvent::AcquireAttempt);
        logger.record(1, 10, LogEvent::AcquireSuccess);
        logger.record(1, 10, LogEvent::Release);
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"thread_id\":1"));
        assert!(lines[0].contains("\"object_id\":10"));
        assert!(lines[1].contains("\"acquire_success\""));
    }

    #[test]
    fn flush_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("idempotent.log");
        let logger = EventLogger::with_file(&path).unwrap();

        for i in 0..5 {
            logger.record(i, i, LogEvent::AcquireAttempt);
        }
        logger.flush().unwrap();
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 5);
    }
}
