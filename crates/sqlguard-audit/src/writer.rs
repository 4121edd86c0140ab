//! The asynchronous structured-log sink (spec §7 "AuditWriter").
//!
//! Producers (interceptors in `sqlguard-runtime`, or the audit service's own
//! bus consumer) never block on disk I/O: [`AuditWriter::submit`] pushes onto
//! a bounded in-memory queue and returns immediately; a single background
//! task owns the file handle, pops events off the front, and does the actual
//! serializing. Overflow policy is drop-oldest with a counter increment
//! (spec §7, §6 "overflow-policy"): once the queue is at capacity, `submit`
//! evicts the head before pushing the new event, so a burst of traffic loses
//! its stalest entries first rather than the one that just arrived.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering}
    }
};

use sqlguard_core::error::{AppError, AppResult};
use tokio::{
    io::AsyncWriteExt,
    sync::Notify,
    task::JoinHandle,
    time::Duration
};
use tracing::{debug, error, warn};

use crate::event::AuditEvent;

/// Default queue capacity (spec §7).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8_192;

/// Default best-effort flush timeout passed to [`AuditWriter::shutdown`].
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared {
    events:       std::sync::Mutex<VecDeque<AuditEvent>>,
    notify:       Notify,
    writer_count: AtomicU64,
    /// Set once the drain loop has given up on the log file entirely (open
    /// failed); `submit` still accepts events up to capacity but logs the
    /// distinct "writer task is gone" message instead of the backpressure one.
    abandoned:    AtomicBool,
    dropped:      AtomicU64,
    capacity:     usize
}

/// Handle producers hold to enqueue events. Cloning shares the same queue
/// and drop counter across every interceptor instance in a process; the
/// background task keeps running until every clone has been dropped.
pub struct AuditWriter {
    shared: Arc<Shared>
}

impl Clone for AuditWriter {
    fn clone(&self) -> Self {
        self.shared.writer_count.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: self.shared.clone()
        }
    }
}

impl Drop for AuditWriter {
    fn drop(&mut self) {
        if self.shared.writer_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.notify.notify_one();
        }
    }
}

/// Owns the background task and lets the caller wait for a clean shutdown.
pub struct AuditWriterHandle {
    task: JoinHandle<()>
}

impl AuditWriter {
    /// Spawns the background task that appends one JSON line per event to
    /// `path`, creating parent directories and the file itself if absent.
    /// Returns the cloneable writer handle plus a join handle for shutdown.
    pub async fn spawn(
        path: impl Into<PathBuf>
    ) -> AppResult<(Self, AuditWriterHandle)> {
        Self::spawn_with_capacity(path, DEFAULT_CHANNEL_CAPACITY).await
    }

    pub async fn spawn_with_capacity(
        path: impl Into<PathBuf>,
        capacity: usize
    ) -> AppResult<(Self, AuditWriterHandle)> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    AppError::internal(format!(
                        "failed to create audit log directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let shared = Arc::new(Shared {
            events:       std::sync::Mutex::new(VecDeque::with_capacity(capacity.max(1).min(256))),
            notify:       Notify::new(),
            writer_count: AtomicU64::new(1),
            abandoned:    AtomicBool::new(false),
            dropped:      AtomicU64::new(0),
            capacity:     capacity.max(1)
        });
        let task = tokio::spawn(drain_loop(path, shared.clone()));

        Ok((
            Self {
                shared
            },
            AuditWriterHandle {
                task
            }
        ))
    }

    /// Non-blocking submit. When the queue is already at capacity, evicts
    /// the oldest buffered event before pushing `event` (drop-oldest) and
    /// increments the drop counter so operators can see loss in
    /// metrics/logs.
    pub fn submit(&self, event: AuditEvent) {
        if self.shared.abandoned.load(Ordering::Acquire) {
            error!("audit writer task is gone, dropping event");
            return;
        }

        {
            let mut events = self.shared.events.lock().unwrap_or_else(|e| e.into_inner());
            if events.len() >= self.shared.capacity {
                events.pop_front();
                let total = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(total_dropped = total, "audit queue full, dropping oldest buffered event");
            }
            events.push_back(event);
        }
        self.shared.notify.notify_one();
    }

    /// Number of events dropped due to queue overflow since startup.
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl AuditWriterHandle {
    /// Closes the sender side implicitly (by dropping the last [`AuditWriter`]
    /// clone the caller holds) and waits up to `timeout` for the drain loop
    /// to flush and exit. Best-effort: a timeout here means some buffered
    /// events were not flushed to disk before shutdown.
    pub async fn shutdown(self, timeout: Duration) -> AppResult<()> {
        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => Err(AppError::internal(format!(
                "audit writer task panicked: {join_err}"
            ))),
            Err(_) => {
                warn!("audit writer shutdown timed out, buffered events may be lost");
                Ok(())
            }
        }
    }
}

/// Pops the next event off the front of the queue, or `None` if the queue is
/// empty. Distinguishes "empty, wait for more" from "empty, no writers left"
/// so the caller knows whether to keep polling or exit.
fn pop_front(shared: &Shared) -> Option<AuditEvent> {
    shared.events.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
}

async fn drain_loop(path: PathBuf, shared: Arc<Shared>) {
    let file = match open_append(&path).await {
        Ok(f) => f,
        Err(e) => {
            error!(error = %e, path = %path.display(), "audit writer failed to open log file, events will be discarded");
            shared.abandoned.store(true, Ordering::Release);
            while shared.writer_count.load(Ordering::Acquire) > 0 {
                shared.notify.notified().await;
            }
            let mut events = shared.events.lock().unwrap_or_else(|e| e.into_inner());
            shared.dropped.fetch_add(events.len() as u64, Ordering::Relaxed);
            events.clear();
            return;
        }
    };
    let mut file = tokio::io::BufWriter::new(file);

    loop {
        match pop_front(&shared) {
            Some(event) => {
                match serde_json::to_vec(&event) {
                    Ok(mut line) => {
                        line.push(b'\n');
                        if let Err(e) = file.write_all(&line).await {
                            error!(error = %e, "audit writer failed to append event");
                        }
                    }
                    Err(e) => error!(error = %e, "audit event failed to serialize, dropping")
                }

                // Flush whenever the queue is momentarily drained so readers
                // (the audit service's tailer, a human running `tail -f`)
                // see events promptly instead of waiting on the BufWriter's
                // internal capacity.
                if shared.events.lock().unwrap_or_else(|e| e.into_inner()).is_empty() {
                    if let Err(e) = file.flush().await {
                        error!(error = %e, "audit writer failed to flush");
                    }
                }
            }
            None => {
                if shared.writer_count.load(Ordering::Acquire) == 0 {
                    break;
                }
                shared.notify.notified().await;
            }
        }
    }

    if let Err(e) = file.flush().await {
        error!(error = %e, "audit writer failed final flush on shutdown");
    }
    debug!("audit writer drain loop exiting");
}

async fn open_append(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::event::AuditEvent;

    #[tokio::test]
    async fn submitted_events_are_appended_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let (writer, handle) = AuditWriter::spawn(&path).await.unwrap();

        writer.submit(AuditEvent::builder("SELECT 1").build());
        writer.submit(AuditEvent::builder("SELECT 2").build());

        drop(writer);
        handle.shutdown(Duration::from_secs(2)).await.unwrap();

        let mut contents = String::new();
        std::fs::File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(parsed.get("sql").is_some());
        }
    }

    #[tokio::test]
    async fn full_queue_drops_the_oldest_buffered_event_not_the_newest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let (writer, handle) = AuditWriter::spawn_with_capacity(&path, 1).await.unwrap();

        // None of these submit() calls contain an .await, so on the
        // single-threaded test runtime the drain task cannot run until this
        // loop finishes — every eviction decision below happens purely
        // inside submit()'s capacity check.
        for i in 0 .. 50 {
            writer.submit(AuditEvent::builder(format!("SELECT {i}")).build());
        }
        assert_eq!(writer.dropped_count(), 49);

        drop(writer);
        handle.shutdown(Duration::from_secs(2)).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let line = contents.lines().next().expect("one line written");
        let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(parsed["sql"], "SELECT 49", "drop-oldest must keep the most recent event, not the first one");
    }
}
