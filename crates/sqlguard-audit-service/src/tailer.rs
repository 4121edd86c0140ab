//! Bridges the JSONL audit trail `sqlguard-runtime`'s `AuditInterceptor`
//! writes (spec §4.7) onto the in-process bus the consumer pool reads from
//! (spec §4.8) — the missing link in spec §2's data-flow line ("interceptor
//! captures outcome and emits audit event -> audit service consumes event
//! and runs post-execution checkers -> results persisted").
//!
//! The producing application and this daemon are separate processes, so the
//! bridge is a poll-based tail rather than a direct function call: it
//! re-opens `path` on an interval, reads whatever bytes were appended since
//! the last read, and publishes each complete JSON line as a [`BusMessage`].
//! The pack carries no file-watching crate, so polling stands in for an
//! inotify/kqueue watch; [`DEFAULT_POLL_INTERVAL`] trades a little latency
//! for not adding one.

use std::{path::PathBuf, sync::Arc};

use sqlguard_audit::AuditEvent;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, SeekFrom},
    time::{Duration, interval}
};
use tracing::warn;

use crate::bus::MessageBus;

/// How often the tailer checks `path` for growth.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Tails `path` forever, publishing each well-formed audit event onto `bus`
/// under a partition keyed by the event's `app` field. Intended to be
/// spawned as its own task alongside the consumer pool (see `main.rs`).
pub async fn run(path: PathBuf, bus: Arc<dyn MessageBus>) {
    run_with_interval(path, bus, DEFAULT_POLL_INTERVAL).await
}

pub async fn run_with_interval(path: PathBuf, bus: Arc<dyn MessageBus>, poll_interval: Duration) {
    let mut offset: u64 = 0;
    let mut partial = String::new();
    let mut ticker = interval(poll_interval);

    loop {
        ticker.tick().await;
        offset = tail_once(&path, &bus, offset, &mut partial).await;
    }
}

/// One poll cycle: reads whatever was appended to `path` past `offset`,
/// publishes every complete line, and returns the new offset. A file that
/// doesn't exist yet (the producer hasn't started) or that shrank (rotated)
/// is handled by returning/resetting to `0` rather than erroring.
async fn tail_once(path: &std::path::Path, bus: &Arc<dyn MessageBus>, offset: u64, partial: &mut String) -> u64 {
    let mut file = match File::open(path).await {
        Ok(f) => f,
        Err(_) => return offset
    };

    let len = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!(error = %e, "audit tailer failed to stat log file");
            return offset;
        }
    };

    let offset = if len < offset {
        partial.clear();
        0
    } else {
        offset
    };
    if len == offset {
        return offset;
    }

    if let Err(e) = file.seek(SeekFrom::Start(offset)).await {
        warn!(error = %e, "audit tailer failed to seek log file");
        return offset;
    }

    let mut buf = Vec::new();
    if let Err(e) = file.read_to_end(&mut buf).await {
        warn!(error = %e, "audit tailer failed to read log file");
        return offset;
    }
    let new_offset = offset + buf.len() as u64;

    partial.push_str(&String::from_utf8_lossy(&buf));
    while let Some(newline_at) = partial.find('\n') {
        let line: String = partial.drain(..= newline_at).collect();
        publish_line(bus, line.trim_end()).await;
    }

    new_offset
}

async fn publish_line(bus: &Arc<dyn MessageBus>, line: &str) {
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<AuditEvent>(line) {
        Ok(event) => {
            let partition = event.app.to_string();
            if let Err(e) = bus.publish(&partition, event).await {
                warn!(error = %e, "audit tailer failed to publish event onto the bus");
            }
        }
        Err(e) => warn!(error = %e, line, "audit tailer skipped an unparsable log line")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use sqlguard_audit::{AuditEvent, AuditWriter};
    use sqlguard_core::context::StatementKind;

    use super::*;
    use crate::bus::InMemoryBus;

    #[tokio::test]
    async fn events_written_after_the_tailer_starts_are_published() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let (writer, handle) = AuditWriter::spawn(&path).await.unwrap();
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());

        let mut stream = bus.subscribe("orders-service");
        let tailer = tokio::spawn(run_with_interval(path.clone(), bus.clone(), StdDuration::from_millis(20)));

        writer.submit(
            AuditEvent::builder("SELECT 1 FROM dual")
                .app("orders-service")
                .kind(StatementKind::Select)
                .success(true)
                .build()
        );

        use futures_util::StreamExt;
        let message = tokio::time::timeout(StdDuration::from_secs(2), stream.next())
            .await
            .expect("tailer published within the timeout")
            .expect("stream yielded a message");
        assert_eq!(message.event.app, "orders-service");

        tailer.abort();
        drop(writer);
        handle.shutdown(StdDuration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn a_missing_file_is_polled_without_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist-yet.jsonl");
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
        let mut partial = String::new();

        let offset = tail_once(&path, &bus, 0, &mut partial).await;
        assert_eq!(offset, 0);
    }
}
