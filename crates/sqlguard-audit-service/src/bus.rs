//! The message-bus abstraction (spec §4.8, §6): one logical topic,
//! partitioned by application name, idempotent on eventId.
//!
//! [`InMemoryBus`] is the in-process stand-in built on
//! [`tokio::sync::broadcast`], grounded in `mqk-daemon`'s `BusMsg`/SSE
//! pattern — the pluggable point a real Kafka/NATS client would replace.
//! `MessageBus` is the seam: a production deployment swaps the
//! implementation without touching the consumer or checker code.

use std::pin::Pin;

use async_trait::async_trait;
use compact_str::CompactString;
use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use sqlguard_audit::AuditEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{AppResult, bus_error};

/// One bus message: the canonical audit event plus the sequence number the
/// bus assigned within this partition. `seq` disambiguates events published
/// in the same millisecond by the same producer, standing in for the
/// producer-side "thread-seq" the spec's `eventId` formula references —
/// `sqlguard-runtime` does not transmit its own thread id, so the bus
/// assigns a monotonic per-partition counter instead (documented in
/// DESIGN.md as an Open Question resolution).
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub partition: CompactString,
    pub seq:       u64,
    pub event:     AuditEvent
}

impl BusMessage {
    /// The idempotency key a consumer dedups on (spec §6).
    pub fn event_id(&self) -> String {
        self.event.event_id(self.seq)
    }
}

/// Default topic name (spec §6: "default name `sql-audit`").
pub const DEFAULT_TOPIC: &str = "sql-audit";

/// Per-partition broadcast channel capacity. A slow consumer that falls this
/// far behind the producer starts missing messages (`broadcast::Receiver`
/// semantics); the audit service is expected to keep up since checker work
/// is bounded by a per-event timeout.
const PARTITION_CAPACITY: usize = 4_096;

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes `event` to the partition named `partition` (conventionally
    /// the producing application's name).
    async fn publish(&self, partition: &str, event: AuditEvent) -> AppResult<()>;

    /// Subscribes to `partition`, yielding every message published to it
    /// from this point forward.
    fn subscribe(&self, partition: &str) -> Pin<Box<dyn Stream<Item = BusMessage> + Send>>;

    /// Every partition with at least one subscriber or publish so far,
    /// snapshotted at call time — used by the consumer supervisor to spin
    /// up one task per partition.
    fn known_partitions(&self) -> Vec<CompactString>;
}

struct Partition {
    sender: broadcast::Sender<BusMessage>,
    seq:    std::sync::atomic::AtomicU64
}

/// In-process [`MessageBus`] built on one `broadcast` channel per partition,
/// created lazily on first publish or subscribe.
pub struct InMemoryBus {
    partitions: DashMap<CompactString, Partition>
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new()
        }
    }

    fn partition(&self, name: &str) -> dashmap::mapref::one::Ref<'_, CompactString, Partition> {
        if let Some(entry) = self.partitions.get(name) {
            return entry;
        }
        self.partitions.entry(CompactString::from(name)).or_insert_with(|| Partition {
            sender: broadcast::channel(PARTITION_CAPACITY).0,
            seq:    std::sync::atomic::AtomicU64::new(0)
        });
        self.partitions.get(name).expect("just inserted")
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, partition: &str, event: AuditEvent) -> AppResult<()> {
        let entry = self.partition(partition);
        let seq = entry.seq.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let message = BusMessage {
            partition: CompactString::from(partition),
            seq,
            event
        };
        // No active subscriber is not an error — a consumer may start after
        // the producer in tests/dev; production partitions are expected to
        // have a consumer running before traffic arrives.
        let _ = entry.sender.send(message);
        Ok(())
    }

    fn subscribe(&self, partition: &str) -> Pin<Box<dyn Stream<Item = BusMessage> + Send>> {
        let entry = self.partition(partition);
        let rx = entry.sender.subscribe();
        Box::pin(BroadcastStream::new(rx).filter_map(|r| async move { r.ok() }))
    }

    fn known_partitions(&self) -> Vec<CompactString> {
        self.partitions.iter().map(|e| e.key().clone()).collect()
    }
}

/// Wraps a subscribe failure (bus shut down, partition gone) uniformly so
/// callers that must propagate it use one error shape.
pub fn subscribe_error(partition: &str) -> masterror::AppError {
    bus_error(format!("no such partition: {partition}"))
}
