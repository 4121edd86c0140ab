//! The bus consumer (spec §4.8): one task per partition, in-order
//! single-threaded processing within a partition, per-event fan-out across
//! every enabled checker with an independent per-checker deadline.

use std::{collections::HashSet, sync::Arc, time::Duration};

use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::{
    bus::{BusMessage, MessageBus},
    checkers::{AuditChecker, CheckerOutcome, run_checker},
    store::{Report, ReportStore}
};

/// Default per-checker deadline (spec §6 `audit-service.checker-timeout-ms`).
pub const DEFAULT_CHECKER_TIMEOUT: Duration = Duration::from_millis(200);

/// How often the supervisor re-checks [`MessageBus::known_partitions`] for
/// partitions created since startup (spec §6 partitioning "by application
/// name" means the full partition set isn't known up front).
const SUPERVISOR_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct ConsumerConfig {
    pub checker_timeout: Duration
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            checker_timeout: DEFAULT_CHECKER_TIMEOUT
        }
    }
}

/// Spawns one task per currently-known partition plus a supervisor that
/// picks up partitions created after startup. Each partition task processes
/// its own events strictly in arrival order; different partitions run
/// fully concurrently (spec §5: "one worker per bus partition").
///
/// `partitions` seeds the set so tests and a fixed single-topic deployment
/// don't have to wait for the first poll; in a live deployment where
/// partitions are named after the producing application, pass an empty
/// list and let the supervisor discover them via [`MessageBus::known_partitions`].
pub async fn run(
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn ReportStore>,
    checkers: Arc<Vec<Box<dyn AuditChecker>>>,
    config: ConsumerConfig,
    partitions: Vec<String>
) {
    let mut started: HashSet<String> = HashSet::new();

    for partition in partitions {
        spawn_partition(&bus, &store, &checkers, config.checker_timeout, partition, &mut started);
    }

    let mut ticker = tokio::time::interval(SUPERVISOR_POLL_INTERVAL);
    loop {
        ticker.tick().await;
        for partition in bus.known_partitions() {
            spawn_partition(&bus, &store, &checkers, config.checker_timeout, partition.to_string(), &mut started);
        }
    }
}

/// Spawns (and detaches) the worker for `partition` unless one is already
/// running. The task runs for the lifetime of the process; the supervisor
/// only needs to avoid starting a second worker for the same partition.
fn spawn_partition(
    bus: &Arc<dyn MessageBus>,
    store: &Arc<dyn ReportStore>,
    checkers: &Arc<Vec<Box<dyn AuditChecker>>>,
    checker_timeout: Duration,
    partition: String,
    started: &mut HashSet<String>
) {
    if !started.insert(partition.clone()) {
        return;
    }
    let bus = bus.clone();
    let store = store.clone();
    let checkers = checkers.clone();
    tokio::spawn(async move {
        run_partition(bus, store, checkers, checker_timeout, partition).await;
    });
}

async fn run_partition(
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn ReportStore>,
    checkers: Arc<Vec<Box<dyn AuditChecker>>>,
    checker_timeout: Duration,
    partition: String
) {
    let mut stream = bus.subscribe(&partition);
    info!(partition = %partition, "audit consumer started");

    while let Some(message) = stream.next().await {
        process_event(&store, &checkers, checker_timeout, message).await;
    }

    debug!(partition = %partition, "audit consumer stream ended");
}

async fn process_event(
    store: &Arc<dyn ReportStore>,
    checkers: &[Box<dyn AuditChecker>],
    checker_timeout: Duration,
    message: BusMessage
) {
    let event_id = message.event_id();

    let outcomes = futures_util::future::join_all(
        checkers.iter().map(|checker| run_checker(checker.as_ref(), &message.event, checker_timeout))
    )
    .await;

    for outcome in &outcomes {
        if let CheckerOutcome::TimedOut {
            checker_id
        } = outcome
        {
            warn!(event_id = %event_id, checker_id = %checker_id, "audit checker missed its deadline");
        }
    }

    let report = Report::new(event_id, message.partition.to_string(), message.event.sql.clone(), outcomes);

    if let Err(e) = store.upsert(report).await {
        warn!(error = %e, "failed to persist audit report");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sqlguard_audit::AuditEvent;

    use super::*;
    use crate::{bus::InMemoryBus, checkers::default_checkers, store::InMemoryReportStore};

    #[tokio::test]
    async fn published_event_produces_a_persisted_report() {
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
        let store: Arc<dyn ReportStore> = Arc::new(InMemoryReportStore::new());
        let checkers = Arc::new(default_checkers());

        bus.publish("orders-service", AuditEvent::builder("SELECT 1").build()).await.unwrap();

        let consumer = tokio::spawn(run_partition(
            bus.clone(),
            store.clone(),
            checkers.clone(),
            DEFAULT_CHECKER_TIMEOUT,
            "orders-service".to_string()
        ));

        bus.publish("orders-service", AuditEvent::builder("DELETE FROM t").build()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        consumer.abort();

        assert!(store.count().await >= 1);
    }
}
