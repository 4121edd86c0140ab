//! `sqlguard-audit-serviced`: the post-execution audit daemon (spec §4.8).
//!
//! Wires the JSONL-to-bus tailer, the report store, the consumer pool, and
//! the read API together and serves them until the process is killed.

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use sqlguard_audit_service::{
    api::build_router,
    bus::{InMemoryBus, MessageBus},
    checkers::default_checkers,
    consumer::{self, ConsumerConfig},
    state::AppState,
    store::InMemoryReportStore,
    tailer
};

/// Default location of the JSONL audit trail `sqlguard-runtime`'s
/// `AuditInterceptor` appends to, overridable via `SQLGUARD_AUDIT_LOG_PATH`
/// so a production deployment can point this daemon at the path the
/// producing application was configured with.
const DEFAULT_AUDIT_LOG_PATH: &str = "audit.jsonl";

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .compact()
        .init();

    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
    let store = Arc::new(InMemoryReportStore::new());
    let checkers = Arc::new(default_checkers());

    let audit_log_path: PathBuf = env::var("SQLGUARD_AUDIT_LOG_PATH")
        .unwrap_or_else(|_| DEFAULT_AUDIT_LOG_PATH.to_string())
        .into();
    tracing::info!(path = %audit_log_path.display(), "tailing audit log onto the bus");
    tokio::spawn(tailer::run(audit_log_path, bus.clone()));

    tokio::spawn(consumer::run(bus.clone(), store.clone(), checkers, ConsumerConfig::default(), Vec::new()));

    let state = Arc::new(AppState::new(bus, store));
    let router = build_router(state);

    let addr: SocketAddr = env::var("SQLGUARD_AUDIT_SERVICE_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8089".to_string())
        .parse()?;

    tracing::info!(%addr, "sqlguard-audit-serviced listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
