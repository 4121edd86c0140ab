//! Shared runtime state for the audit service daemon.
//!
//! `AppState` is cheap to clone (everything inside is already `Arc`-backed
//! or `Copy`) and is handed to every axum handler via `State<Arc<AppState>>`.

use std::sync::Arc;

use crate::{bus::MessageBus, store::SharedReportStore};

/// Static build metadata surfaced on `GET /v1/health`.
#[derive(Clone, Debug, serde::Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: "sqlguard-audit-service",
            version: env!("CARGO_PKG_VERSION")
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub bus:   Arc<dyn MessageBus>,
    pub store: SharedReportStore,
    pub build: BuildInfo
}

impl AppState {
    pub fn new(bus: Arc<dyn MessageBus>, store: SharedReportStore) -> Self {
        Self {
            bus,
            store,
            build: BuildInfo::default()
        }
    }
}
