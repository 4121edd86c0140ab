//! The post-execution audit daemon (spec §4.8). [`tailer`] bridges the JSONL
//! audit trail `sqlguard-runtime` writes onto [`bus`], [`consumer`] consumes
//! the resulting [`bus::BusMessage`]s, runs every [`checkers::AuditChecker`]
//! against each event, and persists the resulting [`store::Report`] for the
//! read API in [`api`].

pub mod api;
pub mod bus;
pub mod checkers;
pub mod consumer;
pub mod error;
pub mod state;
pub mod store;
pub mod tailer;

pub use bus::{BusMessage, InMemoryBus, MessageBus};
pub use checkers::{AuditChecker, CheckerFinding, CheckerOutcome, default_checkers};
pub use consumer::ConsumerConfig;
pub use error::{AppError, AppResult};
pub use state::AppState;
pub use store::{InMemoryReportStore, Report, ReportFilter, ReportStore};
