//! Audit event model and asynchronous JSONL sink (spec §3, §6, §7).
//!
//! This crate is deliberately thin: it knows how to shape a
//! [`sqlguard_core::validator::Validator`] result plus call metadata into the
//! canonical audit record, and how to get that record onto disk without
//! stalling the caller. It has no opinion on who calls it — `sqlguard-runtime`
//! wires it into the interceptor chain, and `sqlguard-audit-service` consumes
//! the same event shape off a message bus instead of a file.

pub mod event;
pub mod writer;

pub use event::{AuditEvent, AuditEventBuilder, AuditViolations, DbProduct, ParamJson, ViolationItem};
pub use writer::{AuditWriter, AuditWriterHandle, DEFAULT_CHANNEL_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT};
