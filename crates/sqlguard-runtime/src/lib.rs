//! Interceptor contract, strategy enforcement, and the pool/ORM/driver
//! adapters that sit between an application's SQL execution call and the
//! database (spec §4.6).
//!
//! `sqlguard-core` only detects; this crate decides what to do about it and
//! is the only place `sqlguard-audit`'s writer gets wired in.

pub mod adapters;
pub mod audit_interceptor;
pub mod error;
pub mod interceptor;
pub mod slot;
pub mod strategy;

pub use adapters::{DriverSpyInterceptor, ExecutionGuard, OrmInterceptor, PoolInterceptor};
pub use audit_interceptor::{AuditInterceptor, ConnectionTag};
pub use error::SafetyViolation;
pub use interceptor::{Decision, ExecutionOutcome, Interceptor, InterceptorChain, SafetyInterceptor};
pub use slot::{ThreadLocalSlot, ValidationSlot};
pub use strategy::{RuntimeConfig, ViolationStrategy};
