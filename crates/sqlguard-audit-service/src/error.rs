//! Error constructors for the audit service (spec §7: `PersistenceFailure`
//! and friends), following the same `masterror::AppError` constructor-
//! function style as the other crates in this workspace.

pub use masterror::{AppError, AppResult};

pub fn bus_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Persistence failed after exhausting the configured retry budget; the
/// caller parks the event to the dead-letter log instead of propagating.
pub fn persistence_error(message: impl Into<String>) -> AppError {
    AppError::service(format!("persistence failure: {}", message.into()))
}

pub fn query_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}
