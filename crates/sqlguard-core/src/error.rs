//! Error types and constructors shared across the validation pipeline.
//!
//! Every constructor returns a [`masterror::AppError`] so callers across the
//! workspace share one error type instead of each crate rolling its own.

pub use masterror::{AppError, AppResult};

/// The SQL failed to parse under the configured dialect.
///
/// Strict callers propagate this; lenient callers downgrade it to a single
/// low-severity violation and continue with an empty AST.
pub fn parse_error(message: impl Into<String>) -> AppError {
    let msg = message.into();
    AppError::bad_request(format_sql_error("SQL parse error", &msg))
}

/// A rule checker panicked or returned an internal error while running.
///
/// Never propagated to the caller; the orchestrator logs it and continues
/// with the remaining checkers.
pub fn rule_fault(rule_id: &str, message: impl Into<String>) -> AppError {
    AppError::internal(format!("rule '{}' faulted: {}", rule_id, message.into()))
}

/// One or more checkers fired and the active strategy is `Block`.
pub fn safety_violation(message: impl Into<String>) -> AppError {
    AppError::forbidden(message.into())
}

/// Invalid or unreadable configuration.
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Format SQL error with position highlighting, following sqlparser's
/// "Line: X, Column Y" message convention.
fn format_sql_error(prefix: &str, message: &str) -> String {
    if let Some(pos) = extract_position(message) {
        format!(
            "{prefix} at line {line}, column {column}:\n  {message}",
            prefix = prefix,
            line = pos.line,
            column = pos.column,
            message = message
        )
    } else {
        format!("{}:\n  {}", prefix, message)
    }
}

struct SqlPosition {
    line:   usize,
    column: usize
}

fn extract_position(message: &str) -> Option<SqlPosition> {
    let line_marker = "Line: ";
    let col_marker = ", Column ";
    let line_start = message.find(line_marker)?;
    let line_num_start = line_start + line_marker.len();
    let rest = message.get(line_num_start..)?;
    let col_start = rest.find(col_marker)?;
    let line_str = message.get(line_num_start..line_num_start + col_start)?;
    let col_num_start = line_num_start + col_start + col_marker.len();
    let col_rest = message.get(col_num_start..)?;
    let col_end = col_rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(col_rest.len());
    let col_str = message.get(col_num_start..col_num_start + col_end)?;
    let line = line_str.parse().ok()?;
    let column = col_str.parse().ok()?;
    Some(SqlPosition {
        line,
        column
    })
}
