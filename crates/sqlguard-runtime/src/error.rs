//! The one error kind that crosses back into the calling application (spec
//! §7: "only SafetyViolation propagates").

use compact_str::CompactString;
use sqlguard_core::rules::{RiskLevel, ValidationResult, ViolationRecord};

/// SQL text is truncated to this many bytes in the error payload (spec §6,
/// "the offending SQL (truncated to 2 KB)").
const MAX_SQL_BYTES: usize = 2048;

/// Raised by [`crate::interceptor::Interceptor::decide`] when one or more
/// rules fired and the active strategy is `BLOCK`. Carries everything the
/// spec's error payload requires: the fixed code, the full violation list,
/// the truncated offending SQL, and the origin-id.
#[derive(Debug, Clone)]
pub struct SafetyViolation {
    /// Always `SQL_SAFETY_VIOLATION` (spec §6). Kept as a field rather than
    /// a bare constant so callers can match on it without importing one
    /// more item.
    pub code:       &'static str,
    pub violations: Vec<ViolationRecord>,
    pub highest:    RiskLevel,
    /// The offending SQL, truncated to `MAX_SQL_BYTES` at a char boundary.
    pub sql:        String,
    pub origin_id:  CompactString
}

impl SafetyViolation {
    pub fn new(result: &ValidationResult, sql: &str, origin_id: impl Into<CompactString>) -> Self {
        Self {
            code:       "SQL_SAFETY_VIOLATION",
            violations: result.violations.clone(),
            highest:    result.highest_risk_level,
            sql:        truncate_sql(sql),
            origin_id:  origin_id.into()
        }
    }
}

impl std::fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {} violation(s), highest risk {} [origin={}]",
            self.code,
            self.highest,
            self.violations.len(),
            self.highest,
            self.origin_id
        )
    }
}

impl std::error::Error for SafetyViolation {}

fn truncate_sql(sql: &str) -> String {
    if sql.len() <= MAX_SQL_BYTES {
        return sql.to_string();
    }
    let mut end = MAX_SQL_BYTES;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    sql[.. end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_sql_is_truncated_to_2kb_at_a_char_boundary() {
        let sql = "x".repeat(3000);
        let result = ValidationResult {
            passed:             false,
            violations:         vec![],
            highest_risk_level: RiskLevel::Critical
        };
        let violation = SafetyViolation::new(&result, &sql, "svc-1");
        assert_eq!(violation.sql.len(), MAX_SQL_BYTES);
    }

    #[test]
    fn short_sql_is_kept_verbatim() {
        let result = ValidationResult {
            passed:             false,
            violations:         vec![],
            highest_risk_level: RiskLevel::Low
        };
        let violation = SafetyViolation::new(&result, "SELECT 1", "svc-1");
        assert_eq!(violation.sql, "SELECT 1");
    }
}
