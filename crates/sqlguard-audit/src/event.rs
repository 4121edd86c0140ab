//! The audit event model (spec §3 "Audit event", spec §6 canonical JSON).
//!
//! [`AuditEvent`] is immutable once built; [`AuditEventBuilder`] is the only
//! way to construct one, mirroring [`sqlguard_core::context::StatementContext`]'s
//! builder-only construction.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlguard_core::{
    context::{ParamValue, StatementKind},
    rules::{RiskLevel, ValidationResult, ViolationRecord}
};

/// Database product tag (spec §6 `db_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum DbProduct {
    Mysql,
    Postgresql,
    Oracle,
    Sqlserver,
    H2,
    Unknown
}

impl Default for DbProduct {
    fn default() -> Self {
        Self::Unknown
    }
}

/// One violation finding, reshaped into the canonical JSON field names
/// (`risk`/`message`/`suggestion`) from [`ViolationRecord`]'s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationItem {
    pub risk:       RiskLevel,
    pub message:    String,
    pub suggestion: String
}

impl From<&ViolationRecord> for ViolationItem {
    fn from(v: &ViolationRecord) -> Self {
        Self {
            risk:       v.risk_level,
            message:    v.message.clone(),
            suggestion: v.suggestion.clone()
        }
    }
}

/// The validator's findings, reshaped for the audit log line's `violations`
/// object (spec §6: `{passed, highest, items}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditViolations {
    pub passed:  bool,
    pub highest: RiskLevel,
    pub items:   Vec<ViolationItem>
}

impl From<&ValidationResult> for AuditViolations {
    fn from(result: &ValidationResult) -> Self {
        Self {
            passed:  result.passed,
            highest: result.highest_risk_level,
            items:   result.violations.iter().map(ViolationItem::from).collect()
        }
    }
}

/// A bound parameter, reshaped for JSON (spec §6 `params`: an array or
/// `null`). Unlike [`sqlguard_core::context::ParamBinding`] this drops the
/// name/position key — the audit log only needs the ordered values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamJson {
    Null,
    Bool(bool),
    Number(CompactString),
    Text(String)
}

impl From<&ParamValue> for ParamJson {
    fn from(v: &ParamValue) -> Self {
        match v {
            ParamValue::Null => Self::Null,
            ParamValue::Bool(b) => Self::Bool(*b),
            ParamValue::Number(n) => Self::Number(n.clone()),
            ParamValue::Text(t) => Self::Text(t.clone())
        }
    }
}

/// The immutable record emitted after every attempted SQL execution (spec
/// §3, §6). One JSON line per event; field names match the canonical
/// schema exactly so the audit service's bus consumer can deserialize
/// without translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp:  DateTime<Utc>,
    pub app:        CompactString,
    pub sql:        String,
    #[serde(rename = "type")]
    pub kind:       StatementKind,
    pub params:     Option<Vec<ParamJson>>,
    pub time_ms:    f64,
    pub rows:       i64,
    pub db_name:    CompactString,
    pub db_type:    DbProduct,
    pub db_version: CompactString,
    pub success:    bool,
    pub error:      Option<String>,
    pub violations: Option<AuditViolations>
}

impl AuditEvent {
    pub fn builder(sql: impl Into<String>) -> AuditEventBuilder {
        AuditEventBuilder::new(sql)
    }

    /// `sha256(timestamp || app || sql || thread_seq)` truncated to 128 bits,
    /// hex-encoded (spec §6, "Consumer is idempotent on eventId"). `thread_seq`
    /// disambiguates two events emitted in the same millisecond by the same
    /// thread for the same app+sql (e.g. a tight retry loop).
    pub fn event_id(&self, thread_seq: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(self.app.as_bytes());
        hasher.update(self.sql.as_bytes());
        hasher.update(thread_seq.to_le_bytes());
        let digest = hasher.finalize();
        hex_encode(&digest[..16])
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Builder for [`AuditEvent`]. Every field but `sql` and `kind` has a sane
/// default so callers that only have partial telemetry (e.g. a blocked
/// statement that never reached the driver) can still emit a well-formed
/// event.
pub struct AuditEventBuilder {
    timestamp:  DateTime<Utc>,
    app:        CompactString,
    sql:        String,
    kind:       StatementKind,
    params:     Option<Vec<ParamJson>>,
    time_ms:    f64,
    rows:       i64,
    db_name:    CompactString,
    db_type:    DbProduct,
    db_version: CompactString,
    success:    bool,
    error:      Option<String>,
    violations: Option<AuditViolations>
}

impl AuditEventBuilder {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            timestamp:  Utc::now(),
            app:        CompactString::new("unknown"),
            sql:        sql.into(),
            kind:       StatementKind::Other,
            params:     None,
            time_ms:    0.0,
            rows:       -1,
            db_name:    CompactString::new("default"),
            db_type:    DbProduct::Unknown,
            db_version: CompactString::new(""),
            success:    false,
            error:      None,
            violations: None
        }
    }

    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = ts;
        self
    }

    pub fn app(mut self, app: impl Into<CompactString>) -> Self {
        self.app = app.into();
        self
    }

    pub fn kind(mut self, kind: StatementKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn params<'a>(mut self, params: impl IntoIterator<Item = &'a ParamValue>) -> Self {
        self.params = Some(params.into_iter().map(ParamJson::from).collect());
        self
    }

    pub fn time_ms(mut self, time_ms: f64) -> Self {
        self.time_ms = time_ms.max(0.0);
        self
    }

    pub fn rows(mut self, rows: i64) -> Self {
        self.rows = rows;
        self
    }

    pub fn db_name(mut self, db_name: impl Into<CompactString>) -> Self {
        self.db_name = db_name.into();
        self
    }

    pub fn db_type(mut self, db_type: DbProduct) -> Self {
        self.db_type = db_type;
        self
    }

    pub fn db_version(mut self, db_version: impl Into<CompactString>) -> Self {
        self.db_version = db_version.into();
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn validation(mut self, result: Option<&ValidationResult>) -> Self {
        self.violations = result.map(AuditViolations::from);
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            timestamp:  self.timestamp,
            app:        self.app,
            sql:        self.sql,
            kind:       self.kind,
            params:     self.params,
            time_ms:    self.time_ms,
            rows:       self.rows,
            db_name:    self.db_name,
            db_type:    self.db_type,
            db_version: self.db_version,
            success:    self.success,
            error:      self.error,
            violations: self.violations
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_statement_event_carries_validation_and_no_rows() {
        let result = ValidationResult {
            passed:             false,
            violations:         vec![ViolationRecord::new(
                "no-where",
                RiskLevel::Critical,
                "DELETE without WHERE",
                "add a WHERE clause"
            )],
            highest_risk_level: RiskLevel::Critical
        };
        let event = AuditEvent::builder("DELETE FROM users")
            .app("orders-service")
            .kind(StatementKind::Delete)
            .success(false)
            .rows(-1)
            .validation(Some(&result))
            .build();

        assert!(!event.success);
        assert_eq!(event.rows, -1);
        let violations = event.violations.expect("validation attached");
        assert!(!violations.passed);
        assert_eq!(violations.items.len(), 1);
    }

    #[test]
    fn event_id_is_stable_for_identical_inputs() {
        let event = AuditEvent::builder("SELECT 1").build();
        assert_eq!(event.event_id(0), event.event_id(0));
        assert_ne!(event.event_id(0), event.event_id(1));
    }
}
