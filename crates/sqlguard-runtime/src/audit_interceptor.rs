//! The audit interceptor: synthesizes a [`sqlguard_audit::AuditEvent`] from
//! the slot the safety interceptor populated plus the observed execution
//! outcome, and hands it to the writer without ever blocking the caller
//! (spec §4.6, §4.7).

use compact_str::CompactString;
use sqlguard_audit::{AuditEvent, AuditWriter, DbProduct};
use sqlguard_core::context::StatementContext;

use crate::interceptor::{Decision, ExecutionOutcome, Interceptor};
use crate::slot::ValidationSlot;

/// Static connection metadata this interceptor stamps onto every event it
/// emits. In a real deployment this would be read off the pool/driver the
/// interceptor wraps; it is fixed here because the interceptor itself has
/// no notion of "the current connection".
#[derive(Debug, Clone)]
pub struct ConnectionTag {
    pub db_name:    CompactString,
    pub db_type:    DbProduct,
    pub db_version: CompactString
}

/// The innermost interceptor in the registered chain (spec §4.6: its
/// `on_after_execute` must run before the safety interceptor's, i.e. while
/// the slot is still populated).
pub struct AuditInterceptor {
    writer:  AuditWriter,
    app:     CompactString,
    conn:    ConnectionTag
}

impl AuditInterceptor {
    pub fn new(writer: AuditWriter, app: impl Into<CompactString>, conn: ConnectionTag) -> Self {
        Self {
            writer,
            app: app.into(),
            conn
        }
    }
}

impl Interceptor for AuditInterceptor {
    fn on_before_execute(&self, _ctx: &StatementContext, _slot: &ValidationSlot) -> Decision {
        Decision::Proceed
    }

    fn on_after_execute(&self, ctx: &StatementContext, slot: &ValidationSlot, outcome: &ExecutionOutcome) {
        let validation = slot.get();

        let event = AuditEvent::builder(ctx.sql().to_string())
            .timestamp(outcome.ended_at)
            .app(self.app.clone())
            .kind(ctx.kind())
            .params(ctx.params().values())
            .time_ms(outcome.time_ms())
            .rows(outcome.rows_affected)
            .db_name(self.conn.db_name.clone())
            .db_type(self.conn.db_type)
            .db_version(self.conn.db_version.clone())
            .success(outcome.succeeded())
            .validation(validation.as_ref())
            .build();

        let event = match &outcome.error {
            Some(err) => AuditEvent {
                error: Some(err.clone()),
                ..event
            },
            None => event
        };

        self.writer.submit(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Utc;
    use sqlguard_core::{parser::ParserFacade, rules::{RiskLevel, ValidationResult}};
    use tokio::time::sleep;

    use super::*;

    fn ctx(sql: &str) -> StatementContext {
        let facade = ParserFacade::default();
        let ast = facade.parse(sql).unwrap();
        StatementContext::builder(sql).ast(ast).origin_id("svc-1").build()
    }

    #[tokio::test]
    async fn after_execute_submits_an_event_reflecting_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let (writer, handle) = AuditWriter::spawn(&path).await.unwrap();

        let interceptor = AuditInterceptor::new(
            writer.clone(),
            "orders-service",
            ConnectionTag {
                db_name:    "primary".into(),
                db_type:    DbProduct::Mysql,
                db_version: "8.0".into()
            }
        );

        let slot = ValidationSlot::new();
        slot.set(ValidationResult {
            passed:             false,
            violations:         vec![],
            highest_risk_level: RiskLevel::Critical
        });

        let ctx = ctx("DELETE FROM users");
        let started = Utc::now();
        sleep(StdDuration::from_millis(1)).await;
        let outcome = ExecutionOutcome::success(started, Utc::now(), 12);
        interceptor.on_after_execute(&ctx, &slot, &outcome);

        drop(writer);
        handle.shutdown(StdDuration::from_secs(2)).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["app"], "orders-service");
        assert_eq!(parsed["rows"], 12);
        assert_eq!(parsed["violations"]["highest"], "CRITICAL");
    }
}
