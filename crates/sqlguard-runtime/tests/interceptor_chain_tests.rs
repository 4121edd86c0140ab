use std::time::Duration;

use sqlguard_audit::{AuditWriter, DbProduct};
use sqlguard_core::{context::ParamBinding, parser::ParserFacade, validator::Validator};
use sqlguard_runtime::{
    AuditInterceptor, ConnectionTag, InterceptorChain, OrmInterceptor, RuntimeConfig, SafetyInterceptor
};

async fn build_chain(path: &std::path::Path) -> (InterceptorChain, sqlguard_audit::AuditWriterHandle) {
    let (writer, handle) = AuditWriter::spawn(path).await.unwrap();
    let chain = InterceptorChain::new(vec![
        Box::new(SafetyInterceptor::new(Validator::default(), RuntimeConfig::default())),
        Box::new(AuditInterceptor::new(
            writer,
            "reporting-service",
            ConnectionTag {
                db_name:    "analytics".into(),
                db_type:    DbProduct::Postgresql,
                db_version: "16.2".into()
            }
        )),
    ]);
    (chain, handle)
}

#[tokio::test]
async fn safe_select_proceeds_and_is_audited() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("audit.jsonl");
    let (chain, handle) = build_chain(&log_path).await;
    let orm = OrmInterceptor::new(chain, ParserFacade::default());

    let guard = orm
        .guard("SELECT id, name FROM accounts WHERE id = ?", "svc-reporting", ParamBinding::new(), "analytics")
        .expect("safe SELECT must proceed");
    guard.success(1);

    handle.shutdown(Duration::from_secs(2)).await.unwrap();

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let event: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(event["type"], "SELECT");
    assert_eq!(event["success"], true);
    assert!(event["violations"]["passed"].as_bool().unwrap());
}

#[tokio::test]
async fn critical_delete_without_where_is_blocked_before_execution() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("audit.jsonl");
    let (chain, handle) = build_chain(&log_path).await;
    let orm = OrmInterceptor::new(chain, ParserFacade::default());

    let result = orm.guard("DELETE FROM accounts", "svc-reporting", ParamBinding::new(), "analytics");
    let violation = result.expect_err("DELETE without WHERE must block");
    assert_eq!(violation.code, "SQL_SAFETY_VIOLATION");
    assert!(!violation.violations.is_empty());

    handle.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn failed_execution_records_error_on_the_audit_event() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("audit.jsonl");
    let (chain, handle) = build_chain(&log_path).await;
    let orm = OrmInterceptor::new(chain, ParserFacade::default());

    let guard = orm
        .guard("SELECT * FROM accounts WHERE id = ?", "svc-reporting", ParamBinding::new(), "analytics")
        .unwrap();
    guard.failure("connection reset by peer");

    handle.shutdown(Duration::from_secs(2)).await.unwrap();

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let event: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(event["success"], false);
    assert_eq!(event["error"], "connection reset by peer");
    assert_eq!(event["rows"], -1);
}
