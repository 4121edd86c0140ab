use std::time::Duration;

use sqlguard_audit::{AuditEvent, AuditWriter, DbProduct};
use sqlguard_core::context::StatementKind;

#[tokio::test]
async fn events_round_trip_through_the_jsonl_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("audit.jsonl");
    let (writer, handle) = AuditWriter::spawn(&path).await.unwrap();

    let event = AuditEvent::builder("SELECT * FROM users WHERE id = ?")
        .app("billing-service")
        .kind(StatementKind::Select)
        .rows(1)
        .time_ms(4.2)
        .db_name("primary")
        .db_type(DbProduct::Postgresql)
        .db_version("16.2")
        .success(true)
        .build();
    writer.submit(event);

    drop(writer);
    handle.shutdown(Duration::from_secs(2)).await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let line = contents.lines().next().expect("one line written");
    let parsed: serde_json::Value = serde_json::from_str(line).unwrap();

    assert_eq!(parsed["app"], "billing-service");
    assert_eq!(parsed["type"], "SELECT");
    assert_eq!(parsed["db_type"], "postgresql");
    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["rows"], 1);
}
