//! The report store (spec §4.8): one record per audited event, upsert-
//! idempotent on `eventId`. [`InMemoryReportStore`] is the `DashMap`-backed
//! default (grounded in `oxigraph`'s use of `dashmap`); [`SqlitePersistentReportStore`]
//! is the production-shaped alternative, matching `clawde-io-apps`'s
//! `sqlx::SqlitePool` usage, with retry/backoff to a dead-letter log on
//! failure (spec §7 `PersistenceFailure`).

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sqlguard_core::rules::RiskLevel;
use sqlx::SqlitePool;
use tracing::{error, warn};

use crate::{
    checkers::CheckerOutcome,
    error::{AppResult, persistence_error}
};

/// One aggregated report (spec §4.8: `{eventId, appName, checkerFindings[],
/// overallRisk, processedAtTs}`).
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub event_id:         String,
    pub app_name:         String,
    pub sql:              String,
    pub checker_findings: Vec<CheckerOutcome>,
    pub overall_risk:     RiskLevel,
    pub processed_at:     DateTime<Utc>
}

impl Report {
    pub fn new(event_id: String, app_name: String, sql: String, checker_findings: Vec<CheckerOutcome>) -> Self {
        let overall_risk = checker_findings
            .iter()
            .filter_map(|o| match o {
                CheckerOutcome::Finding(f) => Some(f.risk),
                _ => None
            })
            .max()
            .unwrap_or(RiskLevel::Safe);

        Self {
            event_id,
            app_name,
            sql,
            checker_findings,
            overall_risk,
            processed_at: Utc::now()
        }
    }
}

/// Filter parameters for the read API (spec §6: `{appName, timeRange,
/// riskLevel, sqlPattern}`). `sqlPattern` substring-matches the original
/// SQL text carried on the audit event, not the application name.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub app_name:    Option<String>,
    pub since:       Option<DateTime<Utc>>,
    pub until:       Option<DateTime<Utc>>,
    pub risk_level:  Option<RiskLevel>,
    pub sql_pattern: Option<String>
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub offset: usize,
    pub limit:  usize
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn upsert(&self, report: Report) -> AppResult<()>;

    async fn query(&self, filter: &ReportFilter, page: &Page) -> AppResult<Vec<Report>>;

    async fn count(&self) -> usize;
}

/// `DashMap`-backed store keyed by `eventId`. Upsert overwrites in place,
/// matching the spec's "write is idempotent" requirement without needing a
/// read-modify-write transaction.
#[derive(Default)]
pub struct InMemoryReportStore {
    reports: DashMap<String, Report>
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn upsert(&self, report: Report) -> AppResult<()> {
        self.reports.insert(report.event_id.clone(), report);
        Ok(())
    }

    async fn query(&self, filter: &ReportFilter, page: &Page) -> AppResult<Vec<Report>> {
        let mut matched: Vec<Report> = self
            .reports
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| matches_filter(r, filter))
            .collect();
        matched.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        let limit = if page.limit == 0 { matched.len() } else { page.limit };
        Ok(matched.into_iter().skip(page.offset).take(limit).collect())
    }

    async fn count(&self) -> usize {
        self.reports.len()
    }
}

fn matches_filter(report: &Report, filter: &ReportFilter) -> bool {
    if let Some(app) = &filter.app_name {
        if &report.app_name != app {
            return false;
        }
    }
    if let Some(pattern) = &filter.sql_pattern {
        if !report.sql.contains(pattern.as_str()) {
            return false;
        }
    }
    if let Some(since) = filter.since {
        if report.processed_at < since {
            return false;
        }
    }
    if let Some(until) = filter.until {
        if report.processed_at > until {
            return false;
        }
    }
    if let Some(min_risk) = filter.risk_level {
        if report.overall_risk < min_risk {
            return false;
        }
    }
    true
}

/// Exponential backoff schedule for [`SqlitePersistentReportStore::upsert_with_retry`]
/// (spec §7: "retry with exponential backoff up to a configured cap").
const RETRY_BACKOFFS_MS: &[u64] = &[50, 200, 800];

/// SQLite-backed store. Schema is created on first use; a failed write
/// after exhausting `RETRY_BACKOFFS_MS` is appended to an in-process
/// dead-letter list rather than propagating, matching the spec's "park to a
/// dead-letter topic" (a full deployment would publish to a real dead-
/// letter bus partition instead of holding the list in memory).
pub struct SqlitePersistentReportStore {
    pool:         SqlitePool,
    dead_letters: DashMap<String, Report>
}

impl SqlitePersistentReportStore {
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| persistence_error(format!("failed to connect to {database_url}: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_reports (
                event_id TEXT PRIMARY KEY,
                app_name TEXT NOT NULL,
                sql TEXT NOT NULL,
                overall_risk TEXT NOT NULL,
                processed_at TEXT NOT NULL,
                findings_json TEXT NOT NULL
            )"
        )
        .execute(&pool)
        .await
        .map_err(|e| persistence_error(format!("failed to create schema: {e}")))?;

        Ok(Self {
            pool,
            dead_letters: DashMap::new()
        })
    }

    async fn write_once(&self, report: &Report) -> Result<(), sqlx::Error> {
        let findings_json = serde_json::to_string(&report.checker_findings).unwrap_or_default();
        sqlx::query(
            "INSERT INTO audit_reports (event_id, app_name, sql, overall_risk, processed_at, findings_json)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(event_id) DO UPDATE SET
                app_name = excluded.app_name,
                sql = excluded.sql,
                overall_risk = excluded.overall_risk,
                processed_at = excluded.processed_at,
                findings_json = excluded.findings_json"
        )
        .bind(&report.event_id)
        .bind(&report.app_name)
        .bind(&report.sql)
        .bind(report.overall_risk.to_string())
        .bind(report.processed_at.to_rfc3339())
        .bind(findings_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.len()
    }
}

#[async_trait]
impl ReportStore for SqlitePersistentReportStore {
    async fn upsert(&self, report: Report) -> AppResult<()> {
        let mut last_err = None;
        for backoff_ms in std::iter::once(0).chain(RETRY_BACKOFFS_MS.iter().copied()) {
            if backoff_ms > 0 {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
            match self.write_once(&report).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, event_id = %report.event_id, "audit report write failed, retrying");
                    last_err = Some(e);
                }
            }
        }

        error!(event_id = %report.event_id, "audit report parked to dead letter after exhausting retries");
        self.dead_letters.insert(report.event_id.clone(), report);
        Err(persistence_error(format!(
            "exhausted retries: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn query(&self, filter: &ReportFilter, page: &Page) -> AppResult<Vec<Report>> {
        let rows: Vec<(String, String, String, String, String, String)> =
            sqlx::query_as("SELECT event_id, app_name, sql, overall_risk, processed_at, findings_json FROM audit_reports ORDER BY processed_at DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| persistence_error(format!("query failed: {e}")))?;

        let mut matched = Vec::new();
        for (event_id, app_name, sql, overall_risk, processed_at, findings_json) in rows {
            let checker_findings: Vec<CheckerOutcome> = serde_json::from_str(&findings_json).unwrap_or_default();
            let report = Report {
                event_id,
                app_name,
                sql,
                checker_findings,
                overall_risk: overall_risk.parse().unwrap_or(RiskLevel::Safe),
                processed_at: DateTime::parse_from_rfc3339(&processed_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now())
            };
            if matches_filter(&report, filter) {
                matched.push(report);
            }
        }

        let limit = if page.limit == 0 { matched.len() } else { page.limit };
        Ok(matched.into_iter().skip(page.offset).take(limit).collect())
    }

    async fn count(&self) -> usize {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_reports")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0) as usize
    }
}

/// Shared-ownership handle used by the consumer and the axum API alike.
pub type SharedReportStore = Arc<dyn ReportStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::CheckerFinding;

    #[tokio::test]
    async fn upsert_then_query_roundtrips_a_report() {
        let store = InMemoryReportStore::new();
        let report = Report::new(
            "evt-1".to_string(),
            "orders-service".to_string(),
            "SELECT * FROM orders WHERE id = ?".to_string(),
            vec![CheckerOutcome::Finding(CheckerFinding {
                checker_id: "slow-query".into(),
                risk:       RiskLevel::Medium,
                message:    "slow".to_string()
            })]
        );
        store.upsert(report).await.unwrap();

        let results = store
            .query(
                &ReportFilter {
                    app_name: Some("orders-service".to_string()),
                    ..Default::default()
                },
                &Page::default()
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].overall_risk, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn duplicate_event_id_is_upsert_idempotent() {
        let store = InMemoryReportStore::new();
        store.upsert(Report::new("evt-1".to_string(), "svc".to_string(), "SELECT 1".to_string(), vec![])).await.unwrap();
        store.upsert(Report::new("evt-1".to_string(), "svc".to_string(), "SELECT 1".to_string(), vec![])).await.unwrap();
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn sql_pattern_filter_matches_the_original_statement_text() {
        let store = InMemoryReportStore::new();
        store
            .upsert(Report::new(
                "evt-1".to_string(),
                "orders-service".to_string(),
                "DELETE FROM orders WHERE id = ?".to_string(),
                vec![]
            ))
            .await
            .unwrap();
        store
            .upsert(Report::new(
                "evt-2".to_string(),
                "orders-service".to_string(),
                "SELECT * FROM orders".to_string(),
                vec![]
            ))
            .await
            .unwrap();

        let results = store
            .query(
                &ReportFilter {
                    sql_pattern: Some("DELETE".to_string()),
                    ..Default::default()
                },
                &Page::default()
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].event_id, "evt-1");
    }

    #[tokio::test]
    async fn risk_level_filter_excludes_lower_risk_reports() {
        let store = InMemoryReportStore::new();
        store
            .upsert(Report::new(
                "evt-low".to_string(),
                "svc".to_string(),
                "SELECT 1".to_string(),
                vec![CheckerOutcome::Finding(CheckerFinding {
                    checker_id: "slow-query".into(),
                    risk:       RiskLevel::Low,
                    message:    "m".to_string()
                })]
            ))
            .await
            .unwrap();

        let results = store
            .query(
                &ReportFilter {
                    risk_level: Some(RiskLevel::High),
                    ..Default::default()
                },
                &Page::default()
            )
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
