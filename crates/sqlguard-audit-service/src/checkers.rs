//! Audit checkers (spec §4.8): the post-execution counterpart to
//! `sqlguard-core`'s rule checkers. Unlike a `RuleChecker`, an
//! [`AuditChecker`] sees the finished [`AuditEvent`] — SQL text, the
//! validator's findings, *and* execution telemetry (`rows`, `time_ms`) — so
//! it can grade an offense by its observed blast radius rather than merely
//! detect it.

use std::time::Duration;

use compact_str::CompactString;
use sqlguard_audit::AuditEvent;
use sqlguard_core::rules::RiskLevel;

/// One finding contributed by a single checker against a single event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CheckerFinding {
    pub checker_id: CompactString,
    pub risk:       RiskLevel,
    pub message:    String
}

/// What happened when a checker ran against an event, including the
/// abandoned-on-timeout case (spec §7 `AuditCheckerTimeout`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckerOutcome {
    Finding(CheckerFinding),
    Clean { checker_id: CompactString },
    TimedOut { checker_id: CompactString }
}

/// A post-execution checker. Stateless and side-effect-free, same
/// statelessness requirement `sqlguard_core::rules::RuleChecker` carries —
/// the consumer runs every enabled checker concurrently against the same
/// event (spec §4.8, §5).
pub trait AuditChecker: Send + Sync {
    fn id(&self) -> &'static str;

    fn check(&self, event: &AuditEvent) -> Option<CheckerFinding>;
}

/// Runs `checker` against `event` under `budget`, translating the three
/// possible outcomes (finding / no finding / deadline missed) into one
/// [`CheckerOutcome`]. Checkers do no I/O and run to completion
/// synchronously before the timeout future is even polled, so none of the
/// built-in checkers can actually trip `TimedOut` today; the wrapper exists
/// because the spec requires every checker to be independently bounded, and
/// a future checker that does bounded CPU work via `spawn_blocking` would
/// rely on it.
pub async fn run_checker(checker: &dyn AuditChecker, event: &AuditEvent, budget: Duration) -> CheckerOutcome {
    let id = CompactString::from(checker.id());
    match tokio::time::timeout(budget, std::future::ready(checker.check(event))).await {
        Ok(Some(finding)) => CheckerOutcome::Finding(finding),
        Ok(None) => CheckerOutcome::Clean {
            checker_id: id
        },
        Err(_) => CheckerOutcome::TimedOut {
            checker_id: id
        }
    }
}

fn finding(checker_id: &'static str, risk: RiskLevel, message: impl Into<String>) -> CheckerFinding {
    CheckerFinding {
        checker_id: CompactString::from(checker_id),
        risk,
        message: message.into()
    }
}

/// Flags statements whose observed execution time crossed a threshold the
/// runtime path cannot see (it never executes the SQL itself).
pub struct SlowQueryChecker {
    threshold_ms: f64
}

impl SlowQueryChecker {
    pub fn new(threshold_ms: f64) -> Self {
        Self {
            threshold_ms
        }
    }
}

impl Default for SlowQueryChecker {
    fn default() -> Self {
        Self::new(1_000.0)
    }
}

impl AuditChecker for SlowQueryChecker {
    fn id(&self) -> &'static str {
        "slow-query"
    }

    fn check(&self, event: &AuditEvent) -> Option<CheckerFinding> {
        if event.time_ms < self.threshold_ms {
            return None;
        }
        let risk = if event.time_ms >= self.threshold_ms * 5.0 {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };
        Some(finding(
            self.id(),
            risk,
            format!("statement took {:.1}ms, threshold is {:.1}ms", event.time_ms, self.threshold_ms)
        ))
    }
}

/// Upgrades a runtime-side "no WHERE" warning once the observed
/// `rowsAffected` is known: the tranches from spec §4.8 (0 -> LOW, <10 ->
/// MEDIUM, <100 -> HIGH, >=100 -> CRITICAL).
pub struct ActualImpactNoWhereChecker;

impl AuditChecker for ActualImpactNoWhereChecker {
    fn id(&self) -> &'static str {
        "actual-impact-no-where"
    }

    fn check(&self, event: &AuditEvent) -> Option<CheckerFinding> {
        let flagged = event
            .violations
            .as_ref()
            .is_some_and(|v| v.items.iter().any(|i| i.message.to_ascii_lowercase().contains("where")));
        if !flagged || event.rows < 0 {
            return None;
        }

        let risk = match event.rows {
            0 => RiskLevel::Low,
            1 ..= 9 => RiskLevel::Medium,
            10 ..= 99 => RiskLevel::High,
            _ => RiskLevel::Critical
        };
        Some(finding(
            self.id(),
            risk,
            format!("unconditioned statement affected {} row(s)", event.rows)
        ))
    }
}

/// Surfaces database errors the runtime path never sees (deadlocks,
/// constraint violations, timeouts reported by the driver).
pub struct ErrorPatternChecker {
    patterns: Vec<String>
}

impl ErrorPatternChecker {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns
        }
    }
}

impl Default for ErrorPatternChecker {
    fn default() -> Self {
        Self::new(vec![
            "deadlock".to_string(),
            "lock wait timeout".to_string(),
            "constraint".to_string(),
            "connection reset".to_string(),
        ])
    }
}

impl AuditChecker for ErrorPatternChecker {
    fn id(&self) -> &'static str {
        "error-pattern"
    }

    fn check(&self, event: &AuditEvent) -> Option<CheckerFinding> {
        let error = event.error.as_ref()?;
        let lowered = error.to_ascii_lowercase();
        let matched = self.patterns.iter().find(|p| lowered.contains(p.as_str()))?;
        Some(finding(self.id(), RiskLevel::Medium, format!("matched error pattern '{matched}': {error}")))
    }
}

/// Flags a SELECT with no WHERE clause against a statement that was slow
/// enough, and touched enough rows, to look like an unindexed full scan
/// rather than an intentional small-table read.
pub struct FullTableScanChecker {
    min_time_ms: f64,
    min_rows:    i64
}

impl FullTableScanChecker {
    pub fn new(min_time_ms: f64, min_rows: i64) -> Self {
        Self {
            min_time_ms,
            min_rows
        }
    }
}

impl Default for FullTableScanChecker {
    fn default() -> Self {
        Self::new(200.0, 1_000)
    }
}

impl AuditChecker for FullTableScanChecker {
    fn id(&self) -> &'static str {
        "full-table-scan"
    }

    fn check(&self, event: &AuditEvent) -> Option<CheckerFinding> {
        if event.kind != sqlguard_core::context::StatementKind::Select {
            return None;
        }
        let lacks_where = !event.sql.to_ascii_uppercase().contains("WHERE");
        if !lacks_where || event.time_ms < self.min_time_ms || event.rows < self.min_rows {
            return None;
        }
        Some(finding(
            self.id(),
            RiskLevel::High,
            format!(
                "SELECT with no WHERE clause took {:.1}ms and returned {} rows, likely a full scan",
                event.time_ms, event.rows
            )
        ))
    }
}

/// Flags a paginated query whose OFFSET was deep enough, combined with
/// observed latency, to suggest the "skip N rows" cost actually showed up
/// at the database.
pub struct PaginationAbuseChecker {
    min_offset:  u64,
    min_time_ms: f64
}

impl PaginationAbuseChecker {
    pub fn new(min_offset: u64, min_time_ms: f64) -> Self {
        Self {
            min_offset,
            min_time_ms
        }
    }
}

impl Default for PaginationAbuseChecker {
    fn default() -> Self {
        Self::new(10_000, 500.0)
    }
}

impl AuditChecker for PaginationAbuseChecker {
    fn id(&self) -> &'static str {
        "pagination-abuse"
    }

    fn check(&self, event: &AuditEvent) -> Option<CheckerFinding> {
        if event.time_ms < self.min_time_ms {
            return None;
        }
        let offset = extract_offset(&event.sql)?;
        if offset < self.min_offset {
            return None;
        }
        Some(finding(
            self.id(),
            RiskLevel::Medium,
            format!("OFFSET {offset} took {:.1}ms to skip", event.time_ms)
        ))
    }
}

fn extract_offset(sql: &str) -> Option<u64> {
    let upper = sql.to_ascii_uppercase();
    let idx = upper.find("OFFSET")?;
    let rest = sql.get(idx + "OFFSET".len() ..)?;
    let digits: String = rest.trim_start().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Every checker this service ships with, in a stable order matching how
/// `sqlguard-core`'s `Orchestrator::from_config` builds its rule list.
pub fn default_checkers() -> Vec<Box<dyn AuditChecker>> {
    vec![
        Box::new(SlowQueryChecker::default()),
        Box::new(ActualImpactNoWhereChecker),
        Box::new(ErrorPatternChecker::default()),
        Box::new(FullTableScanChecker::default()),
        Box::new(PaginationAbuseChecker::default()),
    ]
}

#[cfg(test)]
mod tests {
    use sqlguard_core::context::StatementKind;

    use super::*;

    fn event() -> AuditEvent {
        AuditEvent::builder("DELETE FROM accounts")
            .kind(StatementKind::Delete)
            .success(true)
            .build()
    }

    #[tokio::test]
    async fn slow_query_checker_flags_over_threshold() {
        let checker = SlowQueryChecker::new(100.0);
        let mut e = event();
        e.time_ms = 150.0;
        let outcome = run_checker(&checker, &e, Duration::from_millis(200)).await;
        assert!(matches!(outcome, CheckerOutcome::Finding(_)));
    }

    #[tokio::test]
    async fn slow_query_checker_is_clean_under_threshold() {
        let checker = SlowQueryChecker::new(100.0);
        let mut e = event();
        e.time_ms = 10.0;
        let outcome = run_checker(&checker, &e, Duration::from_millis(200)).await;
        assert!(matches!(outcome, CheckerOutcome::Clean { .. }));
    }

    #[test]
    fn actual_impact_grades_by_rows_tranche() {
        use sqlguard_audit::{AuditViolations, ViolationItem};

        let checker = ActualImpactNoWhereChecker;
        let mut e = event();
        e.rows = 42;
        e.violations = Some(AuditViolations {
            passed:  false,
            highest: RiskLevel::Critical,
            items:   vec![ViolationItem {
                risk:       RiskLevel::Critical,
                message:    "DELETE with no WHERE clause".to_string(),
                suggestion: "add a WHERE clause".to_string()
            }]
        });

        let found = checker.check(&e).expect("should fire");
        assert_eq!(found.risk, RiskLevel::High);
    }

    #[test]
    fn extract_offset_parses_trailing_digits() {
        assert_eq!(extract_offset("SELECT * FROM t LIMIT 20 OFFSET 50000"), Some(50_000));
        assert_eq!(extract_offset("SELECT * FROM t"), None);
    }
}
