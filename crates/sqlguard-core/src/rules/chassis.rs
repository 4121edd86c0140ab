//! The rule chassis: [`RiskLevel`], [`ViolationRecord`], [`ResultAccumulator`],
//! and the [`RuleChecker`] template-method trait every concrete checker in
//! `sqlguard_core::rules` implements.
//!
//! A concrete checker overrides one or more of `visit_select`/`visit_update`/
//! `visit_delete`/`visit_insert`/`visit_other`; the default `check` dispatches
//! into those based on the context's AST the same way `AstHandle::visit`
//! does, so a checker never matches on `Statement` itself. A checker whose
//! contract needs the full statement list (`MultiStatementChecker`) overrides
//! `check` directly instead.

use std::collections::HashMap;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{Query, Statement};

use crate::context::StatementContext;

/// Ordered from least to most severe; `#[derive(Ord)]` relies on this
/// declaration order (spec §3: "`highestRiskLevel` equals the max over
/// recorded violations").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Safe
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Safe => "SAFE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL"
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(())
        }
    }
}

/// Resolves the effective risk level for checker `id`: a configured
/// `rules.severity.<id>` override if present and parseable, else `default`
/// (spec §4.4: "Risk levels and defaults are fixed but configurable").
pub fn resolve_risk(config: &crate::config::Config, id: &str, default: RiskLevel) -> RiskLevel {
    config
        .rules
        .severity_override(id)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// One finding raised by a checker.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationRecord {
    pub rule_id:    CompactString,
    pub risk_level: RiskLevel,
    pub message:    String,
    pub suggestion: String,
    pub code:       Option<CompactString>
}

impl ViolationRecord {
    pub fn new(
        rule_id: &'static str,
        risk_level: RiskLevel,
        message: impl Into<String>,
        suggestion: impl Into<String>
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            risk_level,
            message: message.into(),
            suggestion: suggestion.into(),
            code: None
        }
    }

    pub fn with_code(mut self, code: impl Into<CompactString>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// The finished, immutable outcome of one `validate` call.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub passed:            bool,
    pub violations:        Vec<ViolationRecord>,
    pub highest_risk_level: RiskLevel
}

/// Fixed compile-time early-return table (spec §4.3): `source checker id` ->
/// the checker ids it suppresses once it fires. Not configurable — adding an
/// entry is a code change, matching "the mapping is a fixed compile-time
/// table, not dynamic".
///
/// `multi-statement` suppresses every other structural rule because the AST
/// handed to those checkers only reflects the first of several top-level
/// statements; findings about it in isolation would be misleading once a
/// second statement is known to follow (Open Question, resolved in
/// DESIGN.md).
const EARLY_RETURN_TABLE: &[(&str, &[&str])] = &[
    ("no-condition-pagination", &["deep-offset"]),
    (
        "multi-statement",
        &[
            "set-operation",
            "sql-comment",
            "into-outfile",
            "ddl",
            "dangerous-function",
            "stored-procedure",
            "metadata-statement",
            "set-statement",
            "denied-table",
            "read-only-table",
            "no-where",
            "dummy-predicate",
            "blacklist-fields",
            "whitelist-fields",
            "no-condition-pagination",
            "deep-offset",
            "large-page-size",
            "missing-order-by",
            "no-pagination"
        ]
    )
];

/// Per-validate-call accumulator threaded through the orchestrator.
///
/// `passed` starts `true` and flips to `false` the moment any violation is
/// recorded — an empty accumulator is, by definition, SAFE (spec §3
/// invariant).
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    passed:         bool,
    violations:     Vec<ViolationRecord>,
    highest_risk:   RiskLevel,
    side_channel:   HashMap<CompactString, bool>
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self {
            passed:       true,
            violations:   Vec::new(),
            highest_risk: RiskLevel::Safe,
            side_channel: HashMap::new()
        }
    }

    pub fn record(&mut self, violation: ViolationRecord) {
        if violation.risk_level > self.highest_risk {
            self.highest_risk = violation.risk_level;
        }
        self.passed = false;
        self.violations.push(violation);
    }

    /// Looks up [`EARLY_RETURN_TABLE`] for `source_id` and marks every
    /// checker it names as "skip" in the side-channel.
    pub fn trigger_early_return(&mut self, source_id: &str) {
        for (src, targets) in EARLY_RETURN_TABLE {
            if *src == source_id {
                for target in *targets {
                    self.side_channel.insert(CompactString::new(*target), true);
                }
            }
        }
    }

    pub fn should_skip(&self, checker_id: &str) -> bool {
        self.side_channel.get(checker_id).copied().unwrap_or(false)
    }

    pub fn highest_risk_level(&self) -> RiskLevel {
        self.highest_risk
    }

    pub fn violations(&self) -> &[ViolationRecord] {
        &self.violations
    }

    pub fn finish(self) -> ValidationResult {
        ValidationResult {
            passed:             self.passed,
            violations:         self.violations,
            highest_risk_level: self.highest_risk
        }
    }
}

/// A single property of a statement, checked against the shared AST.
///
/// Concrete checkers are constructed once from [`crate::config::Config`] (see
/// each rule module's `from_config`), baking in their enabled flag, glob
/// sets, and thresholds at registration time rather than re-reading
/// configuration on every `check` call — glob sets in particular are "built
/// once at checker-registration time, never recompiled per call" (see
/// `crate::glob`).
///
/// `id` must be the stable kebab-case identifier used in configuration,
/// diagnostics, and [`EARLY_RETURN_TABLE`].
pub trait RuleChecker: Send + Sync {
    fn id(&self) -> &'static str;

    /// Whether this checker runs at all. Baked in at construction time from
    /// `rules.<id>.enabled`.
    fn is_enabled(&self) -> bool;

    fn visit_select(&self, _ctx: &StatementContext, _query: &Query, _acc: &mut ResultAccumulator) {}

    fn visit_update(&self, _ctx: &StatementContext, _stmt: &Statement, _acc: &mut ResultAccumulator) {}

    fn visit_delete(&self, _ctx: &StatementContext, _stmt: &Statement, _acc: &mut ResultAccumulator) {}

    fn visit_insert(&self, _ctx: &StatementContext, _stmt: &Statement, _acc: &mut ResultAccumulator) {}

    fn visit_other(&self, _ctx: &StatementContext, _stmt: &Statement, _acc: &mut ResultAccumulator) {}

    /// Template method: dispatches on the context's AST top-level kind.
    /// Checkers that need the full statement list (multi-statement
    /// detection) override this instead of the `visit_*` hooks.
    fn check(&self, ctx: &StatementContext, acc: &mut ResultAccumulator) {
        let Some(ast) = ctx.ast() else {
            return;
        };
        match ast.primary() {
            Some(Statement::Query(query)) => self.visit_select(ctx, query, acc),
            Some(
                stmt @ Statement::Update {
                    ..
                }
            ) => self.visit_update(ctx, stmt, acc),
            Some(stmt @ Statement::Delete(_)) => self.visit_delete(ctx, stmt, acc),
            Some(stmt @ Statement::Insert(_)) => self.visit_insert(ctx, stmt, acc),
            Some(stmt) => self.visit_other(ctx, stmt, acc),
            None => {}
        }
    }
}
