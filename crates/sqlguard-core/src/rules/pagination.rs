//! Pagination group (spec §4.4): physical/logical classification plus five
//! checkers ranging CRITICAL (no-condition pagination) down to LOW (missing
//! ORDER BY), with a VARIABLE-risk no-pagination checker defaulting to
//! MEDIUM.

use indexmap::IndexSet;
use sqlparser::ast::Query;

use super::chassis::{ResultAccumulator, RiskLevel, RuleChecker, ViolationRecord, resolve_risk};
use crate::{
    config::Config,
    context::StatementContext,
    glob::GlobSet,
    parser::{extract::equality_columns, facts::SelectFacts}
};

const DEFAULT_MAX_OFFSET: u64 = 10_000;
const DEFAULT_MAX_PAGE_SIZE: u64 = 1_000;

/// A SELECT's pagination shape: PHYSICAL (LIMIT/OFFSET present in the SQL
/// text), LOGICAL (paging handled by the caller outside the SQL, signaled
/// via [`StatementContext::logical_pagination`]), or NONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationKind {
    Physical,
    Logical,
    None
}

pub fn classify(ctx: &StatementContext, facts: &SelectFacts) -> PaginationKind {
    if facts.pagination.is_present() {
        PaginationKind::Physical
    } else if ctx.logical_pagination().is_some() {
        PaginationKind::Logical
    } else {
        PaginationKind::None
    }
}

/// PHYSICAL pagination without a WHERE clause: a full table scan with a
/// LIMIT bolted on, which is worse than no pagination at all. Sets the
/// early-return hint that suppresses `deep-offset` (offset is meaningless
/// once the whole table is being scanned anyway).
pub struct NoConditionPaginationChecker {
    enabled: bool,
    risk:    RiskLevel
}

impl NoConditionPaginationChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.rules.is_enabled("no-condition-pagination", true),
            risk:    resolve_risk(config, "no-condition-pagination", RiskLevel::Critical)
        }
    }
}

impl RuleChecker for NoConditionPaginationChecker {
    fn id(&self) -> &'static str {
        "no-condition-pagination"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_select(&self, ctx: &StatementContext, query: &Query, acc: &mut ResultAccumulator) {
        let facts = SelectFacts::collect(query);
        if classify(ctx, &facts) == PaginationKind::Physical && facts.where_expr.is_none() {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                "paginated SELECT has no WHERE clause, so LIMIT/OFFSET only windows a full table scan",
                "Add a WHERE clause that scopes the scan before paginating over it."
            ));
            acc.trigger_early_return(self.id());
        }
    }
}

/// PHYSICAL pagination whose OFFSET exceeds the configured threshold.
/// Suppressed by [`NoConditionPaginationChecker`] via the early-return
/// table.
pub struct DeepOffsetChecker {
    enabled:    bool,
    max_offset: u64,
    risk:       RiskLevel
}

impl DeepOffsetChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled:    config.rules.is_enabled("deep-offset", true),
            max_offset: config.rules.max_offset("deep-offset", DEFAULT_MAX_OFFSET),
            risk:       resolve_risk(config, "deep-offset", RiskLevel::Medium)
        }
    }
}

impl RuleChecker for DeepOffsetChecker {
    fn id(&self) -> &'static str {
        "deep-offset"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_select(&self, ctx: &StatementContext, query: &Query, acc: &mut ResultAccumulator) {
        let facts = SelectFacts::collect(query);
        if classify(ctx, &facts) != PaginationKind::Physical {
            return;
        }
        if let Some(offset) = facts.pagination.offset
            && offset > self.max_offset
        {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                format!("OFFSET {offset} exceeds the configured threshold of {}", self.max_offset),
                "Use keyset/seek pagination (WHERE id > :last_seen) instead of a deep OFFSET."
            ));
        }
    }
}

/// LIMIT value above the configured page-size threshold.
pub struct LargePageSizeChecker {
    enabled:       bool,
    max_page_size: u64,
    risk:          RiskLevel
}

impl LargePageSizeChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled:       config.rules.is_enabled("large-page-size", true),
            max_page_size: config.rules.max_page_size("large-page-size", DEFAULT_MAX_PAGE_SIZE),
            risk:          resolve_risk(config, "large-page-size", RiskLevel::Medium)
        }
    }
}

impl RuleChecker for LargePageSizeChecker {
    fn id(&self) -> &'static str {
        "large-page-size"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_select(&self, _ctx: &StatementContext, query: &Query, acc: &mut ResultAccumulator) {
        let facts = SelectFacts::collect(query);
        if let Some(limit) = facts.pagination.limit
            && limit > self.max_page_size
        {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                format!(
                    "LIMIT {limit} exceeds the configured page-size threshold of {}",
                    self.max_page_size
                ),
                "Reduce the page size; fetch additional pages instead of one oversized one."
            ));
        }
    }
}

/// PHYSICAL pagination without ORDER BY: page boundaries are not stable
/// across calls without a deterministic sort.
pub struct MissingOrderByChecker {
    enabled: bool,
    risk:    RiskLevel
}

impl MissingOrderByChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.rules.is_enabled("missing-order-by", true),
            risk:    resolve_risk(config, "missing-order-by", RiskLevel::Low)
        }
    }
}

impl RuleChecker for MissingOrderByChecker {
    fn id(&self) -> &'static str {
        "missing-order-by"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_select(&self, ctx: &StatementContext, query: &Query, acc: &mut ResultAccumulator) {
        let facts = SelectFacts::collect(query);
        if classify(ctx, &facts) == PaginationKind::Physical && !facts.has_order_by {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                "paginated SELECT has no ORDER BY, so page boundaries are not stable across calls",
                "Add a deterministic ORDER BY (ideally over a unique key)."
            ));
        }
    }
}

/// SELECT with no pagination of any kind on a non-exempt table. Aggregate-
/// only projections and queries narrowed by an equality on a configured
/// "narrowing" column (`id`, `uuid`, `*_id`, ...) are exempt.
pub struct NoPaginationChecker {
    enabled:          bool,
    default_risk:     RiskLevel,
    exempt_tables:    GlobSet,
    narrowing_cols:   GlobSet
}

const DEFAULT_NARROWING_PATTERNS: &[&str] = &["id", "uuid", "*_id", "*_uuid"];

impl NoPaginationChecker {
    pub fn from_config(config: &Config) -> Self {
        let mut patterns: Vec<String> =
            config.rules.limiting_field_patterns("no-pagination").to_vec();
        if patterns.is_empty() {
            patterns = DEFAULT_NARROWING_PATTERNS.iter().map(|s| s.to_string()).collect();
        }
        Self {
            enabled:        config.rules.is_enabled("no-pagination", true),
            default_risk:   resolve_risk(config, "no-pagination", RiskLevel::Medium),
            exempt_tables:  GlobSet::new(config.rules.exempt_tables("no-pagination").to_vec()),
            narrowing_cols: GlobSet::new(patterns)
        }
    }
}

impl RuleChecker for NoPaginationChecker {
    fn id(&self) -> &'static str {
        "no-pagination"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_select(&self, ctx: &StatementContext, query: &Query, acc: &mut ResultAccumulator) {
        let facts = SelectFacts::collect(query);
        if classify(ctx, &facts) != PaginationKind::None {
            return;
        }
        if facts.projection_aggregate_only {
            return;
        }
        if facts.tables.iter().any(|t| self.exempt_tables.matches(t)) {
            return;
        }
        if let Some(where_expr) = &facts.where_expr {
            let mut eq_cols = IndexSet::new();
            equality_columns(where_expr, &mut eq_cols);
            if eq_cols.iter().any(|c| self.narrowing_cols.matches(c)) {
                return;
            }
        }
        acc.record(ViolationRecord::new(
            self.id(),
            self.default_risk,
            "SELECT has no pagination (no LIMIT, no caller-supplied logical paging) and is not narrowed by an equality on a unique-like column",
            "Add LIMIT/OFFSET pagination or filter by a unique identifier."
        ));
    }
}
