//! WHERE-quality group (spec §4.4): no-WHERE, dummy predicate, blacklisted
//! fields, and mandatory (whitelisted) fields. Risk decreases across the
//! group, CRITICAL down to MEDIUM.

use indexmap::IndexSet;
use sqlparser::ast::{Expr, Query, Statement};

use super::chassis::{ResultAccumulator, RiskLevel, RuleChecker, ViolationRecord, resolve_risk};
use crate::{
    config::Config,
    context::StatementContext,
    glob::GlobSet,
    parser::{
        extract::{extract_columns_from_expr, is_dummy_predicate},
        facts::{SelectFacts, mutation_facts}
    }
};

/// UPDATE/DELETE without a WHERE clause, unless the target table is
/// exempted.
pub struct NoWhereChecker {
    enabled:    bool,
    exemptions: GlobSet,
    risk:       RiskLevel
}

impl NoWhereChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled:    config.rules.is_enabled("no-where", true),
            exemptions: GlobSet::new(config.rules.exempt_tables("no-where").to_vec()),
            risk:       resolve_risk(config, "no-where", RiskLevel::Critical)
        }
    }

    fn check_mutation(&self, ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        let facts = mutation_facts(stmt);
        if facts.where_expr.is_some() {
            return;
        }
        if facts.tables.iter().any(|t| self.exemptions.matches(t)) {
            return;
        }
        acc.record(ViolationRecord::new(
            self.id(),
            self.risk,
            format!(
                "{} on {} has no WHERE clause",
                ctx.kind(),
                if facts.tables.is_empty() {
                    "target table".to_string()
                } else {
                    facts.tables.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
                }
            ),
            "Add a WHERE clause that scopes the statement to the intended rows, or exempt the table explicitly if a full-table operation is intended."
        ));
    }
}

impl RuleChecker for NoWhereChecker {
    fn id(&self) -> &'static str {
        "no-where"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_update(&self, ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        self.check_mutation(ctx, stmt, acc);
    }

    fn visit_delete(&self, ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        self.check_mutation(ctx, stmt, acc);
    }
}

/// Rejects `WHERE 1=1`, `WHERE true`, `WHERE 'x'='x'`, or any other
/// constant-only, non-false predicate — on SELECT, UPDATE, or DELETE.
pub struct DummyPredicateChecker {
    enabled: bool,
    risk:    RiskLevel
}

impl DummyPredicateChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.rules.is_enabled("dummy-predicate", true),
            risk:    resolve_risk(config, "dummy-predicate", RiskLevel::Critical)
        }
    }

    fn flag(&self, expr: Option<&Expr>, acc: &mut ResultAccumulator) {
        let Some(expr) = expr else {
            return;
        };
        if is_dummy_predicate(expr) {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                "WHERE/HAVING clause is a constant, always-true predicate",
                "Replace the dummy predicate with a real condition referencing a column or bound parameter."
            ));
        }
    }
}

impl RuleChecker for DummyPredicateChecker {
    fn id(&self) -> &'static str {
        "dummy-predicate"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_select(&self, _ctx: &StatementContext, query: &Query, acc: &mut ResultAccumulator) {
        let facts = SelectFacts::collect(query);
        self.flag(facts.where_expr.as_ref(), acc);
        self.flag(facts.having_expr.as_ref(), acc);
    }

    fn visit_update(&self, _ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(mutation_facts(stmt).where_expr.as_ref(), acc);
    }

    fn visit_delete(&self, _ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(mutation_facts(stmt).where_expr.as_ref(), acc);
    }
}

/// Rejects a WHERE clause whose only non-constant conditions reference
/// configured low-selectivity columns (`deleted`, `status`, ...).
pub struct BlacklistFieldChecker {
    enabled:   bool,
    blacklist: Vec<String>,
    risk:      RiskLevel
}

impl BlacklistFieldChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled:   config.rules.is_enabled("blacklist-fields", true),
            blacklist: config.rules.blacklist_fields.clone(),
            risk:      resolve_risk(config, "blacklist-fields", RiskLevel::High)
        }
    }

    fn is_blacklisted(&self, column: &str) -> bool {
        self.blacklist.iter().any(|b| b.eq_ignore_ascii_case(column))
    }

    fn flag(&self, expr: Option<&Expr>, acc: &mut ResultAccumulator) {
        if self.blacklist.is_empty() {
            return;
        }
        let Some(expr) = expr else {
            return;
        };
        let mut columns = IndexSet::new();
        extract_columns_from_expr(expr, &mut columns);
        if columns.is_empty() {
            return;
        }
        if columns.iter().all(|c| self.is_blacklisted(c)) {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                format!(
                    "WHERE clause only references low-selectivity column(s): {}",
                    columns.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
                ),
                "Narrow the filter with a selective column (primary key, indexed identifier) in addition to the flag column."
            ));
        }
    }
}

impl RuleChecker for BlacklistFieldChecker {
    fn id(&self) -> &'static str {
        "blacklist-fields"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_select(&self, _ctx: &StatementContext, query: &Query, acc: &mut ResultAccumulator) {
        self.flag(SelectFacts::collect(query).where_expr.as_ref(), acc);
    }

    fn visit_update(&self, _ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(mutation_facts(stmt).where_expr.as_ref(), acc);
    }

    fn visit_delete(&self, _ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(mutation_facts(stmt).where_expr.as_ref(), acc);
    }
}

/// For a configured set of tables, requires that WHERE reference at least
/// one of the table's mandatory fields.
pub struct WhitelistFieldChecker {
    enabled:          bool,
    tables:           Vec<String>,
    mandatory_fields: Vec<String>,
    risk:             RiskLevel
}

impl WhitelistFieldChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled:          config.rules.is_enabled("whitelist-fields", true),
            tables:           config.rules.target_tables("whitelist-fields").to_vec(),
            mandatory_fields: config.rules.mandatory_fields("whitelist-fields").to_vec(),
            risk:             resolve_risk(config, "whitelist-fields", RiskLevel::Medium)
        }
    }

    fn applies_to(&self, tables: &[String]) -> bool {
        !self.tables.is_empty()
            && tables.iter().any(|t| self.tables.iter().any(|w| w.eq_ignore_ascii_case(t)))
    }

    fn flag(&self, tables: &[String], expr: Option<&Expr>, acc: &mut ResultAccumulator) {
        if self.mandatory_fields.is_empty() || !self.applies_to(tables) {
            return;
        }
        let mut columns = IndexSet::new();
        if let Some(expr) = expr {
            extract_columns_from_expr(expr, &mut columns);
        }
        let satisfied = columns
            .iter()
            .any(|c| self.mandatory_fields.iter().any(|m| m.eq_ignore_ascii_case(c)));
        if !satisfied {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                format!(
                    "WHERE clause does not reference any mandatory field ({})",
                    self.mandatory_fields.join(", ")
                ),
                "Add one of the table's mandatory fields to the WHERE clause."
            ));
        }
    }
}

impl RuleChecker for WhitelistFieldChecker {
    fn id(&self) -> &'static str {
        "whitelist-fields"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_select(&self, _ctx: &StatementContext, query: &Query, acc: &mut ResultAccumulator) {
        let facts = SelectFacts::collect(query);
        let tables: Vec<String> = facts.tables.iter().map(|t| t.to_string()).collect();
        self.flag(&tables, facts.where_expr.as_ref(), acc);
    }

    fn visit_update(&self, _ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        let facts = mutation_facts(stmt);
        let tables: Vec<String> = facts.tables.iter().map(|t| t.to_string()).collect();
        self.flag(&tables, facts.where_expr.as_ref(), acc);
    }

    fn visit_delete(&self, _ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        let facts = mutation_facts(stmt);
        let tables: Vec<String> = facts.tables.iter().map(|t| t.to_string()).collect();
        self.flag(&tables, facts.where_expr.as_ref(), acc);
    }
}
