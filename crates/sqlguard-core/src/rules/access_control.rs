//! Access-control group (spec §4.4): metadata statements, bare `SET`,
//! denied-table, and read-only-table targets.

use sqlparser::ast::Statement;

use super::chassis::{ResultAccumulator, RiskLevel, RuleChecker, ViolationRecord, resolve_risk};
use crate::{
    config::Config,
    context::StatementContext,
    glob::TableGlobSet,
    parser::facts::{SelectFacts, mutation_facts}
};

fn first_keyword(sql: &str) -> String {
    sql.trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|tok| !tok.is_empty())
        .unwrap_or("")
        .to_ascii_uppercase()
}

/// Detects `SHOW`/`DESCRIBE`/`DESC`/`USE` at the statement root. These
/// variants differ across `sqlparser` dialects, so detection keys off the
/// leading keyword of the raw SQL text rather than matching every `Show*`
/// AST variant.
pub struct MetadataStatementChecker {
    enabled: bool,
    risk:    RiskLevel
}

impl MetadataStatementChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.rules.is_enabled("metadata-statement", true),
            risk:    resolve_risk(config, "metadata-statement", RiskLevel::Medium)
        }
    }
}

impl RuleChecker for MetadataStatementChecker {
    fn id(&self) -> &'static str {
        "metadata-statement"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &StatementContext, acc: &mut ResultAccumulator) {
        let keyword = first_keyword(ctx.sql());
        if matches!(keyword.as_str(), "SHOW" | "DESCRIBE" | "DESC" | "USE") {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                format!("statement is a metadata command ({keyword})"),
                "Metadata introspection should go through an admin tool, not the application's data path."
            ));
        }
    }
}

/// Detects a bare `SET ...` at the statement root without confusing it for
/// `UPDATE ... SET`: the leading keyword of the raw text disambiguates
/// trivially, since `UPDATE` always starts with `UPDATE`, never `SET`.
pub struct SetStatementChecker {
    enabled: bool,
    risk:    RiskLevel
}

impl SetStatementChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.rules.is_enabled("set-statement", true),
            risk:    resolve_risk(config, "set-statement", RiskLevel::Medium)
        }
    }
}

impl RuleChecker for SetStatementChecker {
    fn id(&self) -> &'static str {
        "set-statement"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &StatementContext, acc: &mut ResultAccumulator) {
        if first_keyword(ctx.sql()) == "SET" {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                "statement is a session-level SET command",
                "Session variables should be configured at connection setup, not per statement."
            ));
        }
    }
}

fn mutation_tables(ctx: &StatementContext) -> Vec<String> {
    ctx.ast()
        .and_then(|ast| ast.primary())
        .map(|stmt| mutation_facts(stmt).tables.into_iter().map(|t| t.to_string()).collect())
        .unwrap_or_default()
}

/// Rejects FROM/JOIN/UPDATE/DELETE/INSERT targets matching a glob pattern in
/// a denylist. `sys_*` means "starts with `sys_` followed by characters
/// other than `_`" (spec §4.4): `sys_user` matches, `system` does not, and
/// neither does `sys_a_b`, matched via [`crate::glob::TableGlobSet`].
pub struct DeniedTableChecker {
    enabled:  bool,
    denylist: TableGlobSet,
    risk:     RiskLevel
}

impl DeniedTableChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled:  config.rules.is_enabled("denied-table", true),
            denylist: TableGlobSet::new(config.rules.denied_tables_for("denied-table").to_vec()),
            risk:     resolve_risk(config, "denied-table", RiskLevel::High)
        }
    }

    fn flag(&self, tables: &[String], acc: &mut ResultAccumulator) {
        let hits: Vec<&str> =
            tables.iter().map(String::as_str).filter(|t| self.denylist.matches(t)).collect();
        if !hits.is_empty() {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                format!("statement references denied table(s): {}", hits.join(", ")),
                "Remove the reference or add an explicit exception to the denied-tables list."
            ));
        }
    }
}

impl RuleChecker for DeniedTableChecker {
    fn id(&self) -> &'static str {
        "denied-table"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_select(
        &self,
        _ctx: &StatementContext,
        query: &sqlparser::ast::Query,
        acc: &mut ResultAccumulator
    ) {
        let facts = SelectFacts::collect(query);
        let tables: Vec<String> = facts.tables.into_iter().map(|t| t.to_string()).collect();
        self.flag(&tables, acc);
    }

    fn visit_update(&self, ctx: &StatementContext, _stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(&mutation_tables(ctx), acc);
    }

    fn visit_delete(&self, ctx: &StatementContext, _stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(&mutation_tables(ctx), acc);
    }

    fn visit_insert(&self, ctx: &StatementContext, _stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(&mutation_tables(ctx), acc);
    }
}

/// Rejects UPDATE/DELETE/INSERT targets matching a read-only glob, same
/// `sys_*` → "no further `_`" star semantics as [`DeniedTableChecker`].
pub struct ReadOnlyTableChecker {
    enabled:   bool,
    read_only: TableGlobSet,
    risk:      RiskLevel
}

impl ReadOnlyTableChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled:   config.rules.is_enabled("read-only-table", true),
            read_only: TableGlobSet::new(config.rules.read_only_tables.clone()),
            risk:      resolve_risk(config, "read-only-table", RiskLevel::High)
        }
    }

    fn flag(&self, tables: &[String], acc: &mut ResultAccumulator) {
        let hits: Vec<&str> =
            tables.iter().map(String::as_str).filter(|t| self.read_only.matches(t)).collect();
        if !hits.is_empty() {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                format!("statement mutates read-only table(s): {}", hits.join(", ")),
                "This table is configured read-only; route writes through its owning service."
            ));
        }
    }
}

impl RuleChecker for ReadOnlyTableChecker {
    fn id(&self) -> &'static str {
        "read-only-table"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_update(&self, ctx: &StatementContext, _stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(&mutation_tables(ctx), acc);
    }

    fn visit_delete(&self, ctx: &StatementContext, _stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(&mutation_tables(ctx), acc);
    }

    fn visit_insert(&self, ctx: &StatementContext, _stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(&mutation_tables(ctx), acc);
    }
}
