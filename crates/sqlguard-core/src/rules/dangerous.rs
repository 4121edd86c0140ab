//! Dangerous-operation group (spec §4.4): DDL, dangerous function calls, and
//! stored-procedure invocation. CRITICAL by default except stored-procedure,
//! which carries a MEDIUM risk level and a WARN-by-default strategy floor
//! (`sqlguard_runtime::strategy::RuntimeConfig::resolve`) rather than BLOCK.

use sqlparser::ast::Statement;

use super::chassis::{ResultAccumulator, RiskLevel, RuleChecker, ViolationRecord, resolve_risk};
use crate::{
    config::Config,
    context::StatementContext,
    glob::GlobSet,
    parser::facts::{SelectFacts, all_function_calls}
};

fn classify_ddl(stmt: &Statement) -> Option<&'static str> {
    match stmt {
        Statement::CreateTable(_) => Some("CREATE"),
        Statement::AlterTable {
            ..
        } => Some("ALTER"),
        Statement::Drop {
            ..
        } => Some("DROP"),
        Statement::Truncate {
            ..
        } => Some("TRUNCATE"),
        _ => None
    }
}

/// Rejects CREATE/ALTER/DROP/TRUNCATE unless the specific operation is in
/// the configured allow-list.
pub struct DdlChecker {
    enabled: bool,
    allowed: Vec<String>,
    risk:    RiskLevel
}

impl DdlChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.rules.is_enabled("ddl", true),
            allowed: config.rules.allowed_operations("ddl").to_vec(),
            risk:    resolve_risk(config, "ddl", RiskLevel::Critical)
        }
    }
}

impl RuleChecker for DdlChecker {
    fn id(&self) -> &'static str {
        "ddl"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_other(&self, _ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        let Some(kind) = classify_ddl(stmt) else {
            return;
        };
        if self.allowed.iter().any(|a| a.eq_ignore_ascii_case(kind)) {
            return;
        }
        acc.record(ViolationRecord::new(
            self.id(),
            self.risk,
            format!("{kind} is a DDL statement and is not in the allowed-operations list"),
            "Run schema changes through a migration tool outside the application's runtime path."
        ));
    }
}

/// Rejects function-call nodes whose name matches a configured denylist,
/// searched recursively through subqueries, CASE arms, ORDER BY, and
/// HAVING, with a visited-node cycle guard (see
/// `crate::parser::extract::expr::function_calls_in_expr_rooted`).
pub struct DangerousFunctionChecker {
    enabled:  bool,
    denylist: GlobSet,
    risk:     RiskLevel
}

impl DangerousFunctionChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled:  config.rules.is_enabled("dangerous-function", true),
            denylist: GlobSet::new(config.rules.denied_functions("dangerous-function").to_vec()),
            risk:     resolve_risk(config, "dangerous-function", RiskLevel::Critical)
        }
    }

    fn flag(&self, calls: impl IntoIterator<Item = String>, acc: &mut ResultAccumulator) {
        let hits: Vec<String> = calls.into_iter().filter(|c| self.denylist.matches(c)).collect();
        if !hits.is_empty() {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                format!("statement calls denylisted function(s): {}", hits.join(", ")),
                "Remove the call or move it behind an explicitly reviewed, allowlisted wrapper."
            ));
        }
    }
}

impl RuleChecker for DangerousFunctionChecker {
    fn id(&self) -> &'static str {
        "dangerous-function"
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
        self.flag(facts.function_calls.into_iter().map(|c| c.to_string()), acc);
    }

    fn visit_update(&self, _ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(all_function_calls(stmt), acc);
    }

    fn visit_delete(&self, _ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(all_function_calls(stmt), acc);
    }

    fn visit_insert(&self, _ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        self.flag(all_function_calls(stmt), acc);
    }
}

fn is_stored_procedure_call(stmt: &Statement) -> bool {
    match stmt {
        Statement::Call(_) => true,
        Statement::Execute {
            ..
        } => true,
        _ => false
    }
}

/// Detects `CALL`/`EXEC`/`EXECUTE` statements. The MEDIUM default risk level
/// here is informational only; the WARN-by-default behavior spec.md
/// documents comes from `sqlguard-runtime`'s strategy layer treating
/// `stored-procedure` as a rule with a built-in WARN floor rather than from
/// this risk level clearing (or not) `blockThreshold`.
pub struct StoredProcedureChecker {
    enabled: bool,
    risk:    RiskLevel
}

impl StoredProcedureChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.rules.is_enabled("stored-procedure", true),
            risk:    resolve_risk(config, "stored-procedure", RiskLevel::Medium)
        }
    }
}

impl RuleChecker for StoredProcedureChecker {
    fn id(&self) -> &'static str {
        "stored-procedure"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_other(&self, _ctx: &StatementContext, stmt: &Statement, acc: &mut ResultAccumulator) {
        if is_stored_procedure_call(stmt) {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                "statement invokes a stored procedure (CALL/EXEC/EXECUTE)",
                "Confirm the procedure's own body has been reviewed; raise this rule to BLOCK if it should never run from this path."
            ));
        }
    }
}
