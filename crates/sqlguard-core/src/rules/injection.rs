//! Injection-group checkers (spec §4.4): multi-statement, set-operation,
//! SQL comment, and file-sink (`INTO OUTFILE`/`INTO DUMPFILE`) detection.
//! All CRITICAL by default.

use sqlparser::ast::Query;

use super::chassis::{ResultAccumulator, RiskLevel, RuleChecker, ViolationRecord, resolve_risk};
use crate::{config::Config, context::StatementContext, parser::facts::SelectFacts};

/// Rejects SQL carrying more than one top-level statement. A trailing `;` is
/// tolerated because the parser never emits an empty statement for it.
pub struct MultiStatementChecker {
    enabled: bool,
    risk:    RiskLevel
}

impl MultiStatementChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.rules.is_enabled("multi-statement", true),
            risk:    resolve_risk(config, "multi-statement", RiskLevel::Critical)
        }
    }
}

impl RuleChecker for MultiStatementChecker {
    fn id(&self) -> &'static str {
        "multi-statement"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &StatementContext, acc: &mut ResultAccumulator) {
        let Some(ast) = ctx.ast() else {
            return;
        };
        if ast.statements().len() > 1 {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                format!(
                    "SQL contains {} top-level statements separated by ';'",
                    ast.statements().len()
                ),
                "Execute exactly one statement per call; split the batch into separate calls."
            ));
            acc.trigger_early_return(self.id());
        }
    }
}

/// Rejects UNION/UNION ALL/INTERSECT/EXCEPT/MINUS unless the specific
/// operation label is in the configured allow-list. Walks subqueries and
/// CTEs via [`SelectFacts::set_operators`].
pub struct SetOperationChecker {
    enabled: bool,
    allowed: Vec<String>,
    risk:    RiskLevel
}

impl SetOperationChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.rules.is_enabled("set-operation", true),
            allowed: config.rules.allowed_operations("set-operation").to_vec(),
            risk:    resolve_risk(config, "set-operation", RiskLevel::Critical)
        }
    }

    fn is_allowed(&self, op: &str) -> bool {
        self.allowed.iter().any(|a| a.eq_ignore_ascii_case(op))
    }
}

impl RuleChecker for SetOperationChecker {
    fn id(&self) -> &'static str {
        "set-operation"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn visit_select(&self, _ctx: &StatementContext, query: &Query, acc: &mut ResultAccumulator) {
        let facts = SelectFacts::collect(query);
        let offending: Vec<&str> = facts
            .set_operators
            .iter()
            .map(|op| op.as_str())
            .filter(|op| !self.is_allowed(op))
            .collect();
        if !offending.is_empty() {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                format!("query uses disallowed set operation(s): {}", offending.join(", ")),
                "Rewrite as separate queries or add the operation to the set-operation allow-list if it is expected here."
            ));
        }
    }
}

/// Rejects `--`, `#`, and `/* ... */` comments found in the raw SQL text
/// outside string literals. `sqlparser` strips comments from the AST, so
/// this checker scans the text directly rather than walking the tree.
pub struct SqlCommentChecker {
    enabled:     bool,
    allow_hints: bool,
    risk:        RiskLevel
}

impl SqlCommentChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled:     config.rules.is_enabled("sql-comment", true),
            allow_hints: config.rules.allow_hint_comments("sql-comment"),
            risk: resolve_risk(config, "sql-comment", RiskLevel::Critical)
        }
    }
}

impl RuleChecker for SqlCommentChecker {
    fn id(&self) -> &'static str {
        "sql-comment"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &StatementContext, acc: &mut ResultAccumulator) {
        if let Some(kind) = find_comment_outside_strings(ctx.sql(), self.allow_hints) {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                format!("SQL contains a {kind} comment outside string literals"),
                "Remove the embedded comment; if it carries an optimizer hint, allowlist hint comments explicitly."
            ));
        }
    }
}

/// Scans `sql` for a comment marker outside single/double-quoted string
/// literals. Returns a human label for the first one found.
fn find_comment_outside_strings(sql: &str, allow_hints: bool) -> Option<&'static str> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    let mut in_single = false;
    let mut in_double = false;
    while i < bytes.len() {
        let c = bytes[i];
        if in_single {
            if c == b'\'' {
                in_single = false;
            }
            i += 1;
            continue;
        }
        if in_double {
            if c == b'"' {
                in_double = false;
            }
            i += 1;
            continue;
        }
        match c {
            b'\'' => {
                in_single = true;
                i += 1;
            }
            b'"' => {
                in_double = true;
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => return Some("'--' line"),
            b'#' => return Some("'#' line"),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                if allow_hints && bytes.get(i + 2) == Some(&b'+') {
                    // Skip past a `/*+ ... */` optimizer hint and keep scanning.
                    if let Some(end) = sql[i..].find("*/") {
                        i += end + 2;
                        continue;
                    }
                    return Some("block");
                }
                return Some("block");
            }
            _ => i += 1
        }
    }
    None
}

/// Rejects `SELECT ... INTO OUTFILE`/`INTO DUMPFILE` (MySQL file-sink
/// extension). `sqlparser`'s generic grammar does not model this clause as
/// AST nodes, so it is detected via the raw text, case-insensitively,
/// outside string literals.
pub struct FileSinkChecker {
    enabled: bool,
    risk:    RiskLevel
}

impl FileSinkChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.rules.is_enabled("into-outfile", true),
            risk:    resolve_risk(config, "into-outfile", RiskLevel::Critical)
        }
    }
}

impl RuleChecker for FileSinkChecker {
    fn id(&self) -> &'static str {
        "into-outfile"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &StatementContext, acc: &mut ResultAccumulator) {
        let upper = ctx.sql().to_ascii_uppercase();
        if upper.contains("INTO OUTFILE") || upper.contains("INTO DUMPFILE") {
            acc.record(ViolationRecord::new(
                self.id(),
                self.risk,
                "SELECT targets a file sink (INTO OUTFILE / INTO DUMPFILE)",
                "Remove the file-sink clause; export data through the application layer instead."
            ));
        }
    }
}
