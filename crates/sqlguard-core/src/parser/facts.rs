//! One-shot fact extraction over an already-parsed statement.
//!
//! Every rule checker that needs more than the bare statement kind calls
//! [`SelectFacts::collect`] (for `SELECT`) or the small per-statement
//! accessors below (for `UPDATE`/`DELETE`/`INSERT`) against the shared
//! `&Statement` the orchestrator hands it. This walks the tree — it never
//! re-parses SQL, so it does not violate the parse-once invariant (spec §8,
//! property 1 is about the parser, not about expression-tree traversal).

use compact_str::CompactString;
use indexmap::IndexSet;
use sqlparser::ast::{Expr, Query, SetExpr, Statement};

use super::extract::{self, ExtractionContext};
use crate::parser::types::WindowFunction;

/// Offset/limit as written in the SQL text (or bound when the placeholder
/// value is statically known — callers that only have the text pass `None`
/// for placeholders, per spec §4.4 "unbound placeholder: skip").
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicalPagination {
    pub limit:              Option<u64>,
    pub offset:             Option<u64>,
    pub limit_is_parameter:  bool,
    pub offset_is_parameter: bool
}

impl PhysicalPagination {
    pub fn is_present(&self) -> bool {
        self.limit.is_some() || self.limit_is_parameter
    }
}

/// Everything the rule library's SELECT-oriented checkers need, computed in
/// one walk of the query body.
pub struct SelectFacts {
    pub tables:        IndexSet<CompactString>,
    pub cte_names:      Vec<CompactString>,
    pub where_expr:     Option<Expr>,
    pub having_expr:    Option<Expr>,
    pub function_calls: IndexSet<CompactString>,
    pub set_operators:  Vec<CompactString>,
    pub has_union:      bool,
    pub has_distinct:   bool,
    pub has_subquery:   bool,
    pub has_order_by:   bool,
    pub window_funcs:   Vec<WindowFunction>,
    pub pagination:     PhysicalPagination,
    pub projection_aggregate_only: bool,
    pub projection_has_columns:    bool
}

impl SelectFacts {
    pub fn collect(query: &Query) -> Self {
        let mut tables = IndexSet::new();
        let mut where_cols = IndexSet::new();
        let mut join_cols = IndexSet::new();
        let mut group_cols = IndexSet::new();
        let mut having_cols = IndexSet::new();
        let mut window_funcs = Vec::new();
        let mut functions = IndexSet::new();
        let mut set_operators = Vec::new();
        let mut has_union = false;
        let mut has_distinct = false;
        let mut has_subquery = false;
        let mut cte_names = Vec::new();

        {
            let mut ctx = ExtractionContext {
                tables:        &mut tables,
                where_cols:    &mut where_cols,
                join_cols:     &mut join_cols,
                group_cols:    &mut group_cols,
                having_cols:   &mut having_cols,
                window_funcs:  &mut window_funcs,
                functions:     &mut functions,
                has_union:     &mut has_union,
                has_distinct:  &mut has_distinct,
                has_subquery:  &mut has_subquery,
                set_operators: &mut set_operators
            };
            extract::table::extract_ctes(query, &mut ctx, &mut cte_names);
            extract::extract_from_set_expr(&query.body, &mut ctx);
        }

        let (where_expr, having_expr, projection_aggregate_only, projection_has_columns) =
            root_select(&query.body)
                .map(|select| {
                    (
                        select.selection.clone(),
                        select.having.clone(),
                        is_aggregate_only_projection(select),
                        !select.projection.is_empty()
                    )
                })
                .unwrap_or((None, None, false, false));

        let has_order_by = query.order_by.is_some();
        let pagination = extract_pagination(query);

        Self {
            tables,
            cte_names,
            where_expr,
            having_expr,
            function_calls: functions,
            set_operators,
            has_union,
            has_distinct,
            has_subquery,
            has_order_by,
            window_funcs,
            pagination,
            projection_aggregate_only,
            projection_has_columns
        }
    }
}

/// Descends through set-operation/parenthesized-query wrappers to the first
/// plain `SELECT` arm, used to read the query's own selection/having/
/// projection (a UNION's branches are walked separately by the extraction
/// context; this is only for the "root" SELECT's own clauses).
fn root_select(set_expr: &SetExpr) -> Option<&sqlparser::ast::Select> {
    match set_expr {
        SetExpr::Select(select) => Some(select),
        SetExpr::Query(query) => root_select(&query.body),
        SetExpr::SetOperation {
            left, ..
        } => root_select(left),
        _ => None
    }
}

const AGGREGATE_FUNCTIONS: &[&str] = &[
    "count", "sum", "avg", "min", "max", "group_concat", "string_agg", "array_agg", "bool_and",
    "bool_or", "stddev", "variance"
];

fn is_aggregate_only_projection(select: &sqlparser::ast::Select) -> bool {
    use sqlparser::ast::SelectItem;
    if select.projection.is_empty() {
        return false;
    }
    select.projection.iter().all(|item| match item {
        SelectItem::UnnamedExpr(e) | SelectItem::ExprWithAlias {
            expr: e, ..
        } => expr_is_aggregate_call(e),
        _ => false
    })
}

fn expr_is_aggregate_call(expr: &Expr) -> bool {
    match expr {
        Expr::Function(func) => {
            let name = func.name.to_string().to_ascii_lowercase();
            AGGREGATE_FUNCTIONS.iter().any(|agg| name == *agg || name.ends_with(&format!(".{agg}")))
        }
        Expr::Nested(e) | Expr::Cast {
            expr: e, ..
        } => expr_is_aggregate_call(e),
        _ => false
    }
}

fn extract_pagination(query: &Query) -> PhysicalPagination {
    use sqlparser::ast::{LimitClause, Value};

    let Some(clause) = &query.limit_clause else {
        return PhysicalPagination::default();
    };

    let mut pagination = PhysicalPagination::default();
    match clause {
        LimitClause::LimitOffset {
            limit,
            offset,
            ..
        } => {
            if let Some(limit_expr) = limit {
                apply_number_or_placeholder(
                    limit_expr,
                    &mut pagination.limit,
                    &mut pagination.limit_is_parameter
                );
            }
            if let Some(offset_clause) = offset {
                apply_number_or_placeholder(
                    &offset_clause.value,
                    &mut pagination.offset,
                    &mut pagination.offset_is_parameter
                );
            }
        }
        // MySQL `LIMIT m, n`: m is the offset, n is the page size. Do not
        // invert (spec §4.4, "Numeric/parameter semantics").
        LimitClause::OffsetCommaLimit {
            offset,
            limit
        } => {
            apply_number_or_placeholder(
                offset,
                &mut pagination.offset,
                &mut pagination.offset_is_parameter
            );
            apply_number_or_placeholder(
                limit,
                &mut pagination.limit,
                &mut pagination.limit_is_parameter
            );
        }
    }
    let _ = Value::Boolean(true);
    pagination
}

fn apply_number_or_placeholder(expr: &Expr, slot: &mut Option<u64>, is_param: &mut bool) {
    use sqlparser::ast::Value;
    match expr {
        Expr::Value(v) => match &v.value {
            Value::Number(n, _) => *slot = n.parse().ok(),
            Value::Placeholder(_) => *is_param = true,
            _ => {}
        },
        _ => *is_param = true
    }
}

/// `UPDATE`/`DELETE` selection (WHERE) and target table(s), plus `INSERT`
/// target table — these statement kinds need no full [`SelectFacts`] walk.
pub struct MutationFacts {
    pub tables:    Vec<CompactString>,
    pub where_expr: Option<Expr>
}

pub fn mutation_facts(stmt: &Statement) -> MutationFacts {
    match stmt {
        Statement::Update {
            table,
            selection,
            ..
        } => MutationFacts {
            tables:     vec![table.relation.to_string().into()],
            where_expr: selection.clone()
        },
        Statement::Delete(delete) => {
            let mut tables = Vec::new();
            if let sqlparser::ast::FromTable::WithFromKeyword(items)
            | sqlparser::ast::FromTable::WithoutKeyword(items) = &delete.from
            {
                for item in items {
                    tables.push(item.relation.to_string().into());
                }
            }
            MutationFacts {
                tables,
                where_expr: delete.selection.clone()
            }
        }
        Statement::Insert(insert) => MutationFacts {
            tables:     vec![insert.table.to_string().into()],
            where_expr: None
        },
        _ => MutationFacts {
            tables:     Vec::new(),
            where_expr: None
        }
    }
}

/// Every function-call name reachable from `stmt`, recursively, with a
/// visited-node guard against cyclic references (Design Notes, "cyclic AST
/// references"). Used by the dangerous-function and stored-procedure
/// checkers, which must see calls nested inside subqueries/CASE arms that a
/// single-pass [`SelectFacts`] walk intentionally keeps scoped to the
/// top statement's own function set when they appear inside UPDATE/DELETE
/// assignment expressions.
pub fn all_function_calls(stmt: &Statement) -> Vec<String> {
    let mut out = Vec::new();
    let mut visited = std::collections::HashSet::new();
    match stmt {
        Statement::Query(query) => {
            extract::expr::function_calls_in_query_rooted(query, &mut out, &mut visited)
        }
        Statement::Update {
            assignments,
            selection,
            ..
        } => {
            for assignment in assignments {
                extract::expr::function_calls_in_expr_rooted(
                    &assignment.value,
                    &mut out,
                    &mut visited
                );
            }
            if let Some(sel) = selection {
                extract::expr::function_calls_in_expr_rooted(sel, &mut out, &mut visited);
            }
        }
        Statement::Delete(delete) => {
            if let Some(sel) = &delete.selection {
                extract::expr::function_calls_in_expr_rooted(sel, &mut out, &mut visited);
            }
        }
        _ => {}
    }
    out
}
