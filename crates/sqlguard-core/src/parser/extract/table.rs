use compact_str::CompactString;
use indexmap::IndexSet;

use super::{ExtractionContext, set_expr::extract_from_set_expr};

/// Walks a FROM/JOIN table reference, folding table names into
/// `ctx.tables` and, for derived tables, recursing into the subquery so its
/// own function calls and set-operators fold into the same `ctx` — the
/// "walk sub-queries and CTEs" requirement shared by the set-operation and
/// dangerous-function checkers.
pub fn extract_from_table_factor(
    table_factor: &sqlparser::ast::TableFactor,
    ctx: &mut ExtractionContext<'_>
) {
    use sqlparser::ast::TableFactor;

    match table_factor {
        TableFactor::Table {
            name, ..
        } => {
            ctx.tables.insert(name.to_string().into());
        }
        TableFactor::Derived {
            subquery,
            alias,
            ..
        } => {
            if let Some(alias) = alias {
                ctx.tables
                    .insert(format!("(subquery) AS {}", alias.name.value).into());
            }
            extract_derived_subquery(subquery, ctx);
        }
        TableFactor::TableFunction {
            ..
        } => {}
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            extract_from_table_factor(&table_with_joins.relation, ctx);
            for join in &table_with_joins.joins {
                extract_from_table_factor(&join.relation, ctx);
            }
        }
        _ => {}
    }
}

/// Walks a derived-table/CTE subquery body. Table references fold directly
/// into `ctx.tables`; the subquery's own WHERE/JOIN/GROUP BY/HAVING columns
/// are scoped to a throwaway accumulator (they describe the subquery, not
/// the outer statement), while function calls and set-operators — which the
/// denylist and set-operation checkers must see regardless of nesting depth
/// — fold back into `ctx`.
pub fn extract_derived_subquery(subquery: &sqlparser::ast::Query, ctx: &mut ExtractionContext<'_>) {
    let mut sub_where = IndexSet::new();
    let mut sub_join = IndexSet::new();
    let mut sub_group = IndexSet::new();
    let mut sub_having = IndexSet::new();
    let mut sub_windows = Vec::new();
    let mut has_union = false;
    let mut has_distinct = false;
    let mut has_subquery = false;

    let mut sub_ctx = ExtractionContext {
        tables:        ctx.tables,
        where_cols:    &mut sub_where,
        join_cols:     &mut sub_join,
        group_cols:    &mut sub_group,
        having_cols:   &mut sub_having,
        window_funcs:  &mut sub_windows,
        functions:     ctx.functions,
        has_union:     &mut has_union,
        has_distinct:  &mut has_distinct,
        has_subquery:  &mut has_subquery,
        set_operators: ctx.set_operators
    };
    extract_from_set_expr(&subquery.body, &mut sub_ctx);
    if has_union {
        *ctx.has_union = true;
    }
    let _ = has_distinct;
}

/// Walks every CTE attached to `query.with`, folding their table/function/
/// set-operator facts into `ctx` the same way a derived subquery does.
pub fn extract_ctes(
    query: &sqlparser::ast::Query,
    ctx: &mut ExtractionContext<'_>,
    cte_names: &mut Vec<CompactString>
) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            cte_names.push(cte.alias.name.value.as_str().into());
            extract_derived_subquery(&cte.query, ctx);
        }
    }
}
