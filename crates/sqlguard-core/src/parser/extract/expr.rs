use compact_str::CompactString;
use indexmap::IndexSet;

use crate::parser::types::WindowFunction;

pub fn extract_columns_from_expr(
    expr: &sqlparser::ast::Expr,
    columns: &mut IndexSet<CompactString>
) {
    extract_columns_and_functions(expr, columns, None);
}

/// Like [`extract_columns_from_expr`] but also records every function name
/// it walks past, regardless of whether the function carries an `OVER`
/// clause. Used to build the dangerous-function and stored-procedure
/// checkers' call-site inventory.
pub fn extract_columns_and_functions(
    expr: &sqlparser::ast::Expr,
    columns: &mut IndexSet<CompactString>,
    mut functions: Option<&mut IndexSet<CompactString>>
) {
    use sqlparser::ast::Expr;

    match expr {
        Expr::Identifier(ident) => {
            columns.insert(ident.value.as_str().into());
        }
        Expr::CompoundIdentifier(idents) => {
            if let Some(col) = idents.last() {
                columns.insert(col.value.as_str().into());
            }
        }
        Expr::BinaryOp {
            left,
            right,
            ..
        } => {
            extract_columns_and_functions(left, columns, functions.as_deref_mut());
            extract_columns_and_functions(right, columns, functions);
        }
        Expr::UnaryOp {
            expr, ..
        } => {
            extract_columns_and_functions(expr, columns, functions);
        }
        Expr::InList {
            expr,
            list,
            ..
        } => {
            extract_columns_and_functions(expr, columns, functions.as_deref_mut());
            for item in list {
                extract_columns_and_functions(item, columns, functions.as_deref_mut());
            }
        }
        Expr::InSubquery {
            expr, ..
        } => {
            extract_columns_and_functions(expr, columns, functions);
        }
        Expr::Subquery(_)
        | Expr::Exists {
            ..
        } => {}
        Expr::Between {
            expr,
            low,
            high,
            ..
        } => {
            extract_columns_and_functions(expr, columns, functions.as_deref_mut());
            extract_columns_and_functions(low, columns, functions.as_deref_mut());
            extract_columns_and_functions(high, columns, functions);
        }
        Expr::IsNull(e) | Expr::IsNotNull(e) => {
            extract_columns_and_functions(e, columns, functions);
        }
        Expr::Nested(e) => {
            extract_columns_and_functions(e, columns, functions);
        }
        Expr::Function(func) => {
            if let Some(funcs) = functions.as_deref_mut() {
                funcs.insert(func.name.to_string().to_ascii_lowercase().into());
            }
            if let sqlparser::ast::FunctionArguments::List(arg_list) = &func.args {
                for arg in &arg_list.args {
                    if let sqlparser::ast::FunctionArg::Unnamed(
                        sqlparser::ast::FunctionArgExpr::Expr(e)
                    ) = arg
                    {
                        extract_columns_and_functions(e, columns, functions.as_deref_mut());
                    }
                }
            }
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(op) = operand {
                extract_columns_and_functions(op, columns, functions.as_deref_mut());
            }
            for case_when in conditions {
                extract_columns_and_functions(
                    &case_when.condition,
                    columns,
                    functions.as_deref_mut()
                );
                extract_columns_and_functions(
                    &case_when.result,
                    columns,
                    functions.as_deref_mut()
                );
            }
            if let Some(else_res) = else_result {
                extract_columns_and_functions(else_res, columns, functions);
            }
        }
        Expr::Cast {
            expr, ..
        } => {
            extract_columns_and_functions(expr, columns, functions);
        }
        Expr::Extract {
            expr, ..
        } => {
            extract_columns_and_functions(expr, columns, functions);
        }
        _ => {}
    }
}

pub fn extract_window_functions(expr: &sqlparser::ast::Expr, windows: &mut Vec<WindowFunction>) {
    use sqlparser::ast::Expr;

    match expr {
        Expr::Function(func) => {
            if let Some(over) = &func.over {
                let mut partition_cols = Vec::new();
                let mut order_cols = Vec::new();

                if let sqlparser::ast::WindowType::WindowSpec(spec) = over {
                    for part_expr in &spec.partition_by {
                        if let Expr::Identifier(ident) = part_expr {
                            partition_cols.push(ident.value.as_str().into());
                        } else if let Expr::CompoundIdentifier(idents) = part_expr
                            && let Some(col) = idents.last()
                        {
                            partition_cols.push(col.value.as_str().into());
                        }
                    }

                    for order_expr in &spec.order_by {
                        if let Expr::Identifier(ident) = &order_expr.expr {
                            order_cols.push(ident.value.as_str().into());
                        } else if let Expr::CompoundIdentifier(idents) = &order_expr.expr
                            && let Some(col) = idents.last()
                        {
                            order_cols.push(col.value.as_str().into());
                        }
                    }
                }

                windows.push(WindowFunction {
                    name: func.name.to_string().into(),
                    partition_cols,
                    order_cols
                });
            }

            if let sqlparser::ast::FunctionArguments::List(arg_list) = &func.args {
                for arg in &arg_list.args {
                    if let sqlparser::ast::FunctionArg::Unnamed(
                        sqlparser::ast::FunctionArgExpr::Expr(e)
                    ) = arg
                    {
                        extract_window_functions(e, windows);
                    }
                }
            }
        }
        Expr::BinaryOp {
            left,
            right,
            ..
        } => {
            extract_window_functions(left, windows);
            extract_window_functions(right, windows);
        }
        Expr::Nested(e) => extract_window_functions(e, windows),
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(op) = operand {
                extract_window_functions(op, windows);
            }
            for cw in conditions {
                extract_window_functions(&cw.condition, windows);
                extract_window_functions(&cw.result, windows);
            }
            if let Some(e) = else_result {
                extract_window_functions(e, windows);
            }
        }
        _ => {}
    }
}

fn is_placeholder(expr: &sqlparser::ast::Expr) -> bool {
    use sqlparser::ast::{Expr, Value};
    matches!(expr, Expr::Value(v) if matches!(v.value, Value::Placeholder(_)))
}

fn contains_placeholder(expr: &sqlparser::ast::Expr) -> bool {
    use sqlparser::ast::Expr;
    if is_placeholder(expr) {
        return true;
    }
    match expr {
        Expr::BinaryOp {
            left,
            right,
            ..
        } => contains_placeholder(left) || contains_placeholder(right),
        Expr::UnaryOp {
            expr, ..
        }
        | Expr::Nested(expr)
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr) => contains_placeholder(expr),
        Expr::InList {
            expr,
            list,
            ..
        } => contains_placeholder(expr) || list.iter().any(contains_placeholder),
        Expr::Between {
            expr,
            low,
            high,
            ..
        } => {
            contains_placeholder(expr) || contains_placeholder(low) || contains_placeholder(high)
        }
        _ => false
    }
}

/// True if `expr` references neither a column nor a parameter placeholder
/// anywhere within it — the expression can only ever evaluate against
/// constants baked into the SQL text itself.
pub fn is_constant_only(expr: &sqlparser::ast::Expr) -> bool {
    let mut columns = IndexSet::new();
    extract_columns_from_expr(expr, &mut columns);
    columns.is_empty() && !contains_placeholder(expr)
}

fn is_literal_false(expr: &sqlparser::ast::Expr) -> bool {
    use sqlparser::ast::{Expr, Value};
    match expr {
        Expr::Value(v) => {
            matches!(v.value, Value::Boolean(false))
                || matches!(&v.value, Value::Number(n, _) if n == "0")
        }
        Expr::Nested(e) => is_literal_false(e),
        _ => false
    }
}

/// Classifies a WHERE/HAVING expression as a dummy predicate per spec
/// §4.4 (WHERE-quality group): constant-only (no column, no parameter) and
/// not the one exempted always-false literal (`WHERE 0`/`WHERE false`, which
/// legitimately excludes every row rather than bypassing the filter).
/// Matches `1=1`, `true`, `'x'='x'`, and any other non-zero bare literal.
pub fn is_dummy_predicate(expr: &sqlparser::ast::Expr) -> bool {
    is_constant_only(expr) && !is_literal_false(expr)
}

/// Collects the column names appearing as an operand of an `=` comparison
/// anywhere in `expr`, used by the pagination group's narrowing-column
/// exemption (`id = ?`, `uuid = ?`).
pub fn equality_columns(expr: &sqlparser::ast::Expr, out: &mut IndexSet<CompactString>) {
    use sqlparser::ast::{BinaryOperator, Expr};
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right
        } => {
            extract_columns_from_expr(left, out);
            extract_columns_from_expr(right, out);
        }
        Expr::BinaryOp {
            left,
            right,
            ..
        } => {
            equality_columns(left, out);
            equality_columns(right, out);
        }
        Expr::Nested(e) => equality_columns(e, out),
        _ => {}
    }
}

/// Pointer identity of an expression node, used only as a visited-set key to
/// guard against cyclic AST references (Design Notes). `sqlparser`'s tree is
/// ordinarily a DAG-free `Box` tree, but callers may hand us an `Arc`-shared
/// `AstHandle` reused across a cache; the guard costs one `HashSet` lookup
/// and is cheap insurance against a pathological future AST shape.
fn node_id(expr: &sqlparser::ast::Expr) -> usize {
    expr as *const sqlparser::ast::Expr as usize
}

/// Recursively collects every function call name reachable from `expr`,
/// including those nested inside subquery bodies, with a visited-node guard.
pub fn function_calls_in_expr_rooted(
    expr: &sqlparser::ast::Expr,
    out: &mut Vec<String>,
    visited: &mut std::collections::HashSet<usize>
) {
    use sqlparser::ast::{Expr, FunctionArg, FunctionArgExpr, FunctionArguments};

    if !visited.insert(node_id(expr)) {
        return;
    }

    match expr {
        Expr::Function(func) => {
            out.push(func.name.to_string().to_ascii_lowercase());
            if let FunctionArguments::List(arg_list) = &func.args {
                for arg in &arg_list.args {
                    if let FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) = arg {
                        function_calls_in_expr_rooted(e, out, visited);
                    }
                }
            }
        }
        Expr::BinaryOp {
            left,
            right,
            ..
        } => {
            function_calls_in_expr_rooted(left, out, visited);
            function_calls_in_expr_rooted(right, out, visited);
        }
        Expr::UnaryOp {
            expr, ..
        }
        | Expr::Nested(expr)
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::Cast {
            expr, ..
        }
        | Expr::Extract {
            expr, ..
        } => function_calls_in_expr_rooted(expr, out, visited),
        Expr::InList {
            expr,
            list,
            ..
        } => {
            function_calls_in_expr_rooted(expr, out, visited);
            for item in list {
                function_calls_in_expr_rooted(item, out, visited);
            }
        }
        Expr::Between {
            expr,
            low,
            high,
            ..
        } => {
            function_calls_in_expr_rooted(expr, out, visited);
            function_calls_in_expr_rooted(low, out, visited);
            function_calls_in_expr_rooted(high, out, visited);
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(op) = operand {
                function_calls_in_expr_rooted(op, out, visited);
            }
            for cw in conditions {
                function_calls_in_expr_rooted(&cw.condition, out, visited);
                function_calls_in_expr_rooted(&cw.result, out, visited);
            }
            if let Some(e) = else_result {
                function_calls_in_expr_rooted(e, out, visited);
            }
        }
        Expr::Subquery(query) | Expr::InSubquery {
            subquery: query, ..
        } => {
            function_calls_in_query_rooted(query, out, visited);
        }
        _ => {}
    }
}

/// Recursively collects every function call name reachable from a full
/// query body (projection, WHERE, HAVING, and nested subqueries/CTEs).
pub fn function_calls_in_query_rooted(
    query: &sqlparser::ast::Query,
    out: &mut Vec<String>,
    visited: &mut std::collections::HashSet<usize>
) {
    use sqlparser::ast::{SelectItem, SetExpr};

    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            function_calls_in_query_rooted(&cte.query, out, visited);
        }
    }

    fn walk_set_expr(
        set_expr: &sqlparser::ast::SetExpr,
        out: &mut Vec<String>,
        visited: &mut std::collections::HashSet<usize>
    ) {
        match set_expr {
            SetExpr::Select(select) => {
                for item in &select.projection {
                    if let SelectItem::UnnamedExpr(e) | SelectItem::ExprWithAlias {
                        expr: e, ..
                    } = item
                    {
                        function_calls_in_expr_rooted(e, out, visited);
                    }
                }
                if let Some(selection) = &select.selection {
                    function_calls_in_expr_rooted(selection, out, visited);
                }
                if let Some(having) = &select.having {
                    function_calls_in_expr_rooted(having, out, visited);
                }
            }
            SetExpr::SetOperation {
                left, right, ..
            } => {
                walk_set_expr(left, out, visited);
                walk_set_expr(right, out, visited);
            }
            SetExpr::Query(q) => function_calls_in_query_rooted(q, out, visited),
            _ => {}
        }
    }

    walk_set_expr(&query.body, out, visited);
}

pub fn contains_subquery(expr: &sqlparser::ast::Expr) -> bool {
    use sqlparser::ast::Expr;

    match expr {
        Expr::Subquery(_)
        | Expr::InSubquery {
            ..
        }
        | Expr::Exists {
            ..
        } => true,
        Expr::BinaryOp {
            left,
            right,
            ..
        } => contains_subquery(left) || contains_subquery(right),
        Expr::Nested(e) => contains_subquery(e),
        Expr::InList {
            expr,
            list,
            ..
        } => contains_subquery(expr) || list.iter().any(contains_subquery),
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            operand.as_ref().is_some_and(|o| contains_subquery(o))
                || conditions
                    .iter()
                    .any(|cw| contains_subquery(&cw.condition) || contains_subquery(&cw.result))
                || else_result.as_ref().is_some_and(|e| contains_subquery(e))
        }
        _ => false
    }
}
