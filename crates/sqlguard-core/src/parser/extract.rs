pub(crate) mod expr;
mod set_expr;
pub(crate) mod table;

use compact_str::CompactString;
pub use expr::{
    equality_columns, extract_columns_from_expr, is_constant_only, is_dummy_predicate
};
use indexmap::IndexSet;
pub use set_expr::extract_from_set_expr;
pub use table::extract_from_table_factor;

use super::types::WindowFunction;

/// Context threaded through the recursive AST walk, accumulating the column
/// and table references a checker needs without re-walking the tree itself.
pub struct ExtractionContext<'a> {
    pub tables:       &'a mut IndexSet<CompactString>,
    pub where_cols:   &'a mut IndexSet<CompactString>,
    pub join_cols:    &'a mut IndexSet<CompactString>,
    pub group_cols:   &'a mut IndexSet<CompactString>,
    pub having_cols:  &'a mut IndexSet<CompactString>,
    pub window_funcs: &'a mut Vec<WindowFunction>,
    pub functions:    &'a mut IndexSet<CompactString>,
    pub has_union:    &'a mut bool,
    pub has_distinct: &'a mut bool,
    pub has_subquery: &'a mut bool,
    /// Upper-cased set-operator keywords encountered (`UNION`, `UNION ALL`,
    /// `INTERSECT`, `EXCEPT`, `MINUS`), one per arm boundary walked.
    pub set_operators: &'a mut Vec<CompactString>
}
