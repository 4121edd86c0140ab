//! Small value types shared by the extraction helpers.

use compact_str::CompactString;

/// A window function call site discovered while walking a projection or
/// ORDER BY list.
#[derive(Debug, Clone)]
pub struct WindowFunction {
    pub name:           CompactString,
    pub partition_cols: Vec<CompactString>,
    pub order_cols:     Vec<CompactString>
}
