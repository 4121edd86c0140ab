//! The immutable per-attempt record that flows through the validation pipeline.
//!
//! A [`StatementContext`] is built once by an interceptor (see
//! `sqlguard-runtime`) and handed to [`crate::validator::Validator::validate`].
//! Rule checkers only ever read it; nothing downstream mutates it.

use std::sync::Arc;

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::parser::AstHandle;

/// Top-level statement kind, derived once from the parsed AST.
///
/// Serializes uppercase (`"SELECT"`, ...) to match the canonical audit log
/// line's `type` field (spec §6). Also deserializes so the audit service can
/// read it back off the bus/JSONL trail (see `sqlguard-audit-service::tailer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum StatementKind {
    Select,
    Update,
    Delete,
    Insert,
    Other
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Insert => write!(f, "INSERT"),
            Self::Other => write!(f, "OTHER")
        }
    }
}

/// Which data-access surface observed this statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub enum ExecutionLayer {
    /// Application / ORM code issuing the statement directly.
    App,
    /// An ORM's own interceptor hook (entity listener, mapper interceptor).
    Orm,
    /// A connection-pool proxy (e.g. a Druid/HikariCP-style filter).
    Pool,
    /// A generic driver-spy listener with no framework context.
    Driver
}

impl std::fmt::Display for ExecutionLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::App => write!(f, "APP"),
            Self::Orm => write!(f, "ORM"),
            Self::Pool => write!(f, "POOL"),
            Self::Driver => write!(f, "DRIVER")
        }
    }
}

/// A bound parameter value. Only the textual/numeric shape matters to the
/// rule library; drivers own the real typed representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub enum ParamValue {
    Null,
    Bool(bool),
    Number(CompactString),
    Text(String)
}

/// Ordered name -> value map. Positional parameters use their 1-based index
/// (`"1"`, `"2"`, ...) rendered as the key, preserving call order.
pub type ParamBinding = IndexMap<CompactString, ParamValue>;

/// Whether the caller told us a SELECT is paginated outside the SQL text
/// itself (e.g. a Spring Data `Pageable`), and if so, the page parameters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LogicalPagination {
    pub offset: Option<u64>,
    pub limit:  Option<u64>
}

/// The immutable per-attempt record carrying SQL, AST, and call metadata.
///
/// Constructed once via [`StatementContextBuilder`]; never mutated afterward.
/// Lifetime spans a single validate+execute attempt.
#[derive(Clone)]
pub struct StatementContext {
    sql:                 String,
    ast:                 Option<Arc<AstHandle>>,
    kind:                StatementKind,
    origin_id:           CompactString,
    layer:                ExecutionLayer,
    params:              ParamBinding,
    data_source:         CompactString,
    logical_pagination: Option<LogicalPagination>
}

impl StatementContext {
    pub fn builder(sql: impl Into<String>) -> StatementContextBuilder {
        StatementContextBuilder::new(sql)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn ast(&self) -> Option<&Arc<AstHandle>> {
        self.ast.as_ref()
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    pub fn layer(&self) -> ExecutionLayer {
        self.layer
    }

    pub fn params(&self) -> &ParamBinding {
        &self.params
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn logical_pagination(&self) -> Option<LogicalPagination> {
        self.logical_pagination
    }
}

/// Builder for [`StatementContext`]. The AST is supplied already-parsed by
/// the caller (typically via `ParserFacade::parse`/`parse_lenient`) so the
/// builder never re-parses SQL itself.
pub struct StatementContextBuilder {
    sql:                 String,
    ast:                 Option<Arc<AstHandle>>,
    kind:                StatementKind,
    origin_id:           CompactString,
    layer:                ExecutionLayer,
    params:              ParamBinding,
    data_source:         CompactString,
    logical_pagination: Option<LogicalPagination>
}

impl StatementContextBuilder {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql:                sql.into(),
            ast:                None,
            kind:               StatementKind::Other,
            origin_id:          CompactString::new("unknown"),
            layer:              ExecutionLayer::App,
            params:             ParamBinding::new(),
            data_source:        CompactString::new("default"),
            logical_pagination: None
        }
    }

    pub fn ast(mut self, ast: Arc<AstHandle>) -> Self {
        self.kind = ast.kind();
        self.ast = Some(ast);
        self
    }

    pub fn origin_id(mut self, origin_id: impl Into<CompactString>) -> Self {
        self.origin_id = origin_id.into();
        self
    }

    pub fn layer(mut self, layer: ExecutionLayer) -> Self {
        self.layer = layer;
        self
    }

    pub fn params(mut self, params: ParamBinding) -> Self {
        self.params = params;
        self
    }

    pub fn data_source(mut self, data_source: impl Into<CompactString>) -> Self {
        self.data_source = data_source.into();
        self
    }

    pub fn logical_pagination(mut self, pagination: LogicalPagination) -> Self {
        self.logical_pagination = Some(pagination);
        self
    }

    pub fn build(self) -> StatementContext {
        StatementContext {
            sql:                self.sql,
            ast:                self.ast,
            kind:               self.kind,
            origin_id:          self.origin_id,
            layer:              self.layer,
            params:             self.params,
            data_source:        self.data_source,
            logical_pagination: self.logical_pagination
        }
    }
}
