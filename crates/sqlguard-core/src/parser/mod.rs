//! AST facade: parse SQL once, cache the result, expose a visitor so rule
//! checkers never touch `sqlparser` directly (Design Notes: "visitor across a
//! third-party AST").

pub mod extract;
pub mod facts;
pub mod types;

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering}
};

use lru::LruCache;
use sqlparser::{
    ast::Statement,
    dialect::{
        ClickHouseDialect, Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect,
        SQLiteDialect
    },
    parser::Parser
};

use crate::{
    context::StatementKind,
    error::{AppResult, parse_error}
};

/// SQL dialect the façade parses under. Determines which of the
/// MySQL-`LIMIT m,n` / PostgreSQL-`EXCEPT` / Oracle-`MINUS` /
/// SQL-Server-`TOP` forms are recognized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum SqlDialect {
    #[default]
    Generic,
    MySQL,
    PostgreSQL,
    SQLite,
    SqlServer,
    ClickHouse
}

impl SqlDialect {
    fn into_parser_dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::Generic => Box::new(GenericDialect {}),
            Self::MySQL => Box::new(MySqlDialect {}),
            Self::PostgreSQL => Box::new(PostgreSqlDialect {}),
            Self::SQLite => Box::new(SQLiteDialect {}),
            Self::SqlServer => Box::new(MsSqlDialect {}),
            Self::ClickHouse => Box::new(ClickHouseDialect {})
        }
    }
}

/// An opaque parsed-statement handle. Holds at most one top-level
/// `sqlparser` statement; multi-statement SQL is represented by
/// [`AstHandle::statements`] carrying the full list so `MultiStatementChecker`
/// can inspect it, while [`AstHandle::kind`]/[`AstHandle::visit`] operate on
/// the first statement (the one that will actually execute).
pub struct AstHandle {
    statements:       Vec<Statement>,
    kind:             StatementKind,
    is_parse_failure: bool
}

impl AstHandle {
    fn from_statements(statements: Vec<Statement>) -> Self {
        let kind = statements
            .first()
            .map(statement_kind)
            .unwrap_or(StatementKind::Other);
        Self {
            statements,
            kind,
            is_parse_failure: false
        }
    }

    /// An empty handle used for whitespace-only/empty SQL. Carries no
    /// statements; `kind()` reports `Other`; not a parse failure.
    pub fn unknown() -> Self {
        Self {
            statements:       Vec::new(),
            kind:             StatementKind::Other,
            is_parse_failure: false
        }
    }

    /// An empty handle standing in for a SQL string the parser rejected,
    /// produced only by [`ParserFacade::parse_lenient`] on failure (spec
    /// §3: "Parse failures ... produce an empty handle plus a single soft
    /// violation (lenient mode)").
    pub fn parse_failure() -> Self {
        Self {
            statements:       Vec::new(),
            kind:             StatementKind::Other,
            is_parse_failure: true
        }
    }

    /// Whether this handle stands in for SQL the parser rejected, as
    /// opposed to legitimately empty input.
    pub fn is_parse_failure(&self) -> bool {
        self.is_parse_failure
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// The full list of top-level statements found in the source text.
    /// Has more than one entry only for multi-statement SQL (`a; b;`).
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// The statement that will actually run: the first one parsed.
    pub fn primary(&self) -> Option<&Statement> {
        self.statements.first()
    }

    /// Dispatch into one of the five visitor hooks based on the primary
    /// statement's kind, mirroring the chassis's `AbstractChecker` dispatch
    /// (`sqlguard_core::rules::chassis::dispatch`) but usable standalone.
    pub fn visit(&self, visitor: &mut dyn AstVisitor) {
        match self.primary() {
            Some(Statement::Query(query)) => visitor.visit_select(query),
            Some(stmt @ Statement::Update {
                ..
            }) => visitor.visit_update(stmt),
            Some(stmt @ Statement::Delete(_)) => visitor.visit_delete(stmt),
            Some(stmt @ Statement::Insert(_)) => visitor.visit_insert(stmt),
            Some(stmt) => visitor.visit_other(stmt),
            None => {}
        }
    }
}

/// Hooks a concrete rule checker implements. The façade supplies the
/// dispatch; checkers never match on `Statement` kind themselves.
pub trait AstVisitor {
    fn visit_select(&mut self, _query: &sqlparser::ast::Query) {}

    fn visit_update(&mut self, _stmt: &Statement) {}

    fn visit_delete(&mut self, _stmt: &Statement) {}

    fn visit_insert(&mut self, _stmt: &Statement) {}

    fn visit_other(&mut self, _stmt: &Statement) {}
}

fn statement_kind(stmt: &Statement) -> StatementKind {
    match stmt {
        Statement::Query(_) => StatementKind::Select,
        Statement::Update {
            ..
        } => StatementKind::Update,
        Statement::Delete(_) => StatementKind::Delete,
        Statement::Insert(_) => StatementKind::Insert,
        _ => StatementKind::Other
    }
}

/// Process-wide parse cache + lenient-parse failure counter, shared by every
/// `ParserFacade` clone (it is `Clone` and cheap: the cache lives behind an
/// `Arc<Mutex<_>>`).
#[derive(Clone)]
pub struct ParserFacade {
    dialect:       SqlDialect,
    cache:         Arc<Mutex<LruCache<String, Arc<AstHandle>>>>,
    lenient_fails: Arc<AtomicU64>
}

impl ParserFacade {
    /// Default cache capacity per spec §4.1 / §6 `parser.cache-size`.
    pub const DEFAULT_CACHE_CAPACITY: usize = 1_000;

    pub fn new(dialect: SqlDialect, cache_capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(cache_capacity)
            .unwrap_or_else(|| std::num::NonZeroUsize::new(Self::DEFAULT_CACHE_CAPACITY).unwrap());
        Self {
            dialect,
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            lenient_fails: Arc::new(AtomicU64::new(0))
        }
    }

    /// Parse `sql`, consulting the process-wide LRU cache first. Concurrent
    /// callers may transiently race and re-parse the same text under lock
    /// contention; that is benign (spec §5, "Shared resources").
    pub fn parse(&self, sql: &str) -> AppResult<Arc<AstHandle>> {
        if sql.trim().is_empty() {
            return Ok(Arc::new(AstHandle::unknown()));
        }

        if let Some(hit) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(sql) {
            return Ok(Arc::clone(hit));
        }

        let dialect = self.dialect.into_parser_dialect();
        let statements =
            Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| parse_error(e.to_string()))?;
        let handle = Arc::new(AstHandle::from_statements(statements));

        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(sql.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Never errors: on parse failure, returns [`AstHandle::unknown`] and
    /// bumps the lenient-failure counter instead of propagating.
    pub fn parse_lenient(&self, sql: &str) -> Arc<AstHandle> {
        match self.parse(sql) {
            Ok(handle) => handle,
            Err(_) => {
                self.lenient_fails.fetch_add(1, Ordering::Relaxed);
                Arc::new(AstHandle::parse_failure())
            }
        }
    }

    /// Number of `parse_lenient` calls that fell back to an empty handle.
    pub fn lenient_failure_count(&self) -> u64 {
        self.lenient_fails.load(Ordering::Relaxed)
    }
}

impl Default for ParserFacade {
    fn default() -> Self {
        Self::new(SqlDialect::default(), Self::DEFAULT_CACHE_CAPACITY)
    }
}
