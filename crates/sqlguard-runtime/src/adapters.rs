//! Concrete interceptor adapters for the three execution surfaces the spec
//! names (spec §4.6): a connection-pool proxy, an ORM's own interceptor
//! hook, and a generic driver-level listener. Each is a thin
//! [`StatementContext`]-building wrapper around a shared [`InterceptorChain`]
//! that stamps the right [`ExecutionLayer`] and hands back an
//! [`ExecutionGuard`] the caller drives through to completion.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use sqlguard_core::{
    context::{ExecutionLayer, ParamBinding, StatementContext},
    parser::ParserFacade
};

use crate::{
    error::SafetyViolation,
    interceptor::{Decision, ExecutionOutcome, InterceptorChain},
    slot::ValidationSlot
};

/// Scopes one attempted execution from `on_before_execute` through
/// `on_after_execute`. Obtained via [`PoolInterceptor::guard`] /
/// [`OrmInterceptor::guard`] / [`DriverSpyInterceptor::guard`]; the caller
/// must call [`ExecutionGuard::success`] or [`ExecutionGuard::failure`]
/// exactly once to run the chain's after-hooks.
pub struct ExecutionGuard<'a> {
    chain:      &'a InterceptorChain,
    ctx:        StatementContext,
    slot:       ValidationSlot,
    started_at: DateTime<Utc>
}

impl<'a> ExecutionGuard<'a> {
    fn enter(chain: &'a InterceptorChain, ctx: StatementContext) -> Result<Self, SafetyViolation> {
        let slot = ValidationSlot::new();
        match chain.before(&ctx, &slot) {
            Decision::Proceed => Ok(Self {
                chain,
                ctx,
                slot,
                started_at: Utc::now()
            }),
            Decision::Block(violation) => Err(violation)
        }
    }

    pub fn context(&self) -> &StatementContext {
        &self.ctx
    }

    /// The statement was executed and `rows_affected` rows were touched
    /// (spec §3, `-1` meaning "not applicable", e.g. a SELECT).
    pub fn success(self, rows_affected: i64) {
        let outcome = ExecutionOutcome::success(self.started_at, Utc::now(), rows_affected);
        self.chain.after(&self.ctx, &self.slot, &outcome);
    }

    /// The statement failed at the driver/database, distinct from being
    /// blocked before it ever reached them.
    pub fn failure(self, error: impl Into<String>) {
        let outcome = ExecutionOutcome::failure(self.started_at, Utc::now(), error);
        self.chain.after(&self.ctx, &self.slot, &outcome);
    }
}

fn build_context(
    facade: &ParserFacade,
    sql: &str,
    origin_id: impl Into<CompactString>,
    layer: ExecutionLayer,
    params: ParamBinding,
    data_source: impl Into<CompactString>
) -> StatementContext {
    let ast = facade.parse_lenient(sql);
    StatementContext::builder(sql)
        .ast(ast)
        .origin_id(origin_id)
        .layer(layer)
        .params(params)
        .data_source(data_source)
        .build()
}

/// Wraps a connection-pool-like surface (e.g. a Druid/HikariCP-style filter
/// or an `sqlx::Pool` wrapper) observing every statement that passes
/// through the pool regardless of which application code issued it.
pub struct PoolInterceptor {
    chain:  InterceptorChain,
    facade: ParserFacade
}

impl PoolInterceptor {
    pub fn new(chain: InterceptorChain, facade: ParserFacade) -> Self {
        Self {
            chain,
            facade
        }
    }

    pub fn guard(
        &self,
        sql: &str,
        origin_id: impl Into<CompactString>,
        params: ParamBinding,
        data_source: impl Into<CompactString>
    ) -> Result<ExecutionGuard<'_>, SafetyViolation> {
        let ctx = build_context(&self.facade, sql, origin_id, ExecutionLayer::Pool, params, data_source);
        ExecutionGuard::enter(&self.chain, ctx)
    }
}

/// Wraps an ORM's own interceptor/listener hook (an entity listener, a
/// mapper interceptor) — the application (APP) layer, closest to the
/// call site that actually composed the SQL.
pub struct OrmInterceptor {
    chain:  InterceptorChain,
    facade: ParserFacade
}

impl OrmInterceptor {
    pub fn new(chain: InterceptorChain, facade: ParserFacade) -> Self {
        Self {
            chain,
            facade
        }
    }

    pub fn guard(
        &self,
        sql: &str,
        origin_id: impl Into<CompactString>,
        params: ParamBinding,
        data_source: impl Into<CompactString>
    ) -> Result<ExecutionGuard<'_>, SafetyViolation> {
        let ctx = build_context(&self.facade, sql, origin_id, ExecutionLayer::Orm, params, data_source);
        ExecutionGuard::enter(&self.chain, ctx)
    }
}

/// The lowest-ceremony adapter: a generic driver-spy listener with no
/// framework context beyond the raw SQL text and an origin-id the caller
/// supplies itself.
pub struct DriverSpyInterceptor {
    chain:  InterceptorChain,
    facade: ParserFacade
}

impl DriverSpyInterceptor {
    pub fn new(chain: InterceptorChain, facade: ParserFacade) -> Self {
        Self {
            chain,
            facade
        }
    }

    pub fn guard(
        &self,
        sql: &str,
        origin_id: impl Into<CompactString>
    ) -> Result<ExecutionGuard<'_>, SafetyViolation> {
        let ctx = build_context(&self.facade, sql, origin_id, ExecutionLayer::Driver, ParamBinding::new(), "default");
        ExecutionGuard::enter(&self.chain, ctx)
    }
}

#[cfg(test)]
mod tests {
    use sqlguard_core::validator::Validator;

    use super::*;
    use crate::{
        audit_interceptor::{AuditInterceptor, ConnectionTag},
        interceptor::SafetyInterceptor,
        strategy::RuntimeConfig
    };

    async fn chain() -> (InterceptorChain, sqlguard_audit::AuditWriterHandle, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (writer, handle) = sqlguard_audit::AuditWriter::spawn(dir.path().join("audit.jsonl")).await.unwrap();
        let chain = InterceptorChain::new(vec![
            Box::new(SafetyInterceptor::new(Validator::default(), RuntimeConfig::default())),
            Box::new(AuditInterceptor::new(
                writer,
                "orders-service",
                ConnectionTag {
                    db_name:    "primary".into(),
                    db_type:    sqlguard_audit::DbProduct::Postgresql,
                    db_version: "16".into()
                }
            )),
        ]);
        (chain, handle, dir)
    }

    #[tokio::test]
    async fn pool_interceptor_blocks_dangerous_sql_before_it_reaches_the_pool() {
        let (chain, handle, _dir) = chain().await;
        let interceptor = PoolInterceptor::new(chain, ParserFacade::default());

        let result = interceptor.guard("DELETE FROM users", "svc-1", ParamBinding::new(), "primary");
        assert!(result.is_err());

        handle.shutdown(std::time::Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn driver_spy_interceptor_proceeds_and_records_success() {
        let (chain, handle, _dir) = chain().await;
        let interceptor = DriverSpyInterceptor::new(chain, ParserFacade::default());

        let guard = interceptor.guard("SELECT 1", "svc-1").unwrap();
        guard.success(1);

        handle.shutdown(std::time::Duration::from_secs(1)).await.unwrap();
    }
}
