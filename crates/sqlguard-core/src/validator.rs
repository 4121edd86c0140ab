//! The validator: thread-local dedup filter, strict/lenient parse-failure
//! handling, and dispatch into the [`Orchestrator`] (spec §4.5).
//!
//! Strategy enforcement (BLOCK/WARN/LOG) deliberately lives outside this
//! module — see `sqlguard-runtime`'s interceptors, which call
//! [`Validator::validate`] and then decide what to do with the result.

use std::{
    cell::RefCell,
    collections::HashMap,
    time::{Duration, Instant}
};

use crate::{
    config::{Config, Strictness},
    context::StatementContext,
    rules::{Orchestrator, ResultAccumulator, RiskLevel, ValidationResult, ViolationRecord}
};

thread_local! {
    /// Per-thread dedup cache (spec §3 "Deduplication entry"): SQL text,
    /// trimmed, mapped to the timestamp of the last SAFE validation on this
    /// thread. Unsafe results are never inserted. Deliberately `thread_local`
    /// rather than a process-wide map, per spec §5 ("no cross-thread
    /// sharing").
    static DEDUP_CACHE: RefCell<HashMap<String, Instant>> = RefCell::new(HashMap::new());
}

/// Clears this thread's dedup cache. Pooled environments (a thread pool that
/// hands the same OS thread to unrelated callers) must invoke this on thread
/// return/shutdown to avoid cross-request aliasing (spec §5, "Cleared on
/// thread shutdown in pooled environments via an explicit clear hook
/// invoked by the pool").
pub fn clear_thread_local_dedup_cache() {
    DEDUP_CACHE.with(|cache| cache.borrow_mut().clear());
}

fn dedup_key(sql: &str) -> &str {
    sql.trim()
}

fn safe_result() -> ValidationResult {
    ValidationResult {
        passed:             true,
        violations:         Vec::new(),
        highest_risk_level: RiskLevel::Safe
    }
}

/// The pipeline entry point (spec §4.5). Owns the canonical [`Orchestrator`]
/// and the configured dedup TTL/strictness.
pub struct Validator {
    orchestrator:  Orchestrator,
    strictness:    Strictness,
    dedup_ttl:     Duration,
    dedup_enabled: bool
}

impl Validator {
    pub fn from_config(config: &Config) -> Self {
        Self {
            orchestrator:  Orchestrator::from_config(config),
            strictness:    config.strictness,
            dedup_ttl:     Duration::from_millis(config.dedup.ttl_ms),
            dedup_enabled: config.dedup.enabled
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Validator {
    pub fn validate(&self, ctx: &StatementContext) -> ValidationResult {
        let key = dedup_key(ctx.sql()).to_string();

        if self.dedup_enabled
            && let Some(cached) = self.check_dedup_cache(&key)
        {
            return cached;
        }

        let result = self.validate_uncached(ctx);

        if self.dedup_enabled && result.passed {
            DEDUP_CACHE.with(|cache| {
                cache.borrow_mut().insert(key, Instant::now());
            });
        }

        result
    }

    fn check_dedup_cache(&self, key: &str) -> Option<ValidationResult> {
        DEDUP_CACHE.with(|cache| {
            let cache = cache.borrow();
            let last = cache.get(key)?;
            (last.elapsed() < self.dedup_ttl).then(safe_result)
        })
    }

    fn validate_uncached(&self, ctx: &StatementContext) -> ValidationResult {
        let parse_failed = match ctx.ast() {
            None => true,
            Some(ast) => ast.is_parse_failure()
        };

        if !parse_failed {
            return self.orchestrator.run(ctx);
        }

        match self.strictness {
            Strictness::Strict => {
                let mut acc = ResultAccumulator::new();
                acc.record(ViolationRecord::new(
                    "parse-error",
                    RiskLevel::Critical,
                    "SQL failed to parse under the configured dialect",
                    "Fix the SQL syntax, or switch this interceptor to lenient parsing to degrade gracefully instead of blocking."
                ));
                acc.finish()
            }
            Strictness::Lenient => {
                let mut result = self.orchestrator.run(ctx);
                result.violations.insert(
                    0,
                    ViolationRecord::new(
                        "parse-error",
                        RiskLevel::Low,
                        "SQL failed to parse; validation continued in degraded mode, most rule checkers are no-ops against an empty statement",
                        "Fix the SQL syntax for the configured dialect to restore full rule coverage."
                    )
                );
                if result.highest_risk_level < RiskLevel::Low {
                    result.highest_risk_level = RiskLevel::Low;
                }
                result.passed = false;
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{context::StatementContext, parser::ParserFacade};

    fn validator() -> Validator {
        Validator::from_config(&Config::default())
    }

    fn ctx_for(facade: &ParserFacade, sql: &str) -> StatementContext {
        let ast = facade.parse(sql).expect("valid SQL");
        StatementContext::builder(sql).ast(ast).build()
    }

    #[test]
    fn safe_select_passes() {
        clear_thread_local_dedup_cache();
        let facade = ParserFacade::default();
        let ctx = ctx_for(&facade, "SELECT id FROM users WHERE id = 1");
        let result = validator().validate(&ctx);
        assert!(result.passed);
        assert_eq!(result.highest_risk_level, RiskLevel::Safe);
    }

    #[test]
    fn unsafe_delete_fails() {
        clear_thread_local_dedup_cache();
        let facade = ParserFacade::default();
        let ctx = ctx_for(&facade, "DELETE FROM users");
        let result = validator().validate(&ctx);
        assert!(!result.passed);
        assert_eq!(result.highest_risk_level, RiskLevel::Critical);
    }

    #[test]
    fn dedup_returns_cached_safe_without_rerunning() {
        clear_thread_local_dedup_cache();
        let facade = ParserFacade::default();
        let v = validator();
        let sql = "SELECT id FROM users WHERE id = 1";
        let ctx = ctx_for(&facade, sql);
        let first = v.validate(&ctx);
        assert!(first.passed);
        let second = v.validate(&ctx);
        assert!(second.passed);
        assert!(second.violations.is_empty());
    }

    #[test]
    fn dedup_never_caches_unsafe_results() {
        clear_thread_local_dedup_cache();
        let facade = ParserFacade::default();
        let v = validator();
        let sql = "DELETE FROM users";
        let ctx = ctx_for(&facade, sql);
        let first = v.validate(&ctx);
        assert!(!first.passed);
        let second = v.validate(&ctx);
        assert!(!second.passed);
        assert!(!second.violations.is_empty());
    }

    #[test]
    fn strict_missing_ast_is_critical() {
        let v = validator();
        let ctx = StatementContext::builder("not valid sql (((").build();
        let result = v.validate(&ctx);
        assert!(!result.passed);
        assert_eq!(result.highest_risk_level, RiskLevel::Critical);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].rule_id.as_str(), "parse-error");
    }

    #[test]
    fn lenient_parse_failure_is_low_and_degrades() {
        let mut config = Config::default();
        config.strictness = Strictness::Lenient;
        let v = Validator::from_config(&config);
        let facade = ParserFacade::default();
        let ast = facade.parse_lenient("not valid sql (((");
        assert!(ast.is_parse_failure());
        let ctx = StatementContext::builder("not valid sql (((").ast(Arc::clone(&ast)).build();
        let result = v.validate(&ctx);
        assert!(!result.passed);
        assert_eq!(result.highest_risk_level, RiskLevel::Low);
        assert_eq!(result.violations[0].rule_id.as_str(), "parse-error");
    }
}
