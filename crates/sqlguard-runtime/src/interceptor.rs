//! The interceptor contract (spec §4.6): `onBeforeExecute`/`onAfterExecute`,
//! composed into a chain that preserves the safety/audit ordering guarantee
//! without relying on an ambient try/finally.

use chrono::{DateTime, Utc};
use sqlguard_core::{context::StatementContext, validator::Validator};
use tracing::{info, warn};

use crate::{
    error::SafetyViolation,
    slot::ValidationSlot,
    strategy::{RuntimeConfig, ViolationStrategy}
};

/// Outcome of the observed execution, passed to `on_after_execute`. Mirrors
/// the spec's `onAfterExecute(sqlText, startedAt, endedAt, rowsAffected,
/// error?)` signature; `sqlText` and origin-id stay on the shared
/// [`StatementContext`] instead of being repeated here.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub started_at:    DateTime<Utc>,
    pub ended_at:      DateTime<Utc>,
    pub rows_affected: i64,
    pub error:         Option<String>
}

impl ExecutionOutcome {
    pub fn success(started_at: DateTime<Utc>, ended_at: DateTime<Utc>, rows_affected: i64) -> Self {
        Self {
            started_at,
            ended_at,
            rows_affected,
            error: None
        }
    }

    pub fn failure(started_at: DateTime<Utc>, ended_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            started_at,
            ended_at,
            rows_affected: -1,
            error: Some(error.into())
        }
    }

    pub fn time_ms(&self) -> f64 {
        let delta = self.ended_at - self.started_at;
        (delta.num_microseconds().unwrap_or(0) as f64 / 1000.0).max(0.0)
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// The decision an interceptor renders for `on_before_execute`.
#[derive(Debug, Clone)]
pub enum Decision {
    Proceed,
    Block(SafetyViolation)
}

impl Decision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

/// One link in the interceptor chain. Implementors are expected to be
/// stateless aside from shared, thread-safe handles (a [`Validator`], an
/// [`sqlguard_audit::AuditWriter`] clone) — the same statelessness
/// requirement the rule checkers carry.
pub trait Interceptor: Send + Sync {
    fn on_before_execute(&self, ctx: &StatementContext, slot: &ValidationSlot) -> Decision;

    fn on_after_execute(&self, ctx: &StatementContext, slot: &ValidationSlot, outcome: &ExecutionOutcome);
}

/// Composes interceptors so that the first-registered runs outermost: its
/// `on_before_execute` fires first, and its `on_after_execute` fires last —
/// i.e. *after* every interceptor registered behind it has already read
/// whatever the outermost one wrote to the slot (spec §4.6's ordering
/// guarantee, without relying on nested try/finally).
pub struct InterceptorChain {
    interceptors: Vec<Box<dyn Interceptor>>
}

impl InterceptorChain {
    /// `interceptors[0]` is outermost. Register the safety interceptor
    /// first, then the audit interceptor, to get the spec's required
    /// ordering.
    pub fn new(interceptors: Vec<Box<dyn Interceptor>>) -> Self {
        Self {
            interceptors
        }
    }

    pub fn before(&self, ctx: &StatementContext, slot: &ValidationSlot) -> Decision {
        for interceptor in &self.interceptors {
            let decision = interceptor.on_before_execute(ctx, slot);
            if !decision.is_proceed() {
                return decision;
            }
        }
        Decision::Proceed
    }

    pub fn after(&self, ctx: &StatementContext, slot: &ValidationSlot, outcome: &ExecutionOutcome) {
        for interceptor in self.interceptors.iter().rev() {
            interceptor.on_after_execute(ctx, slot, outcome);
        }
    }
}

/// The outermost interceptor: validates, records the result in the slot for
/// the audit interceptor to read, and applies the configured strategy.
pub struct SafetyInterceptor {
    validator: Validator,
    config:    RuntimeConfig
}

impl SafetyInterceptor {
    pub fn new(validator: Validator, config: RuntimeConfig) -> Self {
        Self {
            validator,
            config
        }
    }
}

impl Interceptor for SafetyInterceptor {
    fn on_before_execute(&self, ctx: &StatementContext, slot: &ValidationSlot) -> Decision {
        if !self.config.enabled {
            return Decision::Proceed;
        }

        let result = self.validator.validate(ctx);
        slot.set(result.clone());

        match self.config.resolve(&result) {
            ViolationStrategy::Block => {
                Decision::Block(SafetyViolation::new(&result, ctx.sql(), ctx.origin_id()))
            }
            ViolationStrategy::Warn => {
                warn!(
                    origin_id = ctx.origin_id(),
                    highest_risk = %result.highest_risk_level,
                    violations = result.violations.len(),
                    "SQL statement violated one or more rules"
                );
                Decision::Proceed
            }
            ViolationStrategy::Log => {
                if !result.passed {
                    info!(
                        origin_id = ctx.origin_id(),
                        highest_risk = %result.highest_risk_level,
                        violations = result.violations.len(),
                        "SQL statement flagged below block threshold"
                    );
                }
                Decision::Proceed
            }
        }
    }

    fn on_after_execute(&self, _ctx: &StatementContext, slot: &ValidationSlot, _outcome: &ExecutionOutcome) {
        // Runs last in the chain (outermost), after the audit interceptor
        // has already read the slot.
        slot.clear();
    }
}

#[cfg(test)]
mod tests {
    use sqlguard_core::{context::StatementContext, parser::ParserFacade, validator::Validator};

    use super::*;

    fn ctx(sql: &str) -> StatementContext {
        let facade = ParserFacade::default();
        let ast = facade.parse(sql).unwrap();
        StatementContext::builder(sql).ast(ast).origin_id("svc-1").build()
    }

    #[test]
    fn safe_statement_proceeds_and_populates_slot() {
        let interceptor = SafetyInterceptor::new(Validator::default(), RuntimeConfig::default());
        let slot = ValidationSlot::new();
        let ctx = ctx("SELECT id FROM users WHERE id = ?");
        let decision = interceptor.on_before_execute(&ctx, &slot);
        assert!(decision.is_proceed());
        assert!(slot.get().unwrap().passed);
    }

    #[test]
    fn critical_statement_blocks_at_default_threshold() {
        let interceptor = SafetyInterceptor::new(Validator::default(), RuntimeConfig::default());
        let slot = ValidationSlot::new();
        let ctx = ctx("DELETE FROM users");
        let decision = interceptor.on_before_execute(&ctx, &slot);
        assert!(matches!(decision, Decision::Block(_)));
    }

    #[test]
    fn after_execute_clears_the_slot() {
        let interceptor = SafetyInterceptor::new(Validator::default(), RuntimeConfig::default());
        let slot = ValidationSlot::new();
        let ctx = ctx("SELECT 1");
        interceptor.on_before_execute(&ctx, &slot);
        let outcome = ExecutionOutcome::success(Utc::now(), Utc::now(), 1);
        interceptor.on_after_execute(&ctx, &slot, &outcome);
        assert!(slot.get().is_none());
    }

    #[test]
    fn chain_runs_before_outermost_first_and_after_outermost_last() {
        use std::sync::{Arc, Mutex};

        struct Tracking {
            label: &'static str,
            log:   Arc<Mutex<Vec<&'static str>>>
        }

        impl Interceptor for Tracking {
            fn on_before_execute(&self, _ctx: &StatementContext, _slot: &ValidationSlot) -> Decision {
                self.log.lock().unwrap().push(self.label);
                Decision::Proceed
            }

            fn on_after_execute(&self, _ctx: &StatementContext, _slot: &ValidationSlot, _outcome: &ExecutionOutcome) {
                self.log.lock().unwrap().push(self.label);
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(vec![
            Box::new(Tracking {
                label: "safety",
                log:   log.clone()
            }),
            Box::new(Tracking {
                label: "audit",
                log:   log.clone()
            }),
        ]);

        let slot = ValidationSlot::new();
        let ctx = ctx("SELECT 1");
        chain.before(&ctx, &slot);
        let outcome = ExecutionOutcome::success(Utc::now(), Utc::now(), 0);
        chain.after(&ctx, &slot, &outcome);

        assert_eq!(*log.lock().unwrap(), vec!["safety", "audit", "audit", "safety"]);
    }
}
