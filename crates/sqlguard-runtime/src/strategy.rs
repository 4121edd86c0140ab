//! Violation-strategy enforcement (spec §4.5, §6, §7).
//!
//! The validator in `sqlguard-core` only detects; it never decides whether a
//! finding should stop execution. That decision — BLOCK/WARN/LOG, gated by
//! `blockThreshold`, overridable per rule — is owned entirely by this crate,
//! per spec §4.5's explicit "strategy application lives in sqlguard-runtime".

use sqlguard_core::{
    config::Config,
    rules::{RiskLevel, ValidationResult, ViolationRecord}
};

/// What to do once a statement has been validated (spec §6
/// `violationStrategy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationStrategy {
    /// Refuse to execute; raise a [`crate::error::SafetyViolation`].
    Block,
    /// Log at warning level and let the statement proceed.
    Warn,
    /// Log at info level and let the statement proceed.
    Log
}

impl std::str::FromStr for ViolationStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "warn" => Ok(Self::Warn),
            "log" => Ok(Self::Log),
            _ => Err(())
        }
    }
}

/// Runtime-layer settings wrapping [`sqlguard_core::config::Config`] with
/// the fields the core intentionally does not own (spec §6: `enabled`,
/// `violationStrategy`, `blockThreshold`).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub core:               Config,
    /// Master switch; when `false`, [`crate::interceptor::SafetyInterceptor`]
    /// always proceeds without running the validator.
    pub enabled:            bool,
    pub violation_strategy: ViolationStrategy,
    pub block_threshold:    RiskLevel
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            core:               Config::default(),
            enabled:            true,
            violation_strategy: ViolationStrategy::Block,
            block_threshold:    RiskLevel::High
        }
    }
}

impl RuntimeConfig {
    /// Resolves the strategy that governs `result`.
    ///
    /// The rule whose finding carries the overall `highest_risk_level` is
    /// the "driving" violation: a `rules.<id>.strategy` override on that
    /// rule wins outright (it is a deliberate per-rule escalation/de-
    /// escalation independent of the global threshold). Failing that, a
    /// rule with a built-in default strategy (see [`builtin_default_strategy`])
    /// resolves to it directly, bypassing the threshold gate — this is how
    /// stored-procedure invocation defaults to WARN (spec.md: "allow
    /// configuration to WARN (default) rather than BLOCK") even though its
    /// default risk level sits below `blockThreshold`. Every other rule's
    /// global `violationStrategy` applies only once the highest risk level
    /// has reached `blockThreshold`; below that, findings are informational
    /// and resolve to `Log` regardless of the configured global strategy
    /// (an Open Question resolution — see DESIGN.md).
    pub fn resolve(&self, result: &ValidationResult) -> ViolationStrategy {
        if let Some(driving) = driving_violation(result) {
            if let Some(raw) = self.core.rules.by_rule.get(driving.rule_id.as_str()).and_then(|o| o.strategy.as_deref()) {
                if let Ok(strategy) = raw.parse() {
                    return strategy;
                }
            }
            if let Some(floor) = builtin_default_strategy(driving.rule_id.as_str()) {
                return floor;
            }
        }

        if result.highest_risk_level >= self.block_threshold {
            self.violation_strategy
        } else {
            ViolationStrategy::Log
        }
    }
}

fn driving_violation(result: &ValidationResult) -> Option<&ViolationRecord> {
    result
        .violations
        .iter()
        .filter(|v| v.risk_level == result.highest_risk_level)
        .next_back()
}

/// Rules whose documented default strategy does not follow the
/// risk/threshold gate (spec.md: "Stored-procedure invocation: ... allow
/// configuration to WARN (default) rather than BLOCK"). An explicit
/// `rules.<id>.strategy` override still wins over this default.
fn builtin_default_strategy(rule_id: &str) -> Option<ViolationStrategy> {
    match rule_id {
        "stored-procedure" => Some(ViolationStrategy::Warn),
        _ => None
    }
}

#[cfg(test)]
mod tests {
    use sqlguard_core::config::RuleOverride;

    use super::*;

    fn result_with(rule_id: &'static str, risk: RiskLevel) -> ValidationResult {
        ValidationResult {
            passed:             false,
            violations:         vec![ViolationRecord::new(rule_id, risk, "msg", "fix")],
            highest_risk_level: risk
        }
    }

    #[test]
    fn below_threshold_resolves_to_log_regardless_of_global_strategy() {
        let config = RuntimeConfig {
            block_threshold: RiskLevel::High,
            violation_strategy: ViolationStrategy::Block,
            ..RuntimeConfig::default()
        };
        let result = result_with("deep-offset", RiskLevel::Medium);
        assert_eq!(config.resolve(&result), ViolationStrategy::Log);
    }

    #[test]
    fn stored_procedure_defaults_to_warn_below_block_threshold() {
        let config = RuntimeConfig {
            block_threshold: RiskLevel::High,
            violation_strategy: ViolationStrategy::Block,
            ..RuntimeConfig::default()
        };
        let result = result_with("stored-procedure", RiskLevel::Medium);
        assert_eq!(config.resolve(&result), ViolationStrategy::Warn);
    }

    #[test]
    fn stored_procedure_default_warn_floor_still_yields_to_an_explicit_override() {
        let mut config = RuntimeConfig {
            block_threshold: RiskLevel::High,
            violation_strategy: ViolationStrategy::Block,
            ..RuntimeConfig::default()
        };
        config.core.rules.by_rule.insert(
            "stored-procedure".to_string(),
            RuleOverride {
                strategy: Some("log".to_string()),
                ..RuleOverride::default()
            }
        );
        let result = result_with("stored-procedure", RiskLevel::Medium);
        assert_eq!(config.resolve(&result), ViolationStrategy::Log);
    }

    #[test]
    fn at_or_above_threshold_applies_global_strategy() {
        let config = RuntimeConfig {
            block_threshold: RiskLevel::High,
            violation_strategy: ViolationStrategy::Block,
            ..RuntimeConfig::default()
        };
        let result = result_with("no-where", RiskLevel::Critical);
        assert_eq!(config.resolve(&result), ViolationStrategy::Block);
    }

    #[test]
    fn per_rule_override_wins_over_global_strategy() {
        let mut config = RuntimeConfig {
            block_threshold: RiskLevel::High,
            violation_strategy: ViolationStrategy::Block,
            ..RuntimeConfig::default()
        };
        config.core.rules.by_rule.insert(
            "stored-procedure".to_string(),
            RuleOverride {
                strategy: Some("warn".to_string()),
                ..RuleOverride::default()
            }
        );
        let result = result_with("stored-procedure", RiskLevel::Critical);
        assert_eq!(config.resolve(&result), ViolationStrategy::Warn);
    }
}
