//! Rule chassis and the concrete rule library (spec §4.2-§4.4).
//!
//! [`chassis`] defines the shared [`chassis::RuleChecker`] trait and
//! accumulator types; the five group modules each contribute a handful of
//! concrete checkers; [`Orchestrator`] owns the canonical registration order
//! and runs them.

pub mod access_control;
pub mod chassis;
pub mod dangerous;
pub mod injection;
pub mod pagination;
pub mod where_quality;

use std::{panic, time::Instant};

pub use chassis::{
    ResultAccumulator, RiskLevel, RuleChecker, ValidationResult, ViolationRecord, resolve_risk
};

use crate::{config::Config, context::StatementContext, glob::SegmentedGlobSet};

/// Per-checker soft time budget (spec §4.2): exceeding it is logged for
/// diagnostics but never aborts the checker.
const SOFT_BUDGET_MS: u128 = 5;

/// One registered checker plus the origin-id exemption glob compiled from
/// its `rules.<id>.exemptions` entry (spec §6). Exemptions are origin-id
/// based and orthogonal to the early-return side-channel, so they are
/// applied once here rather than duplicated in every checker.
struct Registration {
    checker:   Box<dyn RuleChecker>,
    exemptions: SegmentedGlobSet
}

/// Owns the checker list in a fixed registration order and runs them against
/// one [`StatementContext`], producing a [`ValidationResult`].
///
/// Order matters only for the early-return side-channel (spec §4.3); the
/// list built by [`Orchestrator::from_config`] is the canonical order the
/// early-return table and the order-insensitivity property (spec §8) assume.
pub struct Orchestrator {
    checkers: Vec<Registration>
}

/// Separator used when matching origin-id exemption globs (spec §3:
/// origin-ids look like `pkg.Class.method`; `*` matches a run of
/// non-separator characters).
const ORIGIN_ID_SEPARATOR: char = '.';

fn exemptions_for(config: &Config, id: &str) -> SegmentedGlobSet {
    SegmentedGlobSet::new(config.rules.exemptions(id).to_vec(), ORIGIN_ID_SEPARATOR)
}

impl Orchestrator {
    /// Builds the orchestrator with every built-in checker, each constructed
    /// once from `config` (baking in thresholds and precompiled glob sets).
    pub fn from_config(config: &Config) -> Self {
        let checkers: Vec<Box<dyn RuleChecker>> = vec![
            // Injection group.
            Box::new(injection::MultiStatementChecker::from_config(config)),
            Box::new(injection::SetOperationChecker::from_config(config)),
            Box::new(injection::SqlCommentChecker::from_config(config)),
            Box::new(injection::FileSinkChecker::from_config(config)),
            // Dangerous-operation group.
            Box::new(dangerous::DdlChecker::from_config(config)),
            Box::new(dangerous::DangerousFunctionChecker::from_config(config)),
            Box::new(dangerous::StoredProcedureChecker::from_config(config)),
            // Access-control group.
            Box::new(access_control::MetadataStatementChecker::from_config(config)),
            Box::new(access_control::SetStatementChecker::from_config(config)),
            Box::new(access_control::DeniedTableChecker::from_config(config)),
            Box::new(access_control::ReadOnlyTableChecker::from_config(config)),
            // WHERE-quality group.
            Box::new(where_quality::NoWhereChecker::from_config(config)),
            Box::new(where_quality::DummyPredicateChecker::from_config(config)),
            Box::new(where_quality::BlacklistFieldChecker::from_config(config)),
            Box::new(where_quality::WhitelistFieldChecker::from_config(config)),
            // Pagination group.
            Box::new(pagination::NoConditionPaginationChecker::from_config(config)),
            Box::new(pagination::DeepOffsetChecker::from_config(config)),
            Box::new(pagination::LargePageSizeChecker::from_config(config)),
            Box::new(pagination::MissingOrderByChecker::from_config(config)),
            Box::new(pagination::NoPaginationChecker::from_config(config)),
        ];
        let checkers = checkers
            .into_iter()
            .map(|checker| {
                let exemptions = exemptions_for(config, checker.id());
                Registration {
                    checker,
                    exemptions
                }
            })
            .collect();
        Self {
            checkers
        }
    }

    /// Builds the orchestrator from an explicit checker list, registration
    /// order preserved, with no origin-id exemptions configured. Used by
    /// tests that register a subset or a fake checker.
    pub fn with_checkers(checkers: Vec<Box<dyn RuleChecker>>) -> Self {
        let checkers = checkers
            .into_iter()
            .map(|checker| Registration {
                checker,
                exemptions: SegmentedGlobSet::new(Vec::<String>::new(), ORIGIN_ID_SEPARATOR)
            })
            .collect();
        Self {
            checkers
        }
    }

    /// Runs every enabled, non-skipped, non-exempt checker in registration
    /// order against `ctx`, returning the accumulated result.
    pub fn run(&self, ctx: &StatementContext) -> ValidationResult {
        let mut acc = ResultAccumulator::new();
        for Registration {
            checker,
            exemptions
        } in &self.checkers
        {
            if !checker.is_enabled() {
                continue;
            }
            if acc.should_skip(checker.id()) {
                continue;
            }
            if exemptions.matches(ctx.origin_id()) {
                continue;
            }

            let start = Instant::now();
            let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                checker.check(ctx, &mut acc);
            }));
            let elapsed = start.elapsed();

            if let Err(payload) = outcome {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "checker panicked with a non-string payload".to_string());
                tracing::error!(
                    checker = checker.id(),
                    error = %message,
                    "rule checker faulted; continuing with remaining checkers"
                );
            }

            if elapsed.as_millis() > SOFT_BUDGET_MS {
                tracing::debug!(
                    checker = checker.id(),
                    micros = elapsed.as_micros(),
                    "checker exceeded the soft time budget"
                );
            }
        }
        acc.finish()
    }
}
