//! The "last validation" slot the safety wrapper writes and the audit
//! wrapper reads (spec §4.6).
//!
//! Two flavors are provided. [`ValidationSlot`] is call-scoped — built fresh
//! per `onBeforeExecute`/`onAfterExecute` pair and threaded explicitly
//! alongside the context — which is the shape Design Notes §9 recommends
//! once callers may hop OS threads (an async runtime's work-stealing
//! scheduler). [`ThreadLocalSlot`] is the ambient `thread_local!` fallback
//! for call sites that cannot carry an extra argument, matching the
//! process-wide-static style of the parser cache.

use std::{cell::RefCell, sync::{Arc, Mutex}};

use sqlguard_core::rules::ValidationResult;

/// Call-scoped slot: one instance per interceptor invocation, shared between
/// the safety wrapper (writer) and the audit wrapper (reader) via `Arc`.
#[derive(Clone, Default)]
pub struct ValidationSlot {
    inner: Arc<Mutex<Option<ValidationResult>>>
}

impl ValidationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the safety wrapper's `onBeforeExecute` once validation has
    /// run, before the decision is applied.
    pub fn set(&self, result: ValidationResult) {
        let mut guard = self.inner.lock().expect("validation slot mutex poisoned");
        *guard = Some(result);
    }

    /// Called by the audit wrapper's `onAfterExecute`. Leaves the slot
    /// populated (`take` is reserved for the outermost caller that actually
    /// clears it) so a slot can be read more than once if several audit-side
    /// wrappers are chained.
    pub fn get(&self) -> Option<ValidationResult> {
        self.inner.lock().expect("validation slot mutex poisoned").clone()
    }

    /// Called once, by the outermost wrapper, after the audit proxy has had
    /// its chance to read (spec §4.6 ordering guarantee).
    pub fn clear(&self) {
        let mut guard = self.inner.lock().expect("validation slot mutex poisoned");
        *guard = None;
    }
}

thread_local! {
    static LAST_VALIDATION: RefCell<Option<ValidationResult>> = const { RefCell::new(None) };
}

/// Ambient thread-local variant of [`ValidationSlot`] for call sites (e.g. a
/// driver-level listener with no hook to pass extra state) that cannot
/// thread a call-scoped value through. Unsafe to use across an async
/// task that may resume on a different OS thread; prefer [`ValidationSlot`]
/// there.
pub struct ThreadLocalSlot;

impl ThreadLocalSlot {
    pub fn set(result: ValidationResult) {
        LAST_VALIDATION.with(|cell| *cell.borrow_mut() = Some(result));
    }

    pub fn get() -> Option<ValidationResult> {
        LAST_VALIDATION.with(|cell| cell.borrow().clone())
    }

    pub fn clear() {
        LAST_VALIDATION.with(|cell| *cell.borrow_mut() = None);
    }
}

#[cfg(test)]
mod tests {
    use sqlguard_core::rules::RiskLevel;

    use super::*;

    fn sample() -> ValidationResult {
        ValidationResult {
            passed:             true,
            violations:         vec![],
            highest_risk_level: RiskLevel::Safe
        }
    }

    #[test]
    fn call_scoped_slot_round_trips_and_clears() {
        let slot = ValidationSlot::new();
        assert!(slot.get().is_none());
        slot.set(sample());
        assert!(slot.get().is_some());
        slot.clear();
        assert!(slot.get().is_none());
    }

    #[test]
    fn thread_local_slot_round_trips_and_clears() {
        ThreadLocalSlot::clear();
        assert!(ThreadLocalSlot::get().is_none());
        ThreadLocalSlot::set(sample());
        assert!(ThreadLocalSlot::get().is_some());
        ThreadLocalSlot::clear();
        assert!(ThreadLocalSlot::get().is_none());
    }
}
