//! Deterministic workflow environment
//!
//! Bundles the fixed clock, sequential IDs, and captured events that
//! nearly every workflow test wires up by hand otherwise.

use chrono::NaiveDate;

use core_kernel::{FixedClock, MemoryEventLogger, SequentialIds, WorkflowEnv};

use crate::fixtures::mid_fiscal_year;

pub struct TestEnv {
    pub clock: FixedClock,
    pub ids: SequentialIds,
    pub events: MemoryEventLogger,
}

impl TestEnv {
    /// Environment pinned to the mid-fiscal-year fixture date.
    pub fn new() -> Self {
        Self::on_date(mid_fiscal_year())
    }

    pub fn on_date(date: NaiveDate) -> Self {
        Self {
            clock: FixedClock::on_ist_date(date),
            ids: SequentialIds::default(),
            events: MemoryEventLogger::new(),
        }
    }

    /// Borrows the bundle as the `WorkflowEnv` workflows take.
    pub fn env(&self) -> WorkflowEnv<'_> {
        WorkflowEnv::new(&self.clock, &self.ids, &self.events)
    }

    /// Actions recorded so far, in order.
    pub fn actions(&self) -> Vec<String> {
        self.events.actions()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Clock, IdGenerator};

    #[test]
    fn test_env_is_deterministic() {
        let a = TestEnv::new();
        let b = TestEnv::new();
        assert_eq!(a.clock.today_ist(), b.clock.today_ist());
        assert_eq!(a.ids.next(), b.ids.next());
    }
}
