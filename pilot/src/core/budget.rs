//! Bounded correction budget for the self-correction loop.

/// Default number of correction cycles allowed per manual execution.
pub const DEFAULT_MAX_CORRECTIONS: u32 = 5;

/// Counts correction cycles against a fixed bound.
///
/// This counter is the only guard against unbounded correction loops. It
/// lives in the session, is reset by a manual execution trigger, and is never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionBudget {
    max: u32,
    used: u32,
}

impl CorrectionBudget {
    pub fn new(max: u32) -> Self {
        Self { max, used: 0 }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }

    /// Take one correction from the budget. Returns the 1-indexed attempt
    /// number, or `None` when the budget is spent.
    pub fn try_consume(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.used += 1;
        Some(self.used)
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }
}

impl Default for CorrectionBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CORRECTIONS)
    }
}
