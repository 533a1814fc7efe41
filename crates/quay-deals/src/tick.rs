//! Per-tick accounting shared by the scheduler workers.

/// What one worker tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Rows returned by the eligibility query.
    pub selected: usize,
    /// Rows this worker won the claim on.
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl TickSummary {
    /// Rows another worker claimed first.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.selected.saturating_sub(self.claimed)
    }
}
