//! Attempt budget shared by the network loop and the captcha loop

use std::time::Duration;

/// Remaining allowance of failed attempts for one logical fetch
///
/// One budget is created per fetch and handed by `&mut` to every step that
/// can fail, so connection errors and unsolved captchas draw from the same
/// pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    limit: u32,
    remaining: u32,
}

impl Budget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Number of failures charged so far
    pub fn consumed(&self) -> u32 {
        self.limit - self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Charges one failure; returns true while attempts remain
    pub fn consume(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        !self.is_exhausted()
    }

    /// Delay to wait after a failure: `unit` times the failures charged so far
    ///
    /// The longer a target resists, the longer the pause, so the delay never
    /// decreases over the life of a budget.
    pub fn recovery_delay(&self, unit: Duration) -> Duration {
        unit.saturating_mul(self.consumed())
    }
}
