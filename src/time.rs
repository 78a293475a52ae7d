//! Timeout budgets over the free-running tick counter
//!
//! Every wait loop in the driver is bounded. [`Deadline`] captures the
//! `deadline = now + budget` pattern once so the wraparound-safe subtraction
//! is not repeated at every poll site.

use crate::hal::Host;

/// A microsecond deadline measured against [`Host::ticks`].
///
/// The tick counter is free-running and may wrap; all comparisons use
/// wrapping differences against the captured start value, so a `Deadline` is
/// correct across the wrap as long as the budget itself fits in a `u64`.
#[derive(Clone, Copy)]
pub struct Deadline {
    start: u64,
    budget_us: u64,
}

impl Deadline {
    /// Deadline `budget_us` microseconds from now.
    pub fn after<H: Host>(host: &H, budget_us: u64) -> Self {
        Self {
            start: host.ticks(),
            budget_us,
        }
    }

    /// True once the budget has elapsed.
    pub fn expired<H: Host>(&self, host: &H) -> bool {
        host.ticks().wrapping_sub(self.start) >= self.budget_us
    }

    /// Microseconds elapsed since the deadline was armed.
    pub fn elapsed_us<H: Host>(&self, host: &H) -> u64 {
        host.ticks().wrapping_sub(self.start)
    }
}
