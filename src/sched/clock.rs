//! Monotonic Clock
//!
//! Kernel time in nanoseconds since boot. It only moves forward, driven by
//! the timer interrupt (or a test) through `advance`.

use crate::abi::types::Timespec;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    now: u64,
}

impl Clock {
    pub const fn new() -> Self {
        Self { now: 0 }
    }

    /// Nanoseconds since boot.
    #[inline]
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Move time forward by `nanos`, saturating at `u64::MAX`.
    pub fn advance(&mut self, nanos: u64) {
        self.now = self.now.saturating_add(nanos);
    }

    /// Absolute time `duration` from now.
    pub fn deadline_after(&self, duration: u64) -> u64 {
        self.now.saturating_add(duration)
    }

    /// Whether `deadline` has been reached.
    #[inline]
    pub fn has_passed(&self, deadline: u64) -> bool {
        self.now >= deadline
    }

    /// Time left until `deadline`, zero once it has passed.
    pub fn remaining(&self, deadline: u64) -> Timespec {
        Timespec::from_nanos(deadline.saturating_sub(self.now))
    }
}
