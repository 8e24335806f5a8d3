//! Per-backend health state.
//!
//! # States
//! - Eligible: backend receives traffic
//! - Excluded: consecutive failures >= failure_threshold
//!
//! # State Transitions
//! ```text
//! Eligible → Excluded: consecutive failures reach failure_threshold
//! Excluded → Eligible: an explicit success resets the counter
//! ```
//!
//! # Design Decisions
//! - Lock-free atomics; counters of different backends are independent
//! - The counter never decreases except through `record_success`

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Sentinel for "no failure recorded yet".
const NEVER: u64 = u64::MAX;

/// Consecutive-failure bookkeeping for a single backend.
#[derive(Debug)]
pub struct HealthState {
    /// Consecutive failure count.
    consecutive_failures: AtomicU32,
    /// Time of the most recent failure, in policy clock milliseconds.
    last_failure_ms: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            last_failure_ms: AtomicU64::new(NEVER),
        }
    }

    /// Current consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Milliseconds (policy clock) of the last failure, if any.
    pub fn last_failure_ms(&self) -> Option<u64> {
        match self.last_failure_ms.load(Ordering::Acquire) {
            NEVER => None,
            ms => Some(ms),
        }
    }

    /// Report a failure observed at `now_ms`. Returns the new failure count.
    pub fn record_failure(&self, now_ms: u64) -> u32 {
        self.last_failure_ms.store(now_ms, Ordering::Release);
        let previous = self
            .consecutive_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(1))
            })
            // The closure never returns None.
            .unwrap_or_else(|n| n);
        previous.saturating_add(1)
    }

    /// Report a success. Returns the failure count that was cleared.
    pub fn record_success(&self) -> u32 {
        self.consecutive_failures.swap(0, Ordering::AcqRel)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_accumulate_until_success() {
        let state = HealthState::new();
        assert_eq!(state.failures(), 0);
        assert_eq!(state.last_failure_ms(), None);

        assert_eq!(state.record_failure(10), 1);
        assert_eq!(state.record_failure(20), 2);
        assert_eq!(state.last_failure_ms(), Some(20));

        assert_eq!(state.record_success(), 2);
        assert_eq!(state.failures(), 0);
        // A success does not erase when the last failure happened.
        assert_eq!(state.last_failure_ms(), Some(20));
    }

    #[test]
    fn counter_saturates() {
        let state = HealthState::new();
        state
            .consecutive_failures
            .store(u32::MAX, Ordering::Relaxed);
        assert_eq!(state.record_failure(0), u32::MAX);
    }
}
