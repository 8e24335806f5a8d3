//! Passive health policy (failure detection).
//!
//! # Responsibilities
//! - Decide whether a backend is excluded from selection
//! - Own the monotonic clock used to timestamp failures
//! - Optionally re-admit excluded backends after `recovery_time_ms`
//!
//! # Design Decisions
//! - Only failures observed on real traffic count; there is no active probing
//! - Time-based re-admission is opt-in; by default only a success re-admits

use std::time::{Duration, Instant};

use crate::config::HealthCheckConfig;
use crate::health::state::HealthState;

/// Threshold-based exclusion rule shared by every backend.
#[derive(Debug, Clone)]
pub struct PassivePolicy {
    failure_threshold: u32,
    recovery: Option<Duration>,
    epoch: Instant,
}

impl PassivePolicy {
    /// Exclude after `failure_threshold` consecutive failures, with no
    /// time-based recovery.
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery: None,
            epoch: Instant::now(),
        }
    }

    /// Also re-admit an excluded backend once `recovery` has elapsed since
    /// its last failure.
    pub fn with_recovery(mut self, recovery: Duration) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn from_config(config: &HealthCheckConfig) -> Self {
        let policy = Self::new(config.failure_threshold);
        if config.passive_recovery {
            policy.with_recovery(Duration::from_millis(config.recovery_time_ms))
        } else {
            policy
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Milliseconds elapsed on the policy clock.
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Whether the counter alone puts the backend over the threshold.
    pub fn over_threshold(&self, state: &HealthState) -> bool {
        state.failures() >= self.failure_threshold
    }

    /// Whether the backend must be skipped by selection right now.
    pub fn is_excluded(&self, state: &HealthState) -> bool {
        if !self.over_threshold(state) {
            return false;
        }
        match (self.recovery, state.last_failure_ms()) {
            (Some(recovery), Some(last)) => {
                let recovery_ms = u64::try_from(recovery.as_millis()).unwrap_or(u64::MAX);
                self.now_ms().saturating_sub(last) < recovery_ms
            }
            _ => true,
        }
    }
}

impl Default for PassivePolicy {
    fn default() -> Self {
        Self::from_config(&HealthCheckConfig::default())
    }
}
