//! Reconnect delay schedule.
//!
//! Attempt `n` (1-indexed) waits `base × 2^(n−1)`, clamped to `max`. No jitter:
//! the schedule is deterministic so tests and logs line up.

use std::time::Duration;

use crate::config::BridgeConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub base: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Attempts allowed before the session is declared failed.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            base: config.backoff_base,
            max: config.backoff_max,
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Delay for 1-indexed `attempt`. Attempt 0 is treated as attempt 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}
