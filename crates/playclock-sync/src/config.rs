//! Sync cycle configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the periodic sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Time between cycles. Zero disables periodic syncing; sessions are
    /// then only written when they end or are flushed explicitly.
    pub interval: Duration,

    /// Deadline for one batched write.
    pub batch_timeout: Duration,

    /// Consecutive failed cycles after which failures are logged as errors
    /// instead of warnings.
    pub escalate_after: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_timeout: Duration::from_secs(10),
            escalate_after: 5,
        }
    }
}

impl SyncConfig {
    /// Smallest accepted batch deadline.
    pub const MIN_BATCH_TIMEOUT: Duration = Duration::from_millis(10);

    pub fn validated(mut self) -> Self {
        if self.batch_timeout < Self::MIN_BATCH_TIMEOUT {
            tracing::warn!(
                batch_timeout_ms = self.batch_timeout.as_millis() as u64,
                "batch timeout below minimum, raising"
            );
            self.batch_timeout = Self::MIN_BATCH_TIMEOUT;
        }
        if self.escalate_after == 0 {
            self.escalate_after = 1;
        }
        if !self.interval.is_zero() && self.batch_timeout > self.interval {
            tracing::warn!(
                batch_timeout_ms = self.batch_timeout.as_millis() as u64,
                interval_ms = self.interval.as_millis() as u64,
                "batch timeout exceeds sync interval, cycles will overlap their ticks"
            );
        }
        self
    }
}
