//! Away-detection configuration and state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AwayConfig
// ---------------------------------------------------------------------------

/// Settings for the away detector.
///
/// `timeout` and `cooldown` can be changed at runtime through
/// [`AwayDetector`](crate::AwayDetector); `sweep_interval` is fixed once the
/// engine's sweep task is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwayConfig {
    /// Idle time after which a sweep marks the player away.
    pub timeout: Duration,

    /// Per-player debounce window for activity signals.
    pub cooldown: Duration,

    /// Time between sweeps. Zero disables sweeping.
    pub sweep_interval: Duration,
}

impl Default for AwayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            cooldown: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl AwayConfig {
    /// Shortest accepted away timeout.
    pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

    /// Clamp out-of-range values. Rules:
    /// - `timeout` raised to at least [`Self::MIN_TIMEOUT`]
    /// - `cooldown` capped at `timeout` (a longer debounce would hide the
    ///   very activity the timeout measures)
    pub fn validated(mut self) -> Self {
        if self.timeout < Self::MIN_TIMEOUT {
            tracing::warn!(
                timeout_ms = self.timeout.as_millis() as u64,
                "away timeout below minimum, raising"
            );
            self.timeout = Self::MIN_TIMEOUT;
        }
        if self.cooldown > self.timeout {
            tracing::warn!(
                cooldown_ms = self.cooldown.as_millis() as u64,
                timeout_ms = self.timeout.as_millis() as u64,
                "signal cooldown longer than away timeout, capping"
            );
            self.cooldown = self.timeout;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// AwayState
// ---------------------------------------------------------------------------

/// A player's classification.
///
/// ```text
/// Active ──(idle ≥ timeout, sweep)──→ Away
///   ↑                                   │
///   └────(signal or admin clear)────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AwayState {
    Active,
    Away,
}

impl AwayState {
    pub fn from_away(away: bool) -> Self {
        if away { Self::Away } else { Self::Active }
    }

    pub fn is_away(self) -> bool {
        matches!(self, Self::Away)
    }

    /// The state a sweep assigns after `idle` without activity.
    pub fn for_idle(idle: Duration, timeout: Duration) -> Self {
        Self::from_away(idle >= timeout)
    }
}

impl std::fmt::Display for AwayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Away => write!(f, "Away"),
        }
    }
}
