//! Store-call deadlines for the session layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deadlines applied to every durable-store call the session layer makes.
///
/// `#[derive(Clone)]` because the engine keeps one copy for reporting and
/// hands another to the [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long `begin` waits for a baseline before starting from zero.
    pub load_timeout: Duration,

    /// How long `end` and forced flushes wait for their single upsert.
    pub flush_timeout: Duration,

    /// Total budget for flushing every session at shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(5),
            flush_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Smallest deadline accepted for any store call.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(10);

    /// Raises any deadline below [`Self::MIN_TIMEOUT`] to it. A zero
    /// deadline would make every store call fail instantly.
    pub fn validated(mut self) -> Self {
        for (name, value) in [
            ("load_timeout", &mut self.load_timeout),
            ("flush_timeout", &mut self.flush_timeout),
            ("shutdown_timeout", &mut self.shutdown_timeout),
        ] {
            if *value < Self::MIN_TIMEOUT {
                tracing::warn!(
                    setting = name,
                    value_ms = value.as_millis() as u64,
                    min_ms = Self::MIN_TIMEOUT.as_millis() as u64,
                    "store deadline too small, raising to minimum"
                );
                *value = Self::MIN_TIMEOUT;
            }
        }
        self
    }
}
