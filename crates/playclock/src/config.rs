//! Engine-wide configuration.

use playclock_away::AwayConfig;
use playclock_session::SessionConfig;
use playclock_sync::SyncConfig;
use serde::{Deserialize, Serialize};

/// Everything the engine can be configured with, in one place.
///
/// Every section has defaults, so a config file only needs the values it
/// changes. Reading the file is the host's job; this type just derives
/// `serde`.
///
/// | Setting                  | Default |
/// |--------------------------|---------|
/// | `away.timeout`           | 300s    |
/// | `away.cooldown`          | 5s      |
/// | `away.sweep_interval`    | 30s     |
/// | `sync.interval`          | 60s     |
/// | `sync.batch_timeout`     | 10s     |
/// | `sync.escalate_after`    | 5       |
/// | `store.load_timeout`     | 5s      |
/// | `store.flush_timeout`    | 5s      |
/// | `store.shutdown_timeout` | 10s     |
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Verbose logging. The engine only reports it; hosts use it to pick
    /// their log filter.
    pub debug: bool,
    pub away: AwayConfig,
    pub sync: SyncConfig,
    pub store: SessionConfig,
}

impl EngineConfig {
    /// Validates every section.
    pub fn validated(self) -> Self {
        Self {
            debug: self.debug,
            away: self.away.validated(),
            sync: self.sync.validated(),
            store: self.store.validated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults_for_missing_values() {
        let json = r#"{ "debug": true, "away": { "timeout": { "secs": 60, "nanos": 0 } } }"#;

        let config: EngineConfig = serde_json::from_str(json).unwrap();

        assert!(config.debug);
        assert_eq!(config.away.timeout, Duration::from_secs(60));
        assert_eq!(config.away.cooldown, Duration::from_secs(5));
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.store, SessionConfig::default());
    }

    #[test]
    fn test_validated_validates_every_section() {
        let config = EngineConfig {
            away: AwayConfig {
                timeout: Duration::ZERO,
                cooldown: Duration::ZERO,
                ..AwayConfig::default()
            },
            sync: SyncConfig {
                escalate_after: 0,
                ..SyncConfig::default()
            },
            ..EngineConfig::default()
        }
        .validated();

        assert_eq!(config.away.timeout, AwayConfig::MIN_TIMEOUT);
        assert_eq!(config.sync.escalate_after, 1);
    }
}
