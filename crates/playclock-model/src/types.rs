//! Core value types: identifiers, timestamps, store records, notifications.
//!
//! Everything here is an immutable value. Records are built by the
//! session layer and handed to the store; nothing mutates them afterwards.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A stable, opaque identifier for a tracked player.
///
/// Newtype over `u64` so it can't be confused with a count of seconds.
/// `#[serde(transparent)]` stores it as the bare number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A wall-clock instant in milliseconds since the Unix epoch.
///
/// All accounting is done in milliseconds; seconds only appear when a
/// total is reported. Arithmetic saturates, so a clock that steps
/// backwards yields zero elapsed time instead of an underflow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The epoch itself. Handy as a starting point for manual clocks.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Milliseconds since the epoch.
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed from `earlier` to `self` (0 if `earlier` is later).
    pub fn millis_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// `self + d`, saturating.
    pub fn saturating_add(self, d: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(duration_millis(d)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Converts a `Duration` to whole milliseconds, clamped to `u64`.
pub(crate) fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Store records
// ---------------------------------------------------------------------------

/// What the durable store knows about a player before a session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub player_id: PlayerId,
    pub display_name: String,
    /// Total engaged seconds accrued in all previous sessions.
    pub total_seconds: u64,
}

/// One row written to the durable store.
///
/// Upserts are keyed by `player_id`, so writing the same record twice is
/// harmless, so failed writes can simply be retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaytimeRecord {
    pub player_id: PlayerId,
    pub display_name: String,
    /// Point-in-time total (baseline plus everything accrued so far).
    pub total_seconds: u64,
    /// When the session this record was taken from began.
    pub last_login: Timestamp,
    /// When that session ended, or `None` while it is still live.
    pub last_logout: Option<Timestamp>,
}

impl PlaytimeRecord {
    /// The baseline a fresh session would start from if this record were
    /// the latest thing the store held.
    pub fn to_baseline(&self) -> BaselineRecord {
        BaselineRecord {
            player_id: self.player_id,
            display_name: self.display_name.clone(),
            total_seconds: self.total_seconds,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Emitted once per logical away/active transition.
///
/// Delivery is best effort: observers that have gone away simply miss it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwayStatusChanged {
    pub player_id: PlayerId,
    /// `true` if the player just went away, `false` if they came back.
    pub away: bool,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_display_uses_prefix() {
        assert_eq!(PlayerId(42).to_string(), "P-42");
    }

    #[test]
    fn test_player_id_serializes_as_bare_number() {
        let json = serde_json::to_string(&PlayerId(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_millis_since_saturates_when_earlier_is_later() {
        let a = Timestamp(1_000);
        let b = Timestamp(4_500);
        assert_eq!(b.millis_since(a), 3_500);
        assert_eq!(a.millis_since(b), 0);
    }

    #[test]
    fn test_timestamp_saturating_add_duration() {
        let t = Timestamp(1_000).saturating_add(Duration::from_secs(2));
        assert_eq!(t, Timestamp(3_000));
    }

    #[test]
    fn test_timestamp_saturating_add_clamps_at_max() {
        let t = Timestamp(u64::MAX - 5).saturating_add(Duration::from_secs(1));
        assert_eq!(t, Timestamp(u64::MAX));
    }

    #[test]
    fn test_record_to_baseline_keeps_total_and_name() {
        let record = PlaytimeRecord {
            player_id: PlayerId(3),
            display_name: "steve".into(),
            total_seconds: 3_750,
            last_login: Timestamp(10),
            last_logout: Some(Timestamp(20)),
        };
        let baseline = record.to_baseline();
        assert_eq!(baseline.player_id, PlayerId(3));
        assert_eq!(baseline.display_name, "steve");
        assert_eq!(baseline.total_seconds, 3_750);
    }
}
