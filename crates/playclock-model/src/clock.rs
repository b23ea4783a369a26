//! Clock abstraction so accounting can be driven by a simulated timeline.
//!
//! Every operation that needs "now" receives it from a [`Clock`] rather
//! than reading the system time itself. Production code uses
//! [`MonotonicClock`]; tests use [`ManualClock`] or run under tokio's
//! paused clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::types::duration_millis;
use crate::Timestamp;

/// Source of wall-clock time for the engine.
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> Timestamp;
}

/// Reads `SystemTime` directly.
///
/// Subject to NTP steps and manual clock changes; prefer
/// [`MonotonicClock`] for accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(system_millis())
    }
}

/// Wall-clock time anchored once, then advanced by tokio's monotonic clock.
///
/// Elapsed time can never go negative, and under
/// `#[tokio::test(start_paused = true)]` the clock advances exactly as
/// far as the test lets tokio time advance, so tickers and accounting
/// share one timeline.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    anchor_wall: Timestamp,
    anchor: tokio::time::Instant,
}

impl MonotonicClock {
    /// Anchors at the current system time.
    pub fn new() -> Self {
        Self::anchored_at(Timestamp(system_millis()))
    }

    /// Anchors at an explicit wall-clock value. Useful in tests that want
    /// readable timestamps.
    pub fn anchored_at(anchor_wall: Timestamp) -> Self {
        Self {
            anchor_wall,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        self.anchor_wall.saturating_add(self.anchor.elapsed())
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_ms: AtomicU64::new(start.as_millis()),
        }
    }

    /// Moves the clock forward by `d`.
    pub fn advance(&self, d: Duration) {
        self.now_ms.fetch_add(duration_millis(d), Ordering::SeqCst);
    }

    /// Jumps the clock to `t` (may move backwards).
    pub fn set(&self, t: Timestamp) {
        self.now_ms.store(t.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_ms.load(Ordering::SeqCst))
    }
}

fn system_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_millis)
        .unwrap_or(0)
}
