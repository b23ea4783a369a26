//! The away detector: signals, sweeps and admin overrides.
//!
//! All three paths follow the same shape:
//!
//! 1. lock the one session involved
//! 2. decide, and apply the transition through the accumulator
//! 3. publish the notification, if the state actually changed
//! 4. release the lock
//!
//! Publishing under the session lock keeps each player's notifications in
//! the order their state changed; sends are unbounded and never block. The
//! accumulator's transitions are no-ops when the state already matches, so
//! a signal and a sweep racing on one player notify once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use playclock_model::{AwayStatusChanged, PlayerId, Timestamp};
use playclock_session::{SessionHandle, accumulator};
use tokio::sync::mpsc;

use crate::{AwayConfig, AwayNotifier, AwayState};

/// What [`AwayDetector::on_signal`] did with one activity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Inside the cooldown. Last activity was updated, nothing evaluated.
    Debounced,
    /// Active player, outside the cooldown. Evaluated, still active.
    Evaluated,
    /// The player was away and is now active again.
    Returned,
    /// The session has already ended.
    Ignored,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions looked at (closed ones are skipped).
    pub evaluated: usize,
    pub went_away: Vec<PlayerId>,
    pub returned: Vec<PlayerId>,
}

impl SweepReport {
    pub fn changed(&self) -> usize {
        self.went_away.len() + self.returned.len()
    }
}

/// Per-player `Active`/`Away` state machine driver.
///
/// Holds no per-player state of its own; everything lives in the
/// [`PlayerSession`](playclock_session::PlayerSession) behind each handle.
/// Timeout and cooldown are atomics so they can be changed while signals
/// and sweeps are running.
#[derive(Debug)]
pub struct AwayDetector {
    timeout_ms: AtomicU64,
    cooldown_ms: AtomicU64,
    notifier: AwayNotifier,
}

impl AwayDetector {
    pub fn new(config: &AwayConfig) -> Self {
        let config = config.clone().validated();
        Self {
            timeout_ms: AtomicU64::new(millis(config.timeout)),
            cooldown_ms: AtomicU64::new(millis(config.cooldown)),
            notifier: AwayNotifier::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms.load(Ordering::Relaxed))
    }

    /// Changes the away timeout. Takes effect on the next sweep. Values
    /// below [`AwayConfig::MIN_TIMEOUT`] are raised to it, and a cooldown
    /// longer than the new timeout is lowered to match.
    pub fn set_away_timeout(&self, timeout: Duration) {
        let timeout_ms = millis(timeout.max(AwayConfig::MIN_TIMEOUT));
        self.timeout_ms.store(timeout_ms, Ordering::Relaxed);
        let previous_cooldown = self.cooldown_ms.fetch_min(timeout_ms, Ordering::Relaxed);
        if previous_cooldown > timeout_ms {
            tracing::warn!(
                cooldown_ms = previous_cooldown,
                timeout_ms,
                "signal cooldown longer than away timeout, capping"
            );
        }
        tracing::info!(timeout_ms, "away timeout changed");
    }

    /// Changes the per-player signal cooldown, capped at the away timeout.
    pub fn set_cooldown(&self, cooldown: Duration) {
        let timeout_ms = self.timeout_ms.load(Ordering::Relaxed);
        let mut cooldown_ms = millis(cooldown);
        if cooldown_ms > timeout_ms {
            tracing::warn!(
                cooldown_ms,
                timeout_ms,
                "signal cooldown longer than away timeout, capping"
            );
            cooldown_ms = timeout_ms;
        }
        self.cooldown_ms.store(cooldown_ms, Ordering::Relaxed);
        tracing::info!(cooldown_ms, "signal cooldown changed");
    }

    /// Registers a new notification subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AwayStatusChanged> {
        self.notifier.subscribe()
    }

    pub fn notifier(&self) -> &AwayNotifier {
        &self.notifier
    }

    // -- inputs -------------------------------------------------------------

    /// Handles one qualifying activity signal at `now`.
    ///
    /// Last activity is always updated. An away player returns immediately,
    /// bypassing the cooldown; an active one is evaluated at most once per
    /// cooldown window.
    pub fn on_signal(&self, handle: &SessionHandle, now: Timestamp) -> SignalOutcome {
        let cooldown_ms = self.cooldown_ms.load(Ordering::Relaxed);

        let player_id = handle.player_id();
        let mut session = handle.lock();
        if session.is_closed() {
            return SignalOutcome::Ignored;
        }
        session.record_activity(now);

        if session.is_away() {
            accumulator::transition_to_active(&mut session, now);
            session.mark_evaluated(now);
            self.publish(player_id, AwayState::Active, now);
            tracing::debug!(%player_id, "player returned on activity");
            SignalOutcome::Returned
        } else if session
            .last_evaluated()
            .is_some_and(|at| now.millis_since(at) < cooldown_ms)
        {
            tracing::trace!(%player_id, "signal debounced");
            SignalOutcome::Debounced
        } else {
            session.mark_evaluated(now);
            SignalOutcome::Evaluated
        }
    }

    /// Re-classifies every session by idle time.
    ///
    /// Anyone idle for at least the timeout goes away; anyone marked away
    /// but active within the timeout comes back. Sessions are locked one at
    /// a time.
    pub fn sweep(&self, handles: &[SessionHandle], now: Timestamp) -> SweepReport {
        let timeout = self.timeout();
        let mut report = SweepReport::default();

        for handle in handles {
            let player_id = handle.player_id();
            let mut session = handle.lock();
            if session.is_closed() {
                continue;
            }
            report.evaluated += 1;

            let idle = Duration::from_millis(now.millis_since(session.last_activity()));
            match AwayState::for_idle(idle, timeout) {
                AwayState::Away if accumulator::transition_to_away(&mut session, now) => {
                    self.publish(player_id, AwayState::Away, now);
                    tracing::debug!(%player_id, "player went away");
                    report.went_away.push(player_id);
                }
                AwayState::Active if accumulator::transition_to_active(&mut session, now) => {
                    self.publish(player_id, AwayState::Active, now);
                    tracing::debug!(%player_id, "player active again");
                    report.returned.push(player_id);
                }
                _ => {}
            }
        }

        if report.changed() > 0 {
            tracing::debug!(
                evaluated = report.evaluated,
                went_away = report.went_away.len(),
                returned = report.returned.len(),
                "away sweep"
            );
        }
        report
    }

    /// Admin override. Clearing away also resets last activity to `now`, so
    /// the next sweep doesn't immediately flip the player back.
    ///
    /// Returns `true` if the state changed.
    pub fn set_away(&self, handle: &SessionHandle, away: bool, now: Timestamp) -> bool {
        let player_id = handle.player_id();
        let mut session = handle.lock();
        let changed = if away {
            accumulator::transition_to_away(&mut session, now)
        } else {
            session.record_activity(now);
            accumulator::transition_to_active(&mut session, now)
        };

        if changed {
            self.publish(player_id, AwayState::from_away(away), now);
            tracing::info!(%player_id, away, "away status set by admin");
        }
        changed
    }

    fn publish(&self, player_id: PlayerId, state: AwayState, timestamp: Timestamp) {
        self.notifier.publish(AwayStatusChanged {
            player_id,
            away: state.is_away(),
            timestamp,
        });
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
