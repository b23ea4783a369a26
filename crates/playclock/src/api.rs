//! The engagement API and lifecycle hooks.
//!
//! Queries are answered from the live sessions and never wait on the
//! store, except the few methods whose names say so (`*_async`,
//! `has_stored_record`, `force_flush`). Unknown players get neutral
//! answers (`0`, `false`, `-1`) rather than errors.

use std::time::Duration;

use playclock_away::SignalOutcome;
use playclock_model::{AwayStatusChanged, PlayerId};
use playclock_session::{BeginOutcome, EndOutcome, SessionError, SessionView, accumulator};
use playclock_store::{PersistenceGateway, bounded};
use tokio::sync::mpsc;

use crate::{Engine, EngagementError};

// ---------------------------------------------------------------------------
// Lifecycle hooks
// ---------------------------------------------------------------------------

impl<G: PersistenceGateway> Engine<G> {
    /// The host reports that a player's session began.
    ///
    /// Returns [`BeginOutcome::Cancelled`] after shutdown, including for a
    /// begin whose load was still in flight when shutdown drained the store.
    pub async fn on_session_begin(&self, player_id: PlayerId, display_name: &str) -> BeginOutcome {
        if !self.is_available() {
            tracing::warn!(%player_id, "session begin after shutdown, ignored");
            return BeginOutcome::Cancelled;
        }
        self.state.store.begin(player_id, display_name).await
    }

    /// The host reports that a player's session ended.
    pub async fn on_session_end(&self, player_id: PlayerId) -> EndOutcome {
        if !self.is_available() {
            return EndOutcome::NotTracked;
        }
        self.state.store.end(player_id).await
    }

    /// The host reports qualifying activity (movement, chat, a command).
    ///
    /// Never blocks on anything but the one session's lock.
    pub fn on_qualifying_activity(&self, player_id: PlayerId) -> SignalOutcome {
        let Some(handle) = self.state.store.handle(player_id) else {
            return SignalOutcome::Ignored;
        };
        self.state.detector.on_signal(&handle, self.state.store.now())
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

impl<G: PersistenceGateway> Engine<G> {
    /// Total engagement seconds, from memory only.
    ///
    /// Live players get their point-in-time total; players whose final
    /// write is still pending get the parked total; anyone else gets 0.
    /// Use [`total_engagement_seconds_async`](Self::total_engagement_seconds_async)
    /// to fall back to the store.
    pub fn total_engagement_seconds(&self, player_id: PlayerId) -> u64 {
        self.cached_total(player_id).unwrap_or(0)
    }

    /// Total engagement seconds, falling back to the durable store for
    /// players not in memory. A store failure is logged and reported as 0.
    pub async fn total_engagement_seconds_async(&self, player_id: PlayerId) -> u64 {
        if let Some(total) = self.cached_total(player_id) {
            return total;
        }

        let store = &self.state.store;
        let load = store.gateway().load_baseline(player_id);
        match bounded(store.config().load_timeout, load).await {
            Ok(baseline) => baseline.map_or(0, |b| b.total_seconds),
            Err(e) => {
                tracing::warn!(%player_id, error = %e, "total lookup failed, reporting zero");
                0
            }
        }
    }

    fn cached_total(&self, player_id: PlayerId) -> Option<u64> {
        let store = &self.state.store;
        match store.handle(player_id) {
            Some(handle) => Some(accumulator::total_seconds(&handle.lock(), store.now())),
            None => store.parked_total(player_id),
        }
    }

    /// Active seconds accrued in the current session (0 if untracked).
    pub fn current_interval_seconds(&self, player_id: PlayerId) -> u64 {
        let store = &self.state.store;
        store.handle(player_id).map_or(0, |handle| {
            accumulator::session_active_seconds(&handle.lock(), store.now())
        })
    }

    pub fn is_away(&self, player_id: PlayerId) -> bool {
        self.state
            .store
            .handle(player_id)
            .is_some_and(|handle| handle.lock().is_away())
    }

    /// Milliseconds since the player's last qualifying activity, or -1 if
    /// the player isn't tracked.
    pub fn time_since_last_activity_millis(&self, player_id: PlayerId) -> i64 {
        let store = &self.state.store;
        let Some(handle) = store.handle(player_id) else {
            return -1;
        };
        let idle = store.now().millis_since(handle.lock().last_activity());
        i64::try_from(idle).unwrap_or(i64::MAX)
    }

    pub fn is_tracked(&self, player_id: PlayerId) -> bool {
        self.state.store.contains(player_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.state.store.len()
    }

    pub fn away_count(&self) -> usize {
        self.state.store.away_count()
    }

    /// A copy of one live session.
    pub fn session(&self, player_id: PlayerId) -> Option<SessionView> {
        self.state.store.get(player_id)
    }

    /// Copies of every live session.
    pub fn sessions(&self) -> Vec<SessionView> {
        self.state.store.snapshot()
    }

    /// Whether the durable store holds a record for this player.
    ///
    /// # Errors
    /// [`EngagementError::Store`] if the store fails or times out.
    pub async fn has_stored_record(&self, player_id: PlayerId) -> Result<bool, EngagementError> {
        let store = &self.state.store;
        let load = store.gateway().load_baseline(player_id);
        let baseline = bounded(store.config().load_timeout, load).await?;
        Ok(baseline.is_some())
    }
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

impl<G: PersistenceGateway> Engine<G> {
    /// Credits `seconds` to a live player's baseline.
    ///
    /// Returns `Ok(false)` if the player isn't tracked.
    ///
    /// # Errors
    /// [`EngagementError::NegativeSeconds`] if `seconds < 0`.
    pub fn add_engagement(&self, player_id: PlayerId, seconds: i64) -> Result<bool, EngagementError> {
        let seconds = non_negative(seconds)?;
        let Some(handle) = self.state.store.handle(player_id) else {
            return Ok(false);
        };
        accumulator::add_baseline(&mut handle.lock(), seconds);
        tracing::info!(%player_id, seconds, "engagement added");
        Ok(true)
    }

    /// Debits `seconds` from a live player's baseline, flooring it at zero.
    /// Time accrued in the current session is never removed.
    ///
    /// # Errors
    /// [`EngagementError::NegativeSeconds`] if `seconds < 0`.
    pub fn remove_engagement(
        &self,
        player_id: PlayerId,
        seconds: i64,
    ) -> Result<bool, EngagementError> {
        let seconds = non_negative(seconds)?;
        let Some(handle) = self.state.store.handle(player_id) else {
            return Ok(false);
        };
        accumulator::remove_baseline(&mut handle.lock(), seconds);
        tracing::info!(%player_id, seconds, "engagement removed");
        Ok(true)
    }

    /// Forces a player's away status. Returns `false` if untracked.
    pub fn set_away(&self, player_id: PlayerId, away: bool) -> bool {
        let store = &self.state.store;
        let Some(handle) = store.handle(player_id) else {
            return false;
        };
        self.state.detector.set_away(&handle, away, store.now());
        true
    }

    /// Writes a live player's current total immediately.
    ///
    /// Returns `Ok(false)` if the player isn't tracked.
    ///
    /// # Errors
    /// [`EngagementError::Store`] if the write fails; the next sync cycle
    /// retries it.
    pub async fn force_flush(&self, player_id: PlayerId) -> Result<bool, EngagementError> {
        match self.state.store.flush_one(player_id).await {
            Ok(()) => Ok(true),
            Err(SessionError::NotTracked(_)) => Ok(false),
            Err(e) => Err(EngagementError::from_session(e)),
        }
    }

    pub fn away_timeout(&self) -> Duration {
        self.state.detector.timeout()
    }

    /// Changes the away timeout at runtime. Applies from the next sweep.
    pub fn set_away_timeout(&self, timeout: Duration) {
        self.state.detector.set_away_timeout(timeout);
    }

    /// Changes the per-player signal cooldown at runtime, capped at the
    /// away timeout.
    pub fn set_signal_cooldown(&self, cooldown: Duration) {
        self.state.detector.set_cooldown(cooldown);
    }

    /// Subscribes to away/active notifications.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AwayStatusChanged> {
        self.state.detector.subscribe()
    }
}

fn non_negative(seconds: i64) -> Result<u64, EngagementError> {
    u64::try_from(seconds).map_err(|_| EngagementError::NegativeSeconds(seconds))
}
