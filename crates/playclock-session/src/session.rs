//! Session types: the accounting state of one tracked player.
//!
//! A session records:
//! - WHO the player is (`PlayerId`, display name)
//! - HOW MUCH they had before this session (the baseline)
//! - WHEN they were active during it (closed millis + the open interval)
//! - WHETHER anything changed since the last successful flush (`dirty`)

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use playclock_model::{PlayerId, PlaytimeRecord, Timestamp};

use crate::accumulator;

// ---------------------------------------------------------------------------
// PlayerSession
// ---------------------------------------------------------------------------

/// A single player's engagement state for the current session.
///
/// Fields are private to the crate. Interval bookkeeping and the baseline
/// only change through [`accumulator`] functions; the few public mutators
/// here touch activity marks, the name, and the dirty flag.
///
/// ## Invariant
///
/// While the session is live, `active_period_start.is_some()` exactly when
/// `away` is `false`. After [`accumulator::fold_into_baseline`] the session
/// is closed: the interval is gone, `away` is left as it was, and every
/// further transition is a no-op.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub(crate) player_id: PlayerId,
    pub(crate) display_name: String,
    pub(crate) baseline_seconds: u64,
    pub(crate) session_start: Timestamp,
    pub(crate) active_period_start: Option<Timestamp>,
    pub(crate) accumulated_active_millis: u64,
    pub(crate) away: bool,
    pub(crate) dirty: bool,
    /// Last qualifying activity (or session start / admin clear).
    pub(crate) last_activity: Timestamp,
    /// Last signal evaluated outside the debounce window.
    pub(crate) last_evaluated: Option<Timestamp>,
    pub(crate) session_end: Option<Timestamp>,
    pub(crate) closed: bool,
}

impl PlayerSession {
    /// Starts a session at `now`: active, with an interval open since `now`,
    /// and dirty so the first sync cycle records the login.
    pub fn new(
        player_id: PlayerId,
        display_name: impl Into<String>,
        baseline_seconds: u64,
        now: Timestamp,
    ) -> Self {
        Self {
            player_id,
            display_name: display_name.into(),
            baseline_seconds,
            session_start: now,
            active_period_start: Some(now),
            accumulated_active_millis: 0,
            away: false,
            dirty: true,
            last_activity: now,
            last_evaluated: None,
            session_end: None,
            closed: false,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn baseline_seconds(&self) -> u64 {
        self.baseline_seconds
    }

    pub fn session_start(&self) -> Timestamp {
        self.session_start
    }

    pub fn session_end(&self) -> Option<Timestamp> {
        self.session_end
    }

    pub fn active_period_start(&self) -> Option<Timestamp> {
        self.active_period_start
    }

    pub fn accumulated_active_millis(&self) -> u64 {
        self.accumulated_active_millis
    }

    pub fn is_away(&self) -> bool {
        self.away
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn last_activity(&self) -> Timestamp {
        self.last_activity
    }

    pub fn last_evaluated(&self) -> Option<Timestamp> {
        self.last_evaluated
    }

    /// Updates the cosmetic name. Marks dirty only if it actually changed.
    pub fn rename(&mut self, display_name: &str) {
        if self.display_name != display_name {
            self.display_name = display_name.to_string();
            self.dirty = true;
        }
    }

    /// Records a qualifying activity at `now`. Never moves backwards and
    /// never marks the session dirty, since activity marks aren't persisted.
    pub fn record_activity(&mut self, now: Timestamp) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Notes that a signal at `now` was evaluated (outside the cooldown).
    pub fn mark_evaluated(&mut self, now: Timestamp) {
        self.last_evaluated = Some(now);
    }

    /// Clears the dirty flag. Called by flushes right before writing.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Re-marks the session dirty after a failed flush so the next cycle
    /// retries it.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// The record a flush at `now` would write. Does not close the open
    /// interval; its elapsed time is counted into the total.
    pub fn record_at(&self, now: Timestamp) -> PlaytimeRecord {
        accumulator::point_in_time_record(self, now)
    }

    /// A read-only copy of the session as of `now`.
    pub fn view(&self, now: Timestamp) -> SessionView {
        SessionView {
            player_id: self.player_id,
            display_name: self.display_name.clone(),
            baseline_seconds: self.baseline_seconds,
            session_start: self.session_start,
            active_period_start: self.active_period_start,
            accumulated_active_millis: self.accumulated_active_millis,
            away: self.away,
            dirty: self.dirty,
            last_activity: self.last_activity,
            total_seconds: accumulator::total_seconds(self, now),
            session_active_seconds: accumulator::session_active_seconds(self, now),
            taken_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionView
// ---------------------------------------------------------------------------

/// A point-in-time copy of a session, safe to hand to reporting code.
///
/// Holding a view never blocks the live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub player_id: PlayerId,
    pub display_name: String,
    pub baseline_seconds: u64,
    pub session_start: Timestamp,
    pub active_period_start: Option<Timestamp>,
    pub accumulated_active_millis: u64,
    pub away: bool,
    pub dirty: bool,
    pub last_activity: Timestamp,
    /// Total engagement as of `taken_at`.
    pub total_seconds: u64,
    /// Active seconds within this session as of `taken_at`.
    pub session_active_seconds: u64,
    pub taken_at: Timestamp,
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Shared, lockable reference to one live session.
///
/// Cheap to clone (an `Arc`). The registry hands these out so callers can
/// lock exactly one session without holding the registry itself.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    player_id: PlayerId,
    inner: Arc<Mutex<PlayerSession>>,
}

impl SessionHandle {
    pub fn new(session: PlayerSession) -> Self {
        Self {
            player_id: session.player_id,
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Locks the session for one serialized mutation or read.
    ///
    /// A poisoned lock is recovered: every mutation is a single
    /// accumulator call that either ran to completion or not at all.
    pub fn lock(&self) -> MutexGuard<'_, PlayerSession> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks briefly and copies the session out.
    pub fn view(&self, now: Timestamp) -> SessionView {
        self.lock().view(now)
    }
}
