//! Active-time accounting over a [`PlayerSession`].
//!
//! These are the only functions that open, close, or fold active
//! intervals and the only ones that touch the baseline. Callers hold the
//! session's lock (via [`SessionHandle::lock`](crate::SessionHandle::lock))
//! for the duration of one call, which is what serializes transitions per
//! player.
//!
//! Everything is kept in milliseconds. Seconds appear only in the values
//! returned to reporting code, truncated once at that point, so many short
//! intervals don't each lose a fraction of a second.
//!
//! ```text
//!   ACTIVE ──transition_to_away──→ AWAY
//!     ↑                              │
//!     └─────transition_to_active─────┘
//!
//!   either ──fold_into_baseline──→ closed
//! ```

use playclock_model::{PlaytimeRecord, Timestamp};

use crate::PlayerSession;

const MILLIS_PER_SECOND: u64 = 1_000;

/// Elapsed millis of the open interval at `now`, or 0 when away or closed.
pub fn open_interval_millis(session: &PlayerSession, now: Timestamp) -> u64 {
    session
        .active_period_start
        .map_or(0, |start| now.millis_since(start))
}

/// Active millis within this session: closed intervals plus the open one.
pub fn session_active_millis(session: &PlayerSession, now: Timestamp) -> u64 {
    session
        .accumulated_active_millis
        .saturating_add(open_interval_millis(session, now))
}

/// Active seconds within this session, truncated.
pub fn session_active_seconds(session: &PlayerSession, now: Timestamp) -> u64 {
    session_active_millis(session, now) / MILLIS_PER_SECOND
}

/// Total engagement at `now`: baseline plus this session's active time.
pub fn total_seconds(session: &PlayerSession, now: Timestamp) -> u64 {
    session
        .baseline_seconds
        .saturating_add(session_active_seconds(session, now))
}

/// Alias of [`total_seconds`] under the name the engine API uses.
pub fn current_active_seconds(session: &PlayerSession, now: Timestamp) -> u64 {
    total_seconds(session, now)
}

/// The record a flush at `now` writes: the point-in-time total, with the
/// open interval counted but left open.
pub fn point_in_time_record(session: &PlayerSession, now: Timestamp) -> PlaytimeRecord {
    PlaytimeRecord {
        player_id: session.player_id,
        display_name: session.display_name.clone(),
        total_seconds: total_seconds(session, now),
        last_login: session.session_start,
        last_logout: session.session_end,
    }
}

/// Closes the open interval and marks the player away.
///
/// Returns `true` if the state changed. Already away (or closed) is a
/// no-op that returns `false`, so racing callers can't double-count.
pub fn transition_to_away(session: &mut PlayerSession, now: Timestamp) -> bool {
    if session.away || session.closed {
        return false;
    }
    close_open_interval(session, now);
    session.away = true;
    session.dirty = true;
    true
}

/// Opens a new interval at `now` and marks the player active.
///
/// Returns `true` if the state changed; no-op when already active or closed.
pub fn transition_to_active(session: &mut PlayerSession, now: Timestamp) -> bool {
    if !session.away || session.closed {
        return false;
    }
    session.active_period_start = Some(now);
    session.away = false;
    session.dirty = true;
    true
}

/// Ends the session's accounting and folds it into the baseline.
///
/// Closes any open interval (without flipping `away`; the session is
/// ending, not going idle), adds the whole seconds of accumulated time to
/// the baseline, resets the accumulator, and marks the session closed.
/// Sub-second remainders are dropped. Returns the new baseline. Folding a
/// closed session again changes nothing.
pub fn fold_into_baseline(session: &mut PlayerSession, now: Timestamp) -> u64 {
    if session.closed {
        return session.baseline_seconds;
    }
    close_open_interval(session, now);
    let whole_seconds = session.accumulated_active_millis / MILLIS_PER_SECOND;
    session.baseline_seconds = session.baseline_seconds.saturating_add(whole_seconds);
    session.accumulated_active_millis = 0;
    session.session_end = Some(now);
    session.closed = true;
    session.dirty = true;
    session.baseline_seconds
}

/// Administrative credit. Goes to the baseline; intervals are untouched.
pub fn add_baseline(session: &mut PlayerSession, seconds: u64) {
    session.baseline_seconds = session.baseline_seconds.saturating_add(seconds);
    session.dirty = true;
}

/// Administrative debit. Floors the baseline at zero and never truncates
/// accumulated or open time.
pub fn remove_baseline(session: &mut PlayerSession, seconds: u64) {
    session.baseline_seconds = session.baseline_seconds.saturating_sub(seconds);
    session.dirty = true;
}

fn close_open_interval(session: &mut PlayerSession, now: Timestamp) {
    if let Some(start) = session.active_period_start.take() {
        session.accumulated_active_millis = session
            .accumulated_active_millis
            .saturating_add(now.millis_since(start));
    }
}

// =========================================================================
// Tests
// =========================================================================
