//! Integration tests for the away detector.
//!
//! Sessions are built directly and timestamps passed explicitly, so every
//! test is synchronous apart from draining notification channels. The
//! threaded tests at the end drive one session from several OS threads.

use std::sync::Barrier;
use std::time::Duration;

use playclock_away::{AwayConfig, AwayDetector, SignalOutcome};
use playclock_model::{AwayStatusChanged, PlayerId, Timestamp};
use playclock_session::{PlayerSession, SessionHandle, accumulator};
use tokio::sync::mpsc::UnboundedReceiver;

// =========================================================================
// Helpers
// =========================================================================

const ALEX: PlayerId = PlayerId(1);

fn at(secs: u64) -> Timestamp {
    Timestamp(secs * 1_000)
}

/// 60s timeout, 5s cooldown.
fn detector() -> AwayDetector {
    AwayDetector::new(&AwayConfig {
        timeout: Duration::from_secs(60),
        cooldown: Duration::from_secs(5),
        ..AwayConfig::default()
    })
}

fn session(start: Timestamp) -> SessionHandle {
    SessionHandle::new(PlayerSession::new(ALEX, "alex", 0, start))
}

fn drain(rx: &mut UnboundedReceiver<AwayStatusChanged>) -> Vec<AwayStatusChanged> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =========================================================================
// on_signal()
// =========================================================================

#[test]
fn test_on_signal_burst_evaluates_once_per_cooldown() {
    let d = detector();
    let h = session(at(0));
    let start = Timestamp(10_000);

    let outcomes: Vec<_> = (0..10)
        .map(|i| d.on_signal(&h, Timestamp(start.as_millis() + i * 100)))
        .collect();

    assert_eq!(outcomes[0], SignalOutcome::Evaluated);
    assert!(outcomes[1..].iter().all(|o| *o == SignalOutcome::Debounced));
    assert_eq!(
        h.lock().last_activity(),
        Timestamp(10_900),
        "the last debounced signal still updates activity"
    );
}

#[test]
fn test_on_signal_after_cooldown_evaluates_again() {
    let d = detector();
    let h = session(at(0));

    assert_eq!(d.on_signal(&h, at(10)), SignalOutcome::Evaluated);
    assert_eq!(d.on_signal(&h, at(14)), SignalOutcome::Debounced);
    assert_eq!(d.on_signal(&h, at(15)), SignalOutcome::Evaluated);
}

#[test]
fn test_on_signal_while_away_returns_immediately() {
    let d = detector();
    let mut rx = d.subscribe();
    let h = session(at(0));
    d.on_signal(&h, at(1));
    d.sweep(&[h.clone()], at(100));
    drain(&mut rx);

    let outcome = d.on_signal(&h, at(101));

    assert_eq!(outcome, SignalOutcome::Returned);
    assert!(!h.lock().is_away());
    assert_eq!(h.lock().active_period_start(), Some(at(101)));
    assert_eq!(
        drain(&mut rx),
        vec![AwayStatusChanged {
            player_id: ALEX,
            away: false,
            timestamp: at(101),
        }]
    );
}

#[test]
fn test_on_signal_on_closed_session_is_ignored() {
    let d = detector();
    let h = session(at(0));
    accumulator::fold_into_baseline(&mut h.lock(), at(10));

    assert_eq!(d.on_signal(&h, at(20)), SignalOutcome::Ignored);
    assert_eq!(h.lock().last_activity(), at(0));
}

// =========================================================================
// sweep()
// =========================================================================

#[test]
fn test_sweep_marks_idle_player_away_at_timeout() {
    let d = detector();
    let mut rx = d.subscribe();
    let h = session(at(0));

    let before = d.sweep(&[h.clone()], at(59));
    let after = d.sweep(&[h.clone()], at(60));

    assert!(before.went_away.is_empty());
    assert_eq!(after.went_away, vec![ALEX]);
    assert_eq!(after.evaluated, 1);
    assert!(h.lock().is_away());
    // Time up to the sweep counts; nothing after it does.
    assert_eq!(accumulator::total_seconds(&h.lock(), at(500)), 60);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn test_sweep_repeated_emits_no_duplicates() {
    let d = detector();
    let mut rx = d.subscribe();
    let h = session(at(0));

    for t in [70, 100, 130, 160] {
        d.sweep(&[h.clone()], at(t));
    }

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(events[0].away);
    assert_eq!(events[0].timestamp, at(70));
}

#[test]
fn test_sweep_returns_away_player_with_recent_activity() {
    let d = detector();
    let h = session(at(0));
    d.set_away(&h, true, at(10));
    h.lock().record_activity(at(30));

    let report = d.sweep(&[h.clone()], at(40));

    assert_eq!(report.returned, vec![ALEX]);
    assert!(!h.lock().is_away());
}

#[test]
fn test_sweep_skips_closed_sessions() {
    let d = detector();
    let live = session(at(0));
    let ended = SessionHandle::new(PlayerSession::new(PlayerId(2), "sam", 0, at(0)));
    accumulator::fold_into_baseline(&mut ended.lock(), at(5));

    let report = d.sweep(&[live, ended.clone()], at(600));

    assert_eq!(report.evaluated, 1);
    assert_eq!(report.went_away, vec![ALEX]);
    assert!(!ended.lock().is_away());
}

#[test]
fn test_set_away_timeout_applies_to_next_sweep() {
    let d = detector();
    let h = session(at(0));

    d.set_away_timeout(Duration::from_secs(600));
    assert!(d.sweep(&[h.clone()], at(120)).went_away.is_empty());

    d.set_away_timeout(Duration::from_secs(90));
    assert_eq!(d.sweep(&[h.clone()], at(120)).went_away, vec![ALEX]);
    assert_eq!(d.timeout(), Duration::from_secs(90));
}

#[test]
fn test_set_away_timeout_below_minimum_is_raised() {
    let d = detector();
    d.set_away_timeout(Duration::ZERO);
    assert_eq!(d.timeout(), AwayConfig::MIN_TIMEOUT);
}

// =========================================================================
// set_away()
// =========================================================================

#[test]
fn test_set_away_twice_changes_and_notifies_once() {
    let d = detector();
    let mut rx = d.subscribe();
    let h = session(at(0));

    assert!(d.set_away(&h, true, at(10)));
    assert!(!d.set_away(&h, true, at(11)));

    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn test_set_away_false_resets_last_activity() {
    let d = detector();
    let h = session(at(0));
    d.set_away(&h, true, at(10));

    assert!(d.set_away(&h, false, at(500)));

    assert_eq!(h.lock().last_activity(), at(500));
    // A sweep right after must not flip the player straight back.
    assert!(d.sweep(&[h.clone()], at(501)).went_away.is_empty());
}

// =========================================================================
// Races
// =========================================================================

#[test]
fn test_signal_and_sweep_racing_to_return_notify_once() {
    let d = detector();
    let mut rx = d.subscribe();
    let h = session(at(0));
    d.sweep(&[h.clone()], at(60));
    drain(&mut rx);

    // Signal wins the lock first; the sweep then finds nothing to do.
    d.on_signal(&h, at(61));
    let report = d.sweep(&[h.clone()], at(61));

    assert!(report.returned.is_empty());
    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn test_dropped_subscriber_does_not_block_transitions() {
    let d = detector();
    drop(d.subscribe());
    let h = session(at(0));

    assert_eq!(d.sweep(&[h.clone()], at(60)).went_away, vec![ALEX]);
    assert_eq!(d.notifier().subscriber_count(), 0);
}

// =========================================================================
// Threads
// =========================================================================

/// Checks the per-session invariants under the session lock.
fn assert_consistent(h: &SessionHandle, now: Timestamp) {
    let s = h.lock();
    assert_eq!(
        s.active_period_start().is_some(),
        !s.is_away(),
        "open interval iff active"
    );
    assert!(
        s.accumulated_active_millis() <= now.millis_since(s.session_start()),
        "accumulated {}ms exceeds {}ms of wall time",
        s.accumulated_active_millis(),
        now.millis_since(s.session_start())
    );
}

#[test]
fn test_concurrent_signals_sweeps_and_overrides_keep_session_consistent() {
    const THREADS: u64 = 4;
    const ROUNDS: u64 = 300;

    let d = detector();
    let mut rx = d.subscribe();
    let h = session(at(0));
    let barrier = Barrier::new(THREADS as usize);

    // Every thread uses the same timestamp within a round; the barrier
    // keeps time moving forward between rounds.
    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let (d, h, barrier) = (&d, &h, &barrier);
            scope.spawn(move || {
                for round in 1..=ROUNDS {
                    let now = at(round * 10);
                    match (t + round) % 4 {
                        0 => {
                            d.on_signal(h, now);
                        }
                        1 => {
                            d.sweep(std::slice::from_ref(h), now);
                        }
                        2 => {
                            d.set_away(h, true, now);
                        }
                        _ => {
                            d.set_away(h, false, now);
                        }
                    }
                    assert_consistent(h, now);
                    barrier.wait();
                }
            });
        }
    });

    let events = drain(&mut rx);
    assert!(!events.is_empty());
    assert!(events[0].away, "first change from the initial state is away");
    for pair in events.windows(2) {
        assert_ne!(pair[0].away, pair[1].away, "notifications must alternate: {pair:?}");
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
    let last = events.last().map(|e| e.away);
    assert_eq!(last, Some(h.lock().is_away()), "last notification matches state");
    assert_consistent(&h, at(ROUNDS * 10));
}

#[test]
fn test_concurrent_away_overrides_count_interval_once() {
    const THREADS: usize = 8;

    let d = detector();
    let mut rx = d.subscribe();
    let h = session(at(0));
    let barrier = Barrier::new(THREADS);

    let changed: usize = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let (d, h, barrier) = (&d, &h, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    d.set_away(h, true, at(30))
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| usize::from(w.join().unwrap()))
            .sum()
    });

    assert_eq!(changed, 1);
    assert_eq!(h.lock().accumulated_active_millis(), 30_000);
    assert_eq!(accumulator::total_seconds(&h.lock(), at(90)), 30);
    assert_eq!(drain(&mut rx).len(), 1);
}

// =========================================================================
// Runtime settings
// =========================================================================

#[test]
fn test_set_cooldown_is_capped_at_timeout() {
    let d = detector();

    d.set_cooldown(Duration::from_secs(600));

    assert_eq!(d.cooldown(), Duration::from_secs(60));
}

#[test]
fn test_set_away_timeout_lowers_longer_cooldown() {
    let d = detector();
    d.set_cooldown(Duration::from_secs(30));

    d.set_away_timeout(Duration::from_secs(10));

    assert_eq!(d.timeout(), Duration::from_secs(10));
    assert_eq!(d.cooldown(), Duration::from_secs(10));
}

#[test]
fn test_set_away_timeout_keeps_shorter_cooldown() {
    let d = detector();

    d.set_away_timeout(Duration::from_secs(120));

    assert_eq!(d.cooldown(), Duration::from_secs(5));
}
