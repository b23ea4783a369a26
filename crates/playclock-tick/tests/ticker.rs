//! Integration tests for the fixed-period ticker.
//!
//! Uses `start_paused = true` so `sleep_until` resolves as soon as the
//! runtime is idle and job run times can be simulated with
//! `tokio::time::advance`.

use std::time::Duration;

use playclock_tick::{TickPolicy, Ticker, TickerConfig};

// =========================================================================
// Helpers
// =========================================================================

fn every_second() -> TickerConfig {
    TickerConfig::every("test", Duration::from_secs(1))
}

// =========================================================================
// TickerConfig
// =========================================================================

#[test]
fn test_default_config_is_disabled() {
    let cfg = TickerConfig::default();
    assert_eq!(cfg.period(), None);
    assert_eq!(cfg.policy, TickPolicy::Skip);
}

#[test]
fn test_validated_raises_tiny_period() {
    let cfg = TickerConfig::every("test", Duration::from_micros(5)).validated();
    assert_eq!(cfg.period, TickerConfig::MIN_PERIOD);
}

#[test]
fn test_validated_caps_jitter_at_one_period() {
    let cfg = TickerConfig {
        initial_jitter: Duration::from_secs(60),
        ..every_second()
    }
    .validated();
    assert_eq!(cfg.initial_jitter, Duration::from_secs(1));
}

#[test]
fn test_validated_clamps_threshold() {
    let cfg = TickerConfig {
        budget_warn_threshold: 3.0,
        ..every_second()
    }
    .validated();
    assert_eq!(cfg.budget_warn_threshold, 1.0);
}

// =========================================================================
// Ticker creation and accessors
// =========================================================================

#[test]
fn test_ticker_initial_state() {
    let t = Ticker::new(every_second());
    assert_eq!(t.tick_count(), 0);
    assert_eq!(t.name(), "test");
    assert_eq!(t.period(), Some(Duration::from_secs(1)));
    assert!(!t.is_disabled());
    assert!(!t.is_paused());
}

#[test]
fn test_zero_period_is_disabled() {
    let t = Ticker::every("off", Duration::ZERO);
    assert!(t.is_disabled());
    assert_eq!(t.period(), None);
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_after_one_period() {
    let mut t = Ticker::new(every_second());
    let start = tokio::time::Instant::now();

    let info = t.wait_for_tick().await;

    assert_eq!(info.tick, 1);
    assert_eq!(info.period, Duration::from_secs(1));
    assert!(!info.overrun);
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_ticks_increment_monotonically() {
    let mut t = Ticker::new(every_second());

    for expected in 1..=5 {
        assert_eq!(t.wait_for_tick().await.tick, expected);
    }
    assert_eq!(t.tick_count(), 5);
    assert_eq!(t.metrics().total_ticks, 5);
}

#[tokio::test(start_paused = true)]
async fn test_jitter_delays_first_tick_by_at_most_max() {
    let mut t = Ticker::new(TickerConfig {
        initial_jitter: Duration::from_millis(500),
        ..every_second()
    });
    let start = tokio::time::Instant::now();

    t.wait_for_tick().await;

    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(1));
    assert!(waited < Duration::from_millis(1_500));
}

#[tokio::test(start_paused = true)]
async fn test_disabled_ticker_never_fires() {
    let mut t = Ticker::every("off", Duration::ZERO);

    let result = tokio::time::timeout(Duration::from_secs(3_600), t.wait_for_tick()).await;
    assert!(result.is_err(), "disabled ticker should pend forever");
}

// =========================================================================
// Overrun policies
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_policy_skips_missed_ticks() {
    let mut t = Ticker::new(every_second());
    t.wait_for_tick().await;

    // The job overran by three and a half periods.
    tokio::time::advance(Duration::from_millis(3_500)).await;
    let info = t.wait_for_tick().await;

    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 2);
    assert_eq!(t.metrics().total_overruns, 1);
    assert_eq!(t.metrics().total_skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_drop_policy_keeps_cadence() {
    let mut t = Ticker::new(TickerConfig {
        policy: TickPolicy::Drop,
        ..every_second()
    });
    let start = tokio::time::Instant::now();
    t.wait_for_tick().await;

    tokio::time::advance(Duration::from_millis(1_500)).await;
    let late = t.wait_for_tick().await;
    assert!(late.overrun);
    assert_eq!(late.ticks_skipped, 0);

    // Third tick is due at t=3s on the original grid, not 2.5s + 1s.
    t.wait_for_tick().await;
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

// =========================================================================
// Pause / Resume
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_pause_prevents_ticks() {
    let mut t = Ticker::new(every_second());
    t.wait_for_tick().await;

    t.pause();

    let result = tokio::time::timeout(Duration::from_secs(10), t.wait_for_tick()).await;
    assert!(result.is_err(), "paused ticker should pend");
}

#[tokio::test(start_paused = true)]
async fn test_resume_schedules_one_period_from_now() {
    let mut t = Ticker::new(every_second());
    t.wait_for_tick().await;
    t.pause();
    tokio::time::advance(Duration::from_secs(30)).await;

    t.resume();
    let resumed_at = tokio::time::Instant::now();
    let info = t.wait_for_tick().await;

    assert_eq!(info.tick, 2);
    assert!(!info.overrun, "time spent paused is not an overrun");
    assert_eq!(resumed_at.elapsed(), Duration::from_secs(1));
}

#[test]
fn test_pause_resume_idempotent() {
    let mut t = Ticker::new(every_second());

    t.pause();
    t.pause();
    assert!(t.is_paused());

    t.resume();
    t.resume();
    assert!(!t.is_paused());
}

// =========================================================================
// Metrics and budget
// =========================================================================

#[test]
fn test_record_tick_end_without_wait_is_noop() {
    let mut t = Ticker::new(every_second());
    t.record_tick_end();
    assert_eq!(t.metrics().max_run_time, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_tracks_run_time_and_utilization() {
    let mut t = Ticker::new(every_second());

    t.wait_for_tick().await;
    tokio::time::advance(Duration::from_millis(250)).await;
    t.record_tick_end();

    let m = t.metrics();
    assert_eq!(m.max_run_time, Duration::from_millis(250));
    assert!((m.budget_utilization - 0.25).abs() < 1e-9);
    assert!(m.avg_run_time > Duration::ZERO);
}

// =========================================================================
// Integration: select! loop pattern
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_stops_on_shutdown() {
    let mut t = Ticker::new(every_second());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let _ = shutdown_tx.send(true);
    });

    let mut fired = 0u64;
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            info = t.wait_for_tick() => {
                fired += 1;
                assert_eq!(info.tick, fired);
                t.record_tick_end();
            }
        }
    }

    assert_eq!(fired, 3);
}
