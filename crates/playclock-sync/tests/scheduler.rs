//! Integration tests for the sync scheduler against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use playclock_model::{ManualClock, PlayerId, Timestamp};
use playclock_session::{SessionConfig, SessionStore};
use playclock_store::MemoryGateway;
use playclock_sync::{FlushReport, SyncConfig, SyncScheduler};

// =========================================================================
// Helpers
// =========================================================================

const ALEX: PlayerId = PlayerId(1);
const SAM: PlayerId = PlayerId(2);

struct Fixture {
    sync: Arc<SyncScheduler<MemoryGateway>>,
    store: Arc<SessionStore<MemoryGateway>>,
    gateway: Arc<MemoryGateway>,
    clock: Arc<ManualClock>,
}

fn fixture_with(config: SyncConfig) -> Fixture {
    let gateway = Arc::new(MemoryGateway::new());
    let clock = Arc::new(ManualClock::new(Timestamp(5_000_000)));
    let store = Arc::new(SessionStore::new(
        Arc::clone(&gateway),
        clock.clone(),
        SessionConfig::default(),
    ));
    let sync = Arc::new(SyncScheduler::new(Arc::clone(&store), config));
    Fixture {
        sync,
        store,
        gateway,
        clock,
    }
}

fn fixture() -> Fixture {
    fixture_with(SyncConfig::default())
}

// =========================================================================
// flush_dirty()
// =========================================================================

#[tokio::test]
async fn test_flush_dirty_nothing_tracked_is_idle() {
    let f = fixture();
    assert_eq!(f.sync.flush_dirty().await, FlushReport::Idle);
    assert_eq!(f.gateway.batch_calls(), 0);
}

#[tokio::test]
async fn test_flush_dirty_writes_point_in_time_totals() {
    let f = fixture();
    f.gateway.seed(ALEX, "alex", 1_000);
    f.store.begin(ALEX, "alex").await;
    f.store.begin(SAM, "sam").await;
    f.clock.advance(Duration::from_secs(45));

    let report = f.sync.flush_dirty().await;

    assert_eq!(report, FlushReport::Flushed { records: 2 });
    assert_eq!(f.gateway.stored_total(ALEX), Some(1_045));
    assert_eq!(f.gateway.stored_total(SAM), Some(45));
    let view = f.store.get(ALEX).unwrap();
    assert!(!view.dirty);
    assert!(view.active_period_start.is_some(), "flush never closes intervals");
    assert_eq!(f.gateway.record(ALEX).unwrap().last_logout, None);
}

#[tokio::test]
async fn test_flush_dirty_clean_sessions_are_skipped() {
    let f = fixture();
    f.store.begin(ALEX, "alex").await;
    f.sync.flush_dirty().await;
    f.clock.advance(Duration::from_secs(60));

    assert_eq!(f.sync.flush_dirty().await, FlushReport::Idle);
    assert_eq!(f.gateway.batch_calls(), 1);
}

#[tokio::test]
async fn test_flush_dirty_failure_is_retried_next_cycle() {
    let f = fixture();
    f.store.begin(ALEX, "alex").await;
    f.clock.advance(Duration::from_secs(10));
    f.gateway.fail_next_batches(1);

    let failed = f.sync.flush_dirty().await;
    assert_eq!(
        failed,
        FlushReport::Failed {
            records: 1,
            consecutive_failures: 1,
        }
    );
    assert!(f.store.get(ALEX).unwrap().dirty, "failed batch re-marks dirty");
    assert_eq!(f.gateway.stored_total(ALEX), None);

    f.clock.advance(Duration::from_secs(10));
    let retried = f.sync.flush_dirty().await;

    assert_eq!(retried, FlushReport::Flushed { records: 1 });
    assert_eq!(f.gateway.stored_total(ALEX), Some(20));
}

#[tokio::test]
async fn test_flush_dirty_counts_consecutive_failures_and_resets() {
    let f = fixture_with(SyncConfig {
        escalate_after: 2,
        ..SyncConfig::default()
    });
    f.store.begin(ALEX, "alex").await;
    f.gateway.fail_next_batches(3);

    for expected in 1..=3 {
        match f.sync.flush_dirty().await {
            FlushReport::Failed {
                consecutive_failures,
                ..
            } => assert_eq!(consecutive_failures, expected),
            other => panic!("expected failure, got {other:?}"),
        }
    }
    assert_eq!(f.sync.stats().consecutive_failures, 3);

    assert!(matches!(f.sync.flush_dirty().await, FlushReport::Flushed { .. }));
    let stats = f.sync.stats();
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.failed_cycles, 3);
    assert_eq!(stats.cycles, 4);
    assert_eq!(stats.records_written, 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_dirty_slow_store_times_out() {
    let f = fixture_with(SyncConfig {
        batch_timeout: Duration::from_secs(1),
        ..SyncConfig::default()
    });
    f.store.begin(ALEX, "alex").await;
    f.gateway.set_latency(Duration::from_secs(30));

    let report = f.sync.flush_dirty().await;

    assert!(matches!(report, FlushReport::Failed { .. }));
    assert!(f.store.get(ALEX).unwrap().dirty);
}

#[tokio::test]
async fn test_flush_dirty_writes_parked_records() {
    let f = fixture();
    f.gateway.seed(ALEX, "alex", 100);
    f.store.begin(ALEX, "alex").await;
    f.clock.advance(Duration::from_secs(30));
    f.gateway.set_offline(true);
    f.store.end(ALEX).await;
    f.gateway.set_offline(false);
    assert_eq!(f.sync.pending_players(), vec![ALEX]);

    let report = f.sync.flush_dirty().await;

    assert_eq!(report, FlushReport::Flushed { records: 1 });
    assert_eq!(f.gateway.stored_total(ALEX), Some(130));
    assert_eq!(f.store.parked_count(), 0);
    assert!(f.sync.pending_players().is_empty());
}

#[tokio::test]
async fn test_flush_dirty_failed_parked_record_stays_parked() {
    let f = fixture();
    f.store.begin(ALEX, "alex").await;
    f.gateway.set_offline(true);
    f.store.end(ALEX).await;
    f.gateway.set_offline(false);
    f.gateway.fail_next_batches(1);

    f.sync.flush_dirty().await;

    assert_eq!(f.store.parked_count(), 1);
}

#[tokio::test]
async fn test_flush_after_end_never_rolls_back_total() {
    let f = fixture();
    f.store.begin(ALEX, "alex").await;
    f.clock.advance(Duration::from_secs(100));
    f.sync.flush_dirty().await;
    f.clock.advance(Duration::from_secs(50));
    f.store.end(ALEX).await;

    assert_eq!(f.sync.flush_dirty().await, FlushReport::Idle);
    assert_eq!(f.gateway.stored_total(ALEX), Some(150));
}

// =========================================================================
// run()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_run_flushes_every_interval_until_shutdown() {
    let f = fixture();
    f.store.begin(ALEX, "alex").await;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let sync = Arc::clone(&f.sync);
    let task = tokio::spawn(async move { sync.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(f.gateway.batch_calls(), 1);

    // Dirty again so the second cycle has something to write.
    f.store.handle(ALEX).unwrap().lock().mark_dirty();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(f.gateway.batch_calls(), 2);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
    assert_eq!(f.sync.stats().cycles, 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_zero_interval_never_flushes() {
    let f = fixture_with(SyncConfig {
        interval: Duration::ZERO,
        ..SyncConfig::default()
    });
    f.store.begin(ALEX, "alex").await;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let sync = Arc::clone(&f.sync);
    let task = tokio::spawn(async move { sync.run(shutdown_rx).await });
    tokio::time::sleep(Duration::from_secs(3_600)).await;

    assert_eq!(f.gateway.batch_calls(), 0);
    drop(shutdown_tx);
    task.await.unwrap();
}
