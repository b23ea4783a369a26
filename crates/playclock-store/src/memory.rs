//! In-memory gateway with failure injection.
//!
//! Behaves like a well-mannered database: upserts replace whole rows,
//! batches are all-or-nothing. On top of that it can be told to fail or
//! slow down, which is how the engine's retry paths are exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use playclock_model::{BaselineRecord, PlayerId, PlaytimeRecord, Timestamp};

use crate::{PersistenceGateway, RecordBatch, StoreError};

/// A [`PersistenceGateway`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    rows: Mutex<HashMap<PlayerId, PlaytimeRecord>>,
    /// Number of upcoming `upsert_batch` calls that should fail.
    failing_batches: AtomicU32,
    /// While set, every call fails with `Unavailable`.
    offline: AtomicBool,
    /// Artificial latency applied to every call, in milliseconds.
    latency_ms: AtomicU64,
    load_calls: AtomicU64,
    upsert_calls: AtomicU64,
    batch_calls: AtomicU64,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a stored row, as if a previous session had written it.
    pub fn seed(&self, player_id: PlayerId, display_name: &str, total_seconds: u64) {
        self.rows().insert(
            player_id,
            PlaytimeRecord {
                player_id,
                display_name: display_name.to_string(),
                total_seconds,
                last_login: Timestamp::ZERO,
                last_logout: Some(Timestamp::ZERO),
            },
        );
    }

    /// The stored row for `player_id`, if any.
    pub fn record(&self, player_id: PlayerId) -> Option<PlaytimeRecord> {
        self.rows().get(&player_id).cloned()
    }

    /// Shorthand for the stored total.
    pub fn stored_total(&self, player_id: PlayerId) -> Option<u64> {
        self.record(player_id).map(|r| r.total_seconds)
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Makes the next `n` batch upserts fail.
    pub fn fail_next_batches(&self, n: u32) {
        self.failing_batches.store(n, Ordering::SeqCst);
    }

    /// Takes the whole store offline (or back online).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Adds latency to every call. `Duration::ZERO` removes it.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    pub fn load_calls(&self) -> u64 {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> u64 {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<PlayerId, PlaytimeRecord>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_io(&self) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

impl PersistenceGateway for MemoryGateway {
    async fn load_baseline(
        &self,
        player_id: PlayerId,
    ) -> Result<Option<BaselineRecord>, StoreError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_io().await?;
        Ok(self.rows().get(&player_id).map(PlaytimeRecord::to_baseline))
    }

    async fn upsert_one(&self, record: PlaytimeRecord) -> Result<(), StoreError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_io().await?;
        self.rows().insert(record.player_id, record);
        Ok(())
    }

    async fn upsert_batch(&self, records: RecordBatch) -> Result<(), StoreError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_io().await?;

        // Consume one injected failure, if any are queued.
        let injected = self
            .failing_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            tracing::debug!(records = records.len(), "memory store rejecting batch");
            return Err(StoreError::Unavailable("injected batch failure".into()));
        }

        self.rows().extend(records);
        Ok(())
    }
}
