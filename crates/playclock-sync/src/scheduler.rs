//! The sync scheduler: batched, retried persistence of dirty sessions.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use playclock_model::PlayerId;
use playclock_session::SessionStore;
use playclock_store::{PersistenceGateway, RecordBatch, bounded};
use playclock_tick::{Ticker, TickerConfig};
use tokio::sync::watch;

use crate::SyncConfig;

/// Result of one [`SyncScheduler::flush_dirty`] cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReport {
    /// Nothing was dirty and nothing was parked.
    Idle,
    /// The batch was written.
    Flushed { records: usize },
    /// The batch failed; its sessions are dirty again.
    Failed {
        records: usize,
        consecutive_failures: u32,
    },
}

/// Running totals since the scheduler was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub cycles: u64,
    pub records_written: u64,
    pub failed_cycles: u64,
    pub consecutive_failures: u32,
}

/// Writes dirty sessions to the durable store on a fixed interval.
pub struct SyncScheduler<G> {
    store: Arc<SessionStore<G>>,
    config: SyncConfig,
    consecutive_failures: AtomicU32,
    cycles: AtomicU64,
    records_written: AtomicU64,
    failed_cycles: AtomicU64,
}

impl<G: PersistenceGateway> SyncScheduler<G> {
    pub fn new(store: Arc<SessionStore<G>>, config: SyncConfig) -> Self {
        Self {
            store,
            config: config.validated(),
            consecutive_failures: AtomicU32::new(0),
            cycles: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            failed_cycles: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            failed_cycles: self.failed_cycles.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }

    /// Runs one sync cycle.
    ///
    /// Holds the store's write gate from the moment records are built until
    /// the batch settles. Each session's lock is held only while its record
    /// is built. Dirty flags are cleared optimistically before the write and
    /// restored if it fails.
    pub async fn flush_dirty(&self) -> FlushReport {
        let _gate = self.store.write_gate().await;
        let now = self.store.now();
        self.cycles.fetch_add(1, Ordering::Relaxed);

        let mut batch = RecordBatch::new();
        let mut live = HashSet::new();
        let mut in_batch = Vec::new();
        for handle in self.store.handles() {
            let mut session = handle.lock();
            if session.is_closed() {
                continue;
            }
            live.insert(handle.player_id());
            if !session.is_dirty() {
                continue;
            }
            session.clear_dirty();
            batch.insert(handle.player_id(), session.record_at(now));
            drop(session);
            in_batch.push(handle);
        }

        // Live sessions win over parked records for the same player.
        let parked: Vec<_> = self
            .store
            .parked_records()
            .into_iter()
            .filter(|record| !live.contains(&record.player_id))
            .collect();
        for record in &parked {
            batch.insert(record.player_id, record.clone());
        }

        if batch.is_empty() {
            tracing::trace!("sync cycle idle");
            return FlushReport::Idle;
        }

        let records = batch.len();
        let write = self.store.gateway().upsert_batch(batch);
        match bounded(self.config.batch_timeout, write).await {
            Ok(()) => {
                self.store.confirm_parked(&parked);
                self.consecutive_failures.store(0, Ordering::Relaxed);
                self.records_written.fetch_add(records as u64, Ordering::Relaxed);
                tracing::debug!(records, parked = parked.len(), "sync batch written");
                FlushReport::Flushed { records }
            }
            Err(e) => {
                for handle in &in_batch {
                    handle.lock().mark_dirty();
                }
                self.failed_cycles.fetch_add(1, Ordering::Relaxed);
                let consecutive_failures =
                    self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if consecutive_failures >= self.config.escalate_after {
                    tracing::error!(
                        records,
                        consecutive_failures,
                        error = %e,
                        "sync batch keeps failing, engagement is only held in memory"
                    );
                } else {
                    tracing::warn!(
                        records,
                        consecutive_failures,
                        error = %e,
                        "sync batch failed, will retry next cycle"
                    );
                }
                FlushReport::Failed {
                    records,
                    consecutive_failures,
                }
            }
        }
    }

    /// Runs [`flush_dirty`](Self::flush_dirty) every interval until
    /// `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// A cycle already in progress when shutdown arrives is finished first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = Ticker::new(TickerConfig::every("sync", self.config.interval));
        tracing::debug!(interval_ms = self.config.interval.as_millis() as u64, "sync task started");

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.wait_for_tick() => {
                    self.flush_dirty().await;
                    ticker.record_tick_end();
                }
            }
        }

        tracing::debug!(cycles = ticker.tick_count(), "sync task stopped");
    }

    /// Players whose records would go into the next batch.
    pub fn pending_players(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self
            .store
            .handles()
            .iter()
            .filter(|h| {
                let session = h.lock();
                session.is_dirty() && !session.is_closed()
            })
            .map(|h| h.player_id())
            .collect();
        ids.extend(
            self.store
                .parked_records()
                .iter()
                .map(|r| r.player_id)
                .filter(|id| !self.store.contains(*id)),
        );
        ids.sort();
        ids.dedup();
        ids
    }
}

impl<G> std::fmt::Debug for SyncScheduler<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("config", &self.config)
            .field(
                "consecutive_failures",
                &self.consecutive_failures.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}
