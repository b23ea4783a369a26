//! The session registry: every live session, keyed by player.
//!
//! `SessionStore` is the only owner of [`PlayerSession`]s. It creates them
//! on [`begin`](SessionStore::begin) (after loading the stored baseline),
//! destroys them on [`end`](SessionStore::end) (after folding and flushing),
//! and hands [`SessionHandle`]s to the away detector and the sync
//! scheduler in between.
//!
//! ## Lifecycle
//!
//! ```text
//! begin() ──→ [pending load] ──→ [live] ──→ end() ──→ fold ──→ upsert_one
//!                  │                                              │
//!                  ▼ end() during load                   Err      ▼
//!             [cancelled]                              [parked] ──→ next batch
//! ```
//!
//! ## Parked records
//!
//! When an end-of-session write fails the final record is *parked*. The
//! sync scheduler writes parked records with its next batch, and a new
//! `begin` for the same player takes its baseline from the parked record
//! rather than from the (stale) store.
//!
//! ## Write gate
//!
//! Every durable write (batch, end flush, forced flush) happens while
//! holding one store-wide async mutex, and the record being written is
//! built after it is acquired. Without it a batch built before an `end`
//! could land after the end's final write and roll the stored total back.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::stream::{FuturesUnordered, StreamExt};
use playclock_model::{Clock, PlayerId, PlaytimeRecord, Timestamp};
use playclock_store::{PersistenceGateway, bounded};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::{PlayerSession, SessionConfig, SessionError, SessionHandle, SessionView, accumulator};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Where a new session's baseline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineSource {
    /// Loaded from the durable store.
    Stored,
    /// Taken from a parked record of an earlier session whose final write
    /// hasn't landed yet.
    Parked,
    /// The store has never seen this player.
    Fresh,
    /// The load failed or timed out; the session started from zero.
    Fallback,
}

/// Result of [`SessionStore::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// A new session is live.
    Started {
        baseline_seconds: u64,
        source: BaselineSource,
    },
    /// The player was already tracked (or already loading); only the
    /// display name was refreshed.
    AlreadyTracked,
    /// `end` arrived while the baseline was loading. Nothing was inserted.
    Cancelled,
}

/// Result of [`SessionStore::end`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    /// No session and no pending load for this player.
    NotTracked,
    /// A pending `begin` was cancelled before its session existed.
    LoadCancelled,
    /// Final record written.
    Saved(PlaytimeRecord),
    /// Final write failed; the record is parked for the next batch.
    Parked(PlaytimeRecord),
}

/// What [`SessionStore::end_all`] managed to write before its deadline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub saved: Vec<PlayerId>,
    pub failed: Vec<PlayerId>,
    /// Still unwritten when the shutdown budget ran out.
    pub lost: Vec<PlayerId>,
}

impl ShutdownReport {
    /// `true` if every record was written.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.lost.is_empty()
    }
}

/// A `begin` that is waiting on its baseline load.
#[derive(Debug)]
struct PendingBegin {
    ticket: u64,
    display_name: String,
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Registry of live sessions plus the durable-store plumbing around them.
///
/// Shared by reference (`Arc<SessionStore<G>>`) between the engine API and
/// its background tasks. Lookups and iteration never await; only `begin`,
/// `end`, [`flush_one`](Self::flush_one) and [`end_all`](Self::end_all)
/// touch the gateway.
pub struct SessionStore<G> {
    sessions: DashMap<PlayerId, SessionHandle>,
    pending: DashMap<PlayerId, PendingBegin>,
    next_ticket: AtomicU64,
    parked: DashMap<PlayerId, PlaytimeRecord>,
    write_gate: AsyncMutex<()>,
    /// Set by `end_all`; no session is started afterwards.
    draining: AtomicBool,
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl<G: PersistenceGateway> SessionStore<G> {
    pub fn new(gateway: Arc<G>, clock: Arc<dyn Clock>, config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            pending: DashMap::new(),
            next_ticket: AtomicU64::new(0),
            parked: DashMap::new(),
            write_gate: AsyncMutex::new(()),
            draining: AtomicBool::new(false),
            gateway,
            clock,
            config: config.validated(),
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// `true` once [`end_all`](Self::end_all) has started.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Current time on the store's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // -- begin / end --------------------------------------------------------

    /// Starts tracking a player.
    ///
    /// The session's start time is taken when this is called, not when the
    /// load finishes. Load failure never blocks the session: it starts
    /// from a zero baseline and a warning is logged. Once the store is
    /// draining for shutdown every begin is cancelled.
    pub async fn begin(&self, player_id: PlayerId, display_name: &str) -> BeginOutcome {
        let now = self.clock.now();
        if self.is_draining() {
            tracing::debug!(%player_id, "begin while draining, cancelled");
            return BeginOutcome::Cancelled;
        }

        if let Some(handle) = self.handle(player_id) {
            handle.lock().rename(display_name);
            return BeginOutcome::AlreadyTracked;
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        match self.pending.entry(player_id) {
            Entry::Occupied(mut e) => {
                e.get_mut().display_name = display_name.to_string();
                return BeginOutcome::AlreadyTracked;
            }
            Entry::Vacant(e) => {
                e.insert(PendingBegin {
                    ticket,
                    display_name: display_name.to_string(),
                });
            }
        }

        let (baseline_seconds, source, reclaimed) = self.load_baseline(player_id).await;

        // Commit only if our ticket is still the pending one. The session is
        // inserted before the ticket is removed, so a concurrent `end` or
        // `end_all` always sees one or the other. `end_all` raises
        // `draining` before clearing `pending`, so a commit that still sees
        // it lowered is swept up by that `end_all`.
        let outcome = match self.pending.entry(player_id) {
            Entry::Occupied(e) if e.get().ticket == ticket && self.is_draining() => {
                e.remove();
                BeginOutcome::Cancelled
            }
            Entry::Occupied(e) if e.get().ticket == ticket => {
                let name = e.get().display_name.clone();
                let outcome = match self.sessions.entry(player_id) {
                    Entry::Occupied(live) => {
                        live.get().lock().rename(&name);
                        BeginOutcome::AlreadyTracked
                    }
                    Entry::Vacant(slot) => {
                        let session = PlayerSession::new(player_id, name, baseline_seconds, now);
                        slot.insert(SessionHandle::new(session));
                        BeginOutcome::Started {
                            baseline_seconds,
                            source,
                        }
                    }
                };
                e.remove();
                outcome
            }
            _ => BeginOutcome::Cancelled,
        };

        match outcome {
            BeginOutcome::Started { .. } => {
                tracing::info!(%player_id, baseline_seconds, ?source, "session started");
            }
            BeginOutcome::AlreadyTracked | BeginOutcome::Cancelled => {
                tracing::debug!(%player_id, ?outcome, "begin did not start a session");
                // Put back a parked record we took, unless a newer one exists.
                if let Some(record) = reclaimed {
                    if self.is_draining() {
                        tracing::error!(
                            %player_id,
                            total_seconds = record.total_seconds,
                            "parked record missed the shutdown flush, engagement lost"
                        );
                    }
                    self.parked.entry(player_id).or_insert(record);
                }
            }
        }
        outcome
    }

    async fn load_baseline(
        &self,
        player_id: PlayerId,
    ) -> (u64, BaselineSource, Option<PlaytimeRecord>) {
        if let Some((_, record)) = self.parked.remove(&player_id) {
            return (record.total_seconds, BaselineSource::Parked, Some(record));
        }

        let load = self.gateway.load_baseline(player_id);
        match bounded(self.config.load_timeout, load).await {
            Ok(Some(baseline)) => (baseline.total_seconds, BaselineSource::Stored, None),
            Ok(None) => (0, BaselineSource::Fresh, None),
            Err(e) => {
                tracing::warn!(
                    %player_id,
                    error = %e,
                    "baseline load failed, starting from zero"
                );
                (0, BaselineSource::Fallback, None)
            }
        }
    }

    /// Stops tracking a player: folds the session, writes its final record
    /// and removes it.
    ///
    /// The session is unlinked before it is folded, so no sweep or sync can
    /// reach it afterwards. A failed write parks the record.
    pub async fn end(&self, player_id: PlayerId) -> EndOutcome {
        let cancelled_load = self.pending.remove(&player_id).is_some();

        let Some((_, handle)) = self.sessions.remove(&player_id) else {
            if cancelled_load {
                tracing::debug!(%player_id, "session ended while loading, begin cancelled");
                return EndOutcome::LoadCancelled;
            }
            return EndOutcome::NotTracked;
        };

        let now = self.clock.now();
        let record = {
            let mut session = handle.lock();
            accumulator::fold_into_baseline(&mut session, now);
            session.clear_dirty();
            session.record_at(now)
        };
        self.parked.insert(player_id, record.clone());

        let _gate = self.write_gate.lock().await;
        let write = self.gateway.upsert_one(record.clone());
        match bounded(self.config.flush_timeout, write).await {
            Ok(()) => {
                self.parked.remove_if(&player_id, |_, parked| *parked == record);
                tracing::info!(
                    %player_id,
                    total_seconds = record.total_seconds,
                    "session ended"
                );
                EndOutcome::Saved(record)
            }
            Err(e) => {
                tracing::warn!(
                    %player_id,
                    total_seconds = record.total_seconds,
                    error = %e,
                    "final flush failed, record parked for next sync"
                );
                EndOutcome::Parked(record)
            }
        }
    }

    // -- lookups ------------------------------------------------------------

    /// Handle to a live session.
    pub fn handle(&self, player_id: PlayerId) -> Option<SessionHandle> {
        self.sessions.get(&player_id).map(|entry| entry.value().clone())
    }

    /// Handles to every live session, copied out of the registry.
    ///
    /// The registry is not held while the caller locks sessions.
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// A copy of one session as of now.
    pub fn get(&self, player_id: PlayerId) -> Option<SessionView> {
        let handle = self.handle(player_id)?;
        Some(handle.view(self.clock.now()))
    }

    /// Copies of every live session, all taken at the same instant.
    pub fn snapshot(&self) -> Vec<SessionView> {
        let now = self.clock.now();
        self.handles().iter().map(|h| h.view(now)).collect()
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.sessions.contains_key(&player_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of live sessions currently classified as away.
    pub fn away_count(&self) -> usize {
        self.handles().iter().filter(|h| h.lock().is_away()).count()
    }

    // -- parked records -----------------------------------------------------

    /// Total of a parked record, if the player has one.
    pub fn parked_total(&self, player_id: PlayerId) -> Option<u64> {
        self.parked.get(&player_id).map(|r| r.total_seconds)
    }

    /// Copies of every parked record. The records stay parked until
    /// [`confirm_parked`](Self::confirm_parked) is called for them.
    pub fn parked_records(&self) -> Vec<PlaytimeRecord> {
        self.parked.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Drops parked records that were written. A record replaced in the
    /// meantime by a newer one stays parked.
    pub fn confirm_parked<'a>(&self, written: impl IntoIterator<Item = &'a PlaytimeRecord>) {
        for record in written {
            self.parked.remove_if(&record.player_id, |_, parked| parked == record);
        }
    }

    pub fn parked_count(&self) -> usize {
        self.parked.len()
    }

    // -- writes -------------------------------------------------------------

    /// Acquires the store-wide write gate. Hold it while building and
    /// writing a batch.
    pub async fn write_gate(&self) -> AsyncMutexGuard<'_, ()> {
        self.write_gate.lock().await
    }

    /// Writes one live session's point-in-time record immediately.
    ///
    /// # Errors
    /// - [`SessionError::NotTracked`] if the player has no live session
    /// - [`SessionError::Store`] if the write fails; the session is marked
    ///   dirty again so the next sync retries it
    pub async fn flush_one(&self, player_id: PlayerId) -> Result<(), SessionError> {
        let handle = self
            .handle(player_id)
            .ok_or(SessionError::NotTracked(player_id))?;

        let _gate = self.write_gate.lock().await;
        let now = self.clock.now();
        let record = {
            let mut session = handle.lock();
            if session.is_closed() {
                return Err(SessionError::NotTracked(player_id));
            }
            session.clear_dirty();
            session.record_at(now)
        };

        let total_seconds = record.total_seconds;
        let write = self.gateway.upsert_one(record);
        if let Err(e) = bounded(self.config.flush_timeout, write).await {
            handle.lock().mark_dirty();
            tracing::warn!(%player_id, error = %e, "forced flush failed");
            return Err(e.into());
        }

        tracing::debug!(%player_id, total_seconds, "forced flush");
        Ok(())
    }

    /// Ends every session at once and writes every outstanding record
    /// within the configured shutdown budget.
    ///
    /// Sessions are folded first, then all records (including previously
    /// parked ones) are written concurrently. Each failure is logged and
    /// doesn't stop the others. Anything not written by the deadline is
    /// reported as lost.
    pub async fn end_all(&self) -> ShutdownReport {
        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        let now = self.clock.now();

        self.draining.store(true, Ordering::SeqCst);
        self.pending.clear();
        let ids: Vec<PlayerId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for player_id in ids {
            if let Some((_, handle)) = self.sessions.remove(&player_id) {
                let mut session = handle.lock();
                accumulator::fold_into_baseline(&mut session, now);
                session.clear_dirty();
                self.parked.insert(player_id, session.record_at(now));
            }
        }

        let records = self.parked_records();
        let outstanding: Vec<PlayerId> = records.iter().map(|r| r.player_id).collect();
        tracing::info!(records = records.len(), "flushing all sessions for shutdown");

        let gateway = &*self.gateway;
        let flush_timeout = self.config.flush_timeout;
        let mut flushes: FuturesUnordered<_> = records
            .into_iter()
            .map(|record| async move {
                let result = bounded(flush_timeout, gateway.upsert_one(record.clone())).await;
                (record, result)
            })
            .collect();

        let mut report = ShutdownReport::default();
        let drain = async {
            let _gate = self.write_gate.lock().await;
            while let Some((record, result)) = flushes.next().await {
                let player_id = record.player_id;
                match result {
                    Ok(()) => {
                        self.confirm_parked([&record]);
                        report.saved.push(player_id);
                    }
                    Err(e) => {
                        tracing::error!(
                            %player_id,
                            total_seconds = record.total_seconds,
                            error = %e,
                            "shutdown flush failed"
                        );
                        report.failed.push(player_id);
                    }
                }
            }
        };
        let finished = tokio::time::timeout_at(deadline, drain).await.is_ok();

        if !finished {
            let settled: HashSet<PlayerId> =
                report.saved.iter().chain(&report.failed).copied().collect();
            report.lost = outstanding
                .into_iter()
                .filter(|id| !settled.contains(id))
                .collect();
            for player_id in &report.lost {
                tracing::error!(%player_id, "shutdown deadline passed, engagement lost");
            }
        }

        report.saved.sort();
        report.failed.sort();
        report.lost.sort();
        tracing::info!(
            saved = report.saved.len(),
            failed = report.failed.len(),
            lost = report.lost.len(),
            "shutdown flush complete"
        );
        report
    }
}

impl<G> std::fmt::Debug for SessionStore<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .field("pending", &self.pending.len())
            .field("parked", &self.parked.len())
            .field("draining", &self.draining.load(Ordering::SeqCst))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
