//! `Engine` builder, background tasks and shutdown.
//!
//! The engine ties the layers together: one [`SessionStore`], one
//! [`AwayDetector`] and one [`SyncScheduler`], shared through an `Arc` with
//! two background tasks:
//!
//! ```text
//!            ┌── sweep task ── Ticker(away.sweep_interval) ──→ detector.sweep()
//! Engine ────┤
//!            └── sync task ─── Ticker(sync.interval) ────────→ sync.flush_dirty()
//!
//! shutdown(): watch(true) ──→ both tasks exit ──→ store.end_all()
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use playclock_away::{AwayDetector, SweepReport};
use playclock_model::{Clock, MonotonicClock};
use playclock_session::{SessionStore, ShutdownReport};
use playclock_store::PersistenceGateway;
use playclock_sync::{FlushReport, SyncScheduler};
use playclock_tick::{Ticker, TickerConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::EngineConfig;

/// State shared between the engine handle and its background tasks.
pub(crate) struct EngineState<G> {
    pub(crate) store: Arc<SessionStore<G>>,
    pub(crate) detector: AwayDetector,
    pub(crate) sync: Arc<SyncScheduler<G>>,
}

impl<G: PersistenceGateway> EngineState<G> {
    pub(crate) fn sweep(&self) -> SweepReport {
        let now = self.store.now();
        self.detector.sweep(&self.store.handles(), now)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting an [`Engine`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use playclock::prelude::*;
///
/// # async fn demo() {
/// let engine = EngineBuilder::new()
///     .config(EngineConfig::default())
///     .build(Arc::new(MemoryGateway::new()))
///     .await;
///
/// engine.on_session_begin(PlayerId(1), "alex").await;
/// engine.on_qualifying_activity(PlayerId(1));
/// let report = engine.shutdown().await;
/// # }
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    background_tasks: bool,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            clock: None,
            background_tasks: true,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock used for all accounting. Defaults to a
    /// [`MonotonicClock`] anchored at the current wall time.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Whether to spawn the sweep and sync tasks (default `true`). Hosts
    /// that drive [`Engine::sweep_now`] and [`Engine::sync_now`] from their
    /// own scheduler turn this off.
    pub fn background_tasks(mut self, enabled: bool) -> Self {
        self.background_tasks = enabled;
        self
    }

    /// Builds the engine on top of `gateway` and starts its background
    /// tasks on the current Tokio runtime.
    pub async fn build<G: PersistenceGateway>(self, gateway: Arc<G>) -> Engine<G> {
        let config = self.config.validated();
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(MonotonicClock::new()),
        };

        let store = Arc::new(SessionStore::new(gateway, clock, config.store.clone()));
        let sync = Arc::new(SyncScheduler::new(Arc::clone(&store), config.sync.clone()));
        let state = Arc::new(EngineState {
            store,
            detector: AwayDetector::new(&config.away),
            sync,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();
        if self.background_tasks {
            tasks.push(tokio::spawn(run_sweeps(
                Arc::clone(&state),
                config.away.sweep_interval,
                shutdown_rx.clone(),
            )));
            let sync = Arc::clone(&state.sync);
            tasks.push(tokio::spawn(async move { sync.run(shutdown_rx).await }));
        }

        tracing::info!(
            debug = config.debug,
            away_timeout_s = config.away.timeout.as_secs(),
            sweep_interval_s = config.away.sweep_interval.as_secs(),
            sync_interval_s = config.sync.interval.as_secs(),
            background_tasks = self.background_tasks,
            "engagement engine started"
        );

        Engine {
            state,
            config,
            available: AtomicBool::new(true),
            shutdown_tx,
            tasks: Mutex::new(tasks),
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A running engagement engine.
///
/// The engagement API and the lifecycle hooks are methods on this type
/// (see the `api` module). Share it behind an `Arc` if several host tasks
/// need it; every method takes `&self`.
pub struct Engine<G> {
    pub(crate) state: Arc<EngineState<G>>,
    config: EngineConfig,
    available: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<G: PersistenceGateway> Engine<G> {
    /// The validated configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// `true` until [`shutdown`](Self::shutdown) starts.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn gateway(&self) -> &Arc<G> {
        self.state.store.gateway()
    }

    /// Runs one away sweep now, outside the periodic schedule.
    pub fn sweep_now(&self) -> SweepReport {
        self.state.sweep()
    }

    /// Runs one sync cycle now, outside the periodic schedule.
    pub async fn sync_now(&self) -> FlushReport {
        self.state.sync.flush_dirty().await
    }

    pub fn sync_stats(&self) -> playclock_sync::SyncStats {
        self.state.sync.stats()
    }

    /// Stops the engine: cancels the periodic tasks, then ends every session
    /// and writes every outstanding record within the shutdown budget.
    ///
    /// Hooks called after this starts are ignored. Calling it twice returns
    /// an empty report the second time.
    pub async fn shutdown(&self) -> ShutdownReport {
        if !self.available.swap(false, Ordering::AcqRel) {
            return ShutdownReport::default();
        }
        tracing::info!(sessions = self.state.store.len(), "engagement engine shutting down");

        let _ = self.shutdown_tx.send(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "background task ended abnormally");
            }
        }

        self.state.store.end_all().await
    }
}

impl<G> std::fmt::Debug for Engine<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("available", &self.available.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

async fn run_sweeps<G: PersistenceGateway>(
    state: Arc<EngineState<G>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = Ticker::new(TickerConfig::every("sweep", interval));

    while !*shutdown.borrow() {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.wait_for_tick() => {
                state.sweep();
                ticker.record_tick_end();
            }
        }
    }

    tracing::debug!(sweeps = ticker.tick_count(), "sweep task stopped");
}
