//! Fixed-period ticker for Playclock's background jobs.
//!
//! Two jobs run on a timer: the away sweep (default every 30s) and the
//! sync cycle (default every 60s). Each owns one [`Ticker`] and waits on it
//! inside a `tokio::select!` loop next to its shutdown signal.
//!
//! # Disabled mode
//!
//! A period of zero disables the ticker: [`Ticker::wait_for_tick`] pends
//! forever. That's how a host turns off periodic syncing and relies only
//! on end-of-session and forced flushes.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         tick = ticker.wait_for_tick() => {
//!             scheduler.flush_dirty().await;
//!             ticker.record_tick_end();
//!         }
//!     }
//! }
//! ```
//!
//! Timing uses tokio's clock throughout, so tests can drive it with
//! `tokio::time::pause()`.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a tick fires late (the previous job overran, or the
/// runtime was starved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Schedule the next tick one period after *now*. Missed ticks are
    /// skipped, never run back to back.
    #[default]
    Skip,
    /// Keep the original cadence. The next tick fires one period after the
    /// deadline that was missed, which may be immediately.
    Drop,
}

/// Full configuration for a [`Ticker`].
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// Label used in log lines (`"sweep"`, `"sync"`).
    pub name: &'static str,
    /// Time between ticks. Zero disables the ticker.
    pub period: Duration,
    /// Overrun handling policy.
    pub policy: TickPolicy,
    /// Fraction of the period (0.0–1.0) a job may take before a warning is
    /// logged. Default: 0.5.
    pub budget_warn_threshold: f64,
    /// Random delay (0–max) added to the first tick so jobs started
    /// together don't fire in lockstep.
    pub initial_jitter: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            name: "ticker",
            period: Duration::ZERO,
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.5,
            initial_jitter: Duration::ZERO,
        }
    }
}

impl TickerConfig {
    /// Shortest accepted non-zero period.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    /// A config for one named job firing every `period`.
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            ..Default::default()
        }
    }

    /// Clamp any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`Ticker::new`]. Rules:
    /// - a non-zero `period` is raised to at least [`Self::MIN_PERIOD`]
    /// - `budget_warn_threshold` clamped to `0.0..=1.0`
    /// - `initial_jitter` capped at one period
    pub fn validated(mut self) -> Self {
        if !self.period.is_zero() && self.period < Self::MIN_PERIOD {
            warn!(
                ticker = self.name,
                period_ms = self.period.as_millis() as u64,
                "period below minimum, raising"
            );
            self.period = Self::MIN_PERIOD;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        if !self.period.is_zero() && self.initial_jitter > self.period {
            self.initial_jitter = self.period;
        }
        self
    }

    /// The tick period, or `None` when disabled.
    pub fn period(&self) -> Option<Duration> {
        (!self.period.is_zero()).then_some(self.period)
    }
}

// ---------------------------------------------------------------------------
// Tick info (returned to caller each tick)
// ---------------------------------------------------------------------------

/// Information about one tick, returned by [`Ticker::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// The configured period.
    pub period: Duration,
    /// `true` if this tick fired more than 10% of a period late.
    pub overrun: bool,
    /// Ticks skipped because of the overrun (0 in normal operation).
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics for one ticker. Job timings come from
/// [`Ticker::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of job run time (α = 0.1).
    pub avg_run_time: Duration,
    pub max_run_time: Duration,
    /// Last job's run time as a fraction of the period.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Fixed-period ticker. One per background job; owned by that job's task.
pub struct Ticker {
    config: TickerConfig,
    period: Option<Duration>,
    tick_count: u64,
    next_tick: Option<Instant>,
    /// When the current tick's job started. Set by `wait_for_tick`,
    /// consumed by `record_tick_end`.
    run_start: Option<Instant>,
    paused: bool,
    metrics: TickMetrics,
}

impl Ticker {
    /// Create a ticker from config. The first tick is one period (plus
    /// jitter) from now.
    pub fn new(config: TickerConfig) -> Self {
        let config = config.validated();
        let period = config.period();

        let next_tick = period.map(|p| Instant::now() + p + first_tick_jitter(&config));

        match period {
            Some(p) => debug!(
                ticker = config.name,
                period_ms = p.as_millis() as u64,
                policy = ?config.policy,
                "ticker created"
            ),
            None => debug!(ticker = config.name, "ticker created disabled (zero period)"),
        }

        Self {
            config,
            period,
            tick_count: 0,
            next_tick,
            run_start: None,
            paused: false,
            metrics: TickMetrics::default(),
        }
    }

    /// Create a ticker for one named job with default settings.
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self::new(TickerConfig::every(name, period))
    }

    /// Wait until the next tick is due.
    ///
    /// When disabled or paused this future pends forever; `tokio::select!`
    /// still processes its other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, period) = match (self.next_tick, self.period) {
            (Some(next), Some(period)) if !self.paused => (next, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.run_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let mut ticks_skipped = 0u64;

        self.next_tick = Some(match self.config.policy {
            TickPolicy::Skip => {
                if overrun {
                    ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
                    if ticks_skipped > 0 {
                        warn!(
                            ticker = self.config.name,
                            tick = self.tick_count,
                            skipped = ticks_skipped,
                            late_ms = late_by.as_millis() as u64,
                            "tick overrun, skipping ahead"
                        );
                    }
                }
                now + period
            }
            TickPolicy::Drop => {
                if overrun {
                    warn!(
                        ticker = self.config.name,
                        tick = self.tick_count,
                        late_ms = late_by.as_millis() as u64,
                        "tick overrun, keeping original cadence"
                    );
                }
                next + period
            }
        });

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(ticker = self.config.name, tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            period,
            overrun,
            ticks_skipped,
        }
    }

    /// Record that the job for the current tick has finished.
    ///
    /// Feeds the run-time metrics and the budget warning. Without it no
    /// budget warnings fire.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.run_start.take() else {
            return;
        };
        let elapsed = start.elapsed();

        if let Some(period) = self.period {
            let utilization = elapsed.as_secs_f64() / period.as_secs_f64();
            self.metrics.budget_utilization = utilization;

            if utilization >= self.config.budget_warn_threshold {
                warn!(
                    ticker = self.config.name,
                    tick = self.tick_count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    period_ms = period.as_millis() as u64,
                    utilization_pct = format!("{:.1}", utilization * 100.0),
                    "job is using most of its period"
                );
            }
        }

        if elapsed > self.metrics.max_run_time {
            self.metrics.max_run_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_run_time.as_secs_f64();
        self.metrics.avg_run_time =
            Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);
    }

    /// Pause the ticker. `wait_for_tick` pends until [`resume`](Self::resume).
    ///
    /// Safe to call multiple times.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(ticker = self.config.name, tick = self.tick_count, "ticker paused");
        }
    }

    /// Resume after a pause. The next tick is one period from now, so time
    /// spent paused never produces a burst of ticks.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if let Some(period) = self.period {
                self.next_tick = Some(Instant::now() + period);
            }
            debug!(ticker = self.config.name, tick = self.tick_count, "ticker resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the ticker was created with a zero period.
    pub fn is_disabled(&self) -> bool {
        self.period.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    /// The tick period, or `None` when disabled.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}

fn first_tick_jitter(config: &TickerConfig) -> Duration {
    let max_ms = config.initial_jitter.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}
