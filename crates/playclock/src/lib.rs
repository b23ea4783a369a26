//! # Playclock
//!
//! Away-aware engagement time accounting for long-lived player sessions.
//!
//! Playclock tracks how long each player is actually *engaged*: time spent
//! idle past the away timeout doesn't count. Totals survive restarts
//! through a pluggable durable store, written in periodic batches and once
//! more when each session ends.
//!
//! The host drives it through three hooks and queries it through the
//! engagement API, all methods on [`Engine`]:
//!
//! ```text
//! host ──on_session_begin / on_qualifying_activity / on_session_end──→ Engine
//!                                                                       │
//!        ┌──────────────────────────┬──────────────────────────────────┤
//!        ▼                          ▼                                  ▼
//!   SessionStore               AwayDetector                      SyncScheduler
//!   (sessions, load/flush)     (signals, sweeps, notifications)  (batched writes)
//!        │                                                             │
//!        └─────────────────────→ PersistenceGateway ←──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use playclock::prelude::*;
//!
//! # async fn demo() {
//! let engine = EngineBuilder::new().build(Arc::new(MemoryGateway::new())).await;
//! let mut notices = engine.subscribe();
//!
//! engine.on_session_begin(PlayerId(7), "steve").await;
//! engine.on_qualifying_activity(PlayerId(7));
//! println!("{}s", engine.total_engagement_seconds(PlayerId(7)));
//!
//! engine.on_session_end(PlayerId(7)).await;
//! engine.shutdown().await;
//! # }
//! ```

mod api;
mod config;
mod engine;
mod error;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::EngagementError;

/// Convenience re-exports for hosts.
pub mod prelude {
    pub use crate::{Engine, EngineBuilder, EngineConfig, EngagementError};
    pub use playclock_away::{AwayConfig, SignalOutcome, SweepReport};
    pub use playclock_model::{
        AwayStatusChanged, Clock, ManualClock, MonotonicClock, PlayerId, PlaytimeRecord,
        SystemClock, Timestamp,
    };
    pub use playclock_session::{
        BeginOutcome, EndOutcome, SessionConfig, SessionView, ShutdownReport,
    };
    #[cfg(feature = "json-file")]
    pub use playclock_store::JsonFileGateway;
    pub use playclock_store::{MemoryGateway, PersistenceGateway, StoreError};
    pub use playclock_sync::{FlushReport, SyncConfig};
}
