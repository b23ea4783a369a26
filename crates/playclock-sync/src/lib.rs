//! Periodic persistence for Playclock.
//!
//! Sessions are marked dirty whenever their accounting changes. Every
//! sync interval the [`SyncScheduler`] gathers the dirty ones, builds a
//! point-in-time record for each (without closing any interval) and writes
//! them in a single batch. A failed batch re-marks its sessions dirty, so
//! the next cycle retries them: writes are at-least-once, and upserts keyed
//! by player make the repeats harmless.
//!
//! ```text
//! ticker ──→ flush_dirty() ──→ [write gate] ──→ collect dirty + parked
//!                                                   │
//!                                      upsert_batch │
//!                                 Ok ←──────────────┴──────────→ Err
//!                           confirm parked               re-mark dirty,
//!                           reset failures               count failure
//! ```

mod config;
mod scheduler;

pub use config::SyncConfig;
pub use scheduler::{FlushReport, SyncScheduler, SyncStats};
