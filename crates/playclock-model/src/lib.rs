//! Shared vocabulary for Playclock.
//!
//! This crate defines the values that move between the engine's layers
//! and out to its collaborators:
//!
//! - **Identity** ([`PlayerId`]) and **time** ([`Timestamp`], [`Clock`])
//! - **Transfer records** ([`BaselineRecord`], [`PlaytimeRecord`]) — what
//!   the durable store reads and writes
//! - **Notifications** ([`AwayStatusChanged`]) — what observers receive
//!   when a player goes away or comes back
//!
//! It has no behavior beyond small helpers; every other crate depends on it.
//!
//! ```text
//! Engine (playclock) → Session / Away / Sync → Store → Model (this crate)
//! ```

mod clock;
mod types;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use types::{
    AwayStatusChanged, BaselineRecord, PlayerId, PlaytimeRecord, Timestamp,
};
