//! Engagement sessions for Playclock.
//!
//! This crate owns the per-player accounting state and everything that
//! touches it directly:
//!
//! 1. **Data** — [`PlayerSession`], one per tracked player, and its
//!    read-only [`SessionView`] copy
//! 2. **Accounting** — the [`accumulator`] functions, the only code allowed
//!    to open, close, or fold active intervals
//! 3. **Registry** — [`SessionStore`], which loads sessions on begin,
//!    flushes them on end, and hands out [`SessionHandle`]s to everyone else
//!
//! # Locking
//!
//! Each session sits behind its own mutex inside a [`SessionHandle`]. The
//! registry is a `DashMap` of handles, so looking a player up never blocks
//! on another player's mutation, and iterating copies the handles out
//! before any session is locked.
//!
//! ```text
//! Engine (above)  ← routes hooks and API calls to handles
//!     ↕
//! Session Layer (this crate)  ← accounting state + registry
//!     ↕
//! Store Layer (below)  ← PersistenceGateway
//! ```

pub mod accumulator;
mod config;
mod error;
mod session;
mod store;

pub use config::SessionConfig;
pub use error::SessionError;
pub use session::{PlayerSession, SessionHandle, SessionView};
pub use store::{
    BaselineSource, BeginOutcome, EndOutcome, SessionStore, ShutdownReport,
};
