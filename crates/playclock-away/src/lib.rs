//! Away detection for Playclock.
//!
//! Decides, per player, whether they are at the keyboard. Two inputs drive
//! it:
//!
//! - **Signals**: qualifying activity (movement, chat, commands) reported
//!   by the host through [`AwayDetector::on_signal`]. Cheap and frequent,
//!   so they are debounced per player.
//! - **Sweeps**: a periodic pass over every session that flips anyone idle
//!   for longer than the away timeout.
//!
//! Every transition goes through the session's own lock and the
//! accumulator, and produces at most one [`AwayStatusChanged`] for the
//! subscribers registered with [`AwayDetector::subscribe`].
//!
//! # Key types
//!
//! - [`AwayDetector`] — the state machine driver
//! - [`AwayConfig`] — timeout, cooldown, sweep interval
//! - [`AwayState`] — `Active` / `Away`
//! - [`AwayNotifier`] — fan-out of status changes
//!
//! [`AwayStatusChanged`]: playclock_model::AwayStatusChanged

mod config;
mod detector;
mod notify;

pub use config::{AwayConfig, AwayState};
pub use detector::{AwayDetector, SignalOutcome, SweepReport};
pub use notify::{AwayNotifier, AwaySender};
