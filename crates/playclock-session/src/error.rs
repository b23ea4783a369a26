//! Error types for the session layer.

use playclock_model::PlayerId;
use playclock_store::StoreError;

/// Errors surfaced by [`SessionStore`](crate::SessionStore) operations
/// that report failure to their caller.
///
/// Most session operations are fail-open and never return an error; only
/// explicit flushes do.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No live session exists for this player.
    #[error("no session tracked for player {0}")]
    NotTracked(PlayerId),

    /// The durable store rejected or timed out the write.
    #[error(transparent)]
    Store(#[from] StoreError),
}
