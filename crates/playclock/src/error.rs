//! Unified error type for the Playclock engine.

use playclock_session::SessionError;
use playclock_store::StoreError;

/// Top-level error for the engagement API.
///
/// Only a handful of API calls can fail at all; everything else is
/// fail-open. The `#[from]` variants let `?` lift lower-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum EngagementError {
    /// An administrative adjustment was given a negative amount.
    #[error("engagement adjustment must be non-negative, got {0} seconds")]
    NegativeSeconds(i64),

    /// The durable store failed or timed out.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A session-layer operation failed for a reason other than the store.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl EngagementError {
    /// Lifts a session error, surfacing store failures as
    /// [`EngagementError::Store`] rather than nesting them.
    pub(crate) fn from_session(err: SessionError) -> Self {
        match err {
            SessionError::Store(e) => Self::Store(e),
            other => Self::Session(other),
        }
    }
}
