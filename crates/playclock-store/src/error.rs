//! Error types for the store layer.

/// Errors a [`PersistenceGateway`](crate::PersistenceGateway) can report.
///
/// The engine treats every variant the same way (log, retry later); the
/// distinction is for operators reading the logs.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not finish within the engine's deadline.
    #[error("store operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Reading or writing the backing file failed.
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored data could not be decoded.
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}
