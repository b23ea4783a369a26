//! Durable-store abstraction for Playclock.
//!
//! The engine never talks to a database directly. It goes through the
//! [`PersistenceGateway`] trait, which has exactly three operations: load a
//! player's baseline, upsert one record, upsert a batch. Whatever sits
//! behind it (a relational database, a key-value store, a file) owns its
//! own schema and connection handling.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryGateway`] — a `HashMap` with failure injection. Used by tests
//!   and simulations.
//! - [`JsonFileGateway`] — one JSON document on disk, rewritten atomically.
//!
//! # Feature Flags
//!
//! - `json-file` (default) — the JSON file backend via `serde_json`

use std::collections::HashMap;
use std::future::Future;

use playclock_model::{BaselineRecord, PlayerId, PlaytimeRecord};

mod error;
#[cfg(feature = "json-file")]
mod json_file;
mod memory;

pub use error::StoreError;
#[cfg(feature = "json-file")]
pub use json_file::JsonFileGateway;
pub use memory::MemoryGateway;

/// A batch of records keyed by player. One record per player per batch.
pub type RecordBatch = HashMap<PlayerId, PlaytimeRecord>;

/// Reads and writes per-player totals in a durable store.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one gateway is shared by the engine's
///   background tasks for the whole process lifetime.
/// - Every returned future is `Send` so it can be awaited inside
///   `tokio::spawn`.
///
/// # Contract
///
/// - Upserts are keyed by player id and idempotent: writing the same record
///   twice leaves the store in the same state as writing it once.
/// - [`upsert_batch`](Self::upsert_batch) is all-or-nothing. On `Err` the
///   engine assumes none of the batch was written and retries all of it.
///
/// # Example
///
/// ```rust
/// use playclock_model::{BaselineRecord, PlayerId, PlaytimeRecord};
/// use playclock_store::{PersistenceGateway, RecordBatch, StoreError};
///
/// /// A store that forgets everything. Only useful for benchmarks.
/// struct NullGateway;
///
/// impl PersistenceGateway for NullGateway {
///     async fn load_baseline(
///         &self,
///         _player_id: PlayerId,
///     ) -> Result<Option<BaselineRecord>, StoreError> {
///         Ok(None)
///     }
///
///     async fn upsert_one(&self, _record: PlaytimeRecord) -> Result<(), StoreError> {
///         Ok(())
///     }
///
///     async fn upsert_batch(&self, _records: RecordBatch) -> Result<(), StoreError> {
///         Ok(())
///     }
/// }
/// ```
pub trait PersistenceGateway: Send + Sync + 'static {
    /// Loads the stored baseline for a player.
    ///
    /// `Ok(None)` means the player has never been stored. That is not an error.
    fn load_baseline(
        &self,
        player_id: PlayerId,
    ) -> impl Future<Output = Result<Option<BaselineRecord>, StoreError>> + Send;

    /// Inserts or replaces one player's record.
    fn upsert_one(
        &self,
        record: PlaytimeRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Inserts or replaces every record in the batch, atomically.
    fn upsert_batch(
        &self,
        records: RecordBatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Awaits a store operation, giving up after `limit`.
///
/// The engine wraps every gateway call in this so a hung backend can never
/// stall a session teardown or a sync cycle indefinitely.
pub async fn bounded<T>(
    limit: std::time::Duration,
    op: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
