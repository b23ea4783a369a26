//! JSON file backend using `serde_json`.
//!
//! The whole table lives in memory and is written back as one document on
//! every upsert. The write goes to a sibling temp file first and is then
//! renamed over the original, so a crash mid-write leaves the previous
//! version intact. Fine for a single server with a few thousand players;
//! anything bigger wants a real database behind the trait.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use playclock_model::{BaselineRecord, PlayerId, PlaytimeRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{PersistenceGateway, RecordBatch, StoreError};

/// On-disk format version. Bumped on incompatible layout changes.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    version: u32,
    players: Vec<PlaytimeRecord>,
}

/// A [`PersistenceGateway`] that keeps every record in one JSON file.
#[derive(Debug)]
pub struct JsonFileGateway {
    path: PathBuf,
    /// Authoritative copy of the table. The tokio mutex is held across the
    /// file write so two upserts can never interleave their renames.
    table: Mutex<BTreeMap<PlayerId, PlaytimeRecord>>,
}

impl JsonFileGateway {
    /// Opens (or creates on first write) the store at `path`.
    ///
    /// # Errors
    /// [`StoreError::Io`] if the file exists but can't be read,
    /// [`StoreError::Corrupt`] if it isn't a valid document.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let doc: Document = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                if doc.version != FORMAT_VERSION {
                    return Err(StoreError::Corrupt(format!(
                        "unsupported format version {} (expected {FORMAT_VERSION})",
                        doc.version
                    )));
                }
                doc.players.into_iter().map(|r| (r.player_id, r)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };

        tracing::info!(path = %path.display(), players = table.len(), "json store opened");

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored players.
    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.lock().await.is_empty()
    }

    /// Writes `table` to disk via temp file + rename.
    async fn persist(&self, table: &BTreeMap<PlayerId, PlaytimeRecord>) -> Result<(), StoreError> {
        let doc = Document {
            version: FORMAT_VERSION,
            players: table.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Applies `records` to a copy of the table, persists the copy, and
    /// only then swaps it in. A failed write leaves memory and disk agreeing.
    async fn apply(&self, records: impl IntoIterator<Item = PlaytimeRecord>) -> Result<usize, StoreError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let mut written = 0;
        for record in records {
            next.insert(record.player_id, record);
            written += 1;
        }
        self.persist(&next).await?;
        *table = next;
        Ok(written)
    }
}

impl PersistenceGateway for JsonFileGateway {
    async fn load_baseline(
        &self,
        player_id: PlayerId,
    ) -> Result<Option<BaselineRecord>, StoreError> {
        let table = self.table.lock().await;
        Ok(table.get(&player_id).map(PlaytimeRecord::to_baseline))
    }

    async fn upsert_one(&self, record: PlaytimeRecord) -> Result<(), StoreError> {
        self.apply([record]).await.map(|_| ())
    }

    async fn upsert_batch(&self, records: RecordBatch) -> Result<(), StoreError> {
        let written = self.apply(records.into_values()).await?;
        tracing::trace!(written, path = %self.path.display(), "json store batch written");
        Ok(())
    }
}
