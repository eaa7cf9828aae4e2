//! Batch discovery from object listings.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::pipeline::batch::BatchIdentity;
use crate::pipeline::path_codec::PathCodec;
use crate::services::storage::{FileFormat, StorageService};

/// One staged file, as recovered from its object path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObjectRecord {
    pub source: String,
    pub identity: BatchIdentity,
    pub path: String,
    pub format: FileFormat,
    pub size: u64,
}

/// Staged files grouped by batch, oldest batch first.
pub type BatchMap = BTreeMap<BatchIdentity, Vec<StorageObjectRecord>>;

/// Groups stored objects into batches by decoding their paths.
#[derive(Debug, Clone)]
pub struct BatchIndex {
    storage: StorageService,
    codec: PathCodec,
}

impl BatchIndex {
    pub fn new(storage: StorageService, codec: PathCodec) -> Self {
        Self { storage, codec }
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    /// Lists batches under `prefix` (default: the whole raw prefix).
    ///
    /// Directory markers are skipped silently; objects whose names do not
    /// decode are skipped with a warning. With `batch`, only that group is
    /// kept. Records within a batch keep listing order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the listing itself fails.
    pub async fn list(&self, prefix: Option<&str>, batch: Option<BatchIdentity>) -> Result<BatchMap> {
        let prefix = prefix.map_or_else(|| self.codec.root_prefix(), str::to_string);
        let objects = self
            .storage
            .list_objects(Some(&prefix))
            .await
            .map_err(|e| Error::storage(format!("listing {}", self.storage.uri(&prefix)), &e))?;

        let mut batches = BatchMap::new();
        let mut skipped = 0usize;
        for meta in objects {
            if meta.is_directory_marker() {
                continue;
            }
            let Some(decoded) = self.codec.decode(&meta.path) else {
                tracing::warn!(path = %meta.path, "Skipping object that does not follow the batch naming scheme");
                skipped += 1;
                continue;
            };
            if batch.is_some_and(|wanted| wanted != decoded.identity) {
                continue;
            }
            batches
                .entry(decoded.identity)
                .or_default()
                .push(StorageObjectRecord {
                    source: decoded.source,
                    identity: decoded.identity,
                    path: meta.path,
                    format: decoded.format,
                    size: meta.size,
                });
        }

        tracing::debug!(
            prefix = %prefix,
            batches = batches.len(),
            skipped,
            "Indexed staged objects"
        );
        Ok(batches)
    }

    /// Lists batches of one `YYYY-MM` partition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the listing fails.
    pub async fn list_month(&self, year_month: &str, batch: Option<BatchIdentity>) -> Result<BatchMap> {
        self.list(Some(&self.codec.month_prefix(year_month)), batch)
            .await
    }

    /// Records of exactly one batch (empty if it has none).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the listing fails.
    pub async fn records(&self, identity: BatchIdentity) -> Result<Vec<StorageObjectRecord>> {
        let mut batches = self
            .list_month(&identity.year_month(), Some(identity))
            .await?;
        Ok(batches.remove(&identity).unwrap_or_default())
    }
}
