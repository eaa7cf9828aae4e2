//! Object metadata index for the filesystem backend.
//!
//! Object sizes and content types live in a redb table keyed by object key,
//! so listings never have to walk the bucket directory.

use anyhow::{Context, Result};
use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::memory::guess_content_type;
use super::types::{OBJECTS_TABLE, ObjectMeta};

/// Suffix of in-progress streaming writes. Never indexed.
pub(crate) const PARTIAL_SUFFIX: &str = ".part";

/// redb-backed metadata table.
pub(crate) struct MetadataIndex {
    db: Database,
}

impl MetadataIndex {
    /// Opens (or creates) the index database and its table.
    pub(crate) fn open(db_path: &Path) -> Result<Self> {
        let db = Database::create(db_path).with_context(|| {
            format!(
                "Failed to open storage metadata database: {}",
                db_path.display()
            )
        })?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            let _table = write_txn
                .open_table(OBJECTS_TABLE)
                .context("Failed to initialize objects table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;

        Ok(Self { db })
    }

    pub(crate) fn save(&self, meta: &ObjectMeta) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(OBJECTS_TABLE)
                .context("Failed to open objects table")?;
            let json = serde_json::to_vec(meta).context("Failed to serialize object metadata")?;
            table
                .insert(meta.path.as_str(), json.as_slice())
                .with_context(|| format!("Failed to insert object metadata: {}", meta.path))?;
        }
        write_txn
            .commit()
            .context("Failed to commit metadata save transaction")
    }

    pub(crate) fn load(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?;

        match table
            .get(key)
            .with_context(|| format!("Failed to read object metadata: {key}"))?
        {
            Some(guard) => {
                let meta = serde_json::from_slice(guard.value())
                    .with_context(|| format!("Failed to deserialize object metadata: {key}"))?;
                Ok(Some(meta))
            },
            None => Ok(None),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(OBJECTS_TABLE)
                .context("Failed to open objects table")?;
            table
                .remove(key)
                .with_context(|| format!("Failed to remove object metadata: {key}"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit metadata removal transaction")
    }

    /// All entries whose key starts with `prefix`, in key order.
    pub(crate) fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?;

        let mut objects = Vec::new();
        for item in table.iter().context("Failed to iterate objects table")? {
            let (key, value) = item.context("Failed to read object entry")?;
            if prefix.is_some_and(|prefix| !key.value().starts_with(prefix)) {
                continue;
            }
            match serde_json::from_slice::<ObjectMeta>(value.value()) {
                Ok(meta) => objects.push(meta),
                Err(e) => {
                    tracing::warn!(key = key.value(), error = %e, "Skipping unreadable metadata entry");
                },
            }
        }
        Ok(objects)
    }

    /// Brings the index in line with the files under `bucket_dir`.
    ///
    /// Drops entries whose file is gone, indexes files written outside the
    /// service and refreshes entries whose size changed. Leftover partial
    /// writes are ignored.
    pub(crate) fn reconcile(&self, bucket_dir: &Path) -> Result<()> {
        tracing::debug!(bucket_dir = %bucket_dir.display(), "Reconciling storage metadata");

        let mut on_disk: HashSet<String> = HashSet::new();
        scan_directory(bucket_dir, bucket_dir, &mut on_disk)?;

        let mut orphaned = Vec::new();
        let mut stale = Vec::new();
        for mut meta in self.list(None)? {
            if !on_disk.remove(&meta.path) {
                orphaned.push(meta.path);
                continue;
            }
            if let Ok(file_meta) = fs::metadata(bucket_dir.join(&meta.path))
                && file_meta.len() != meta.size
            {
                meta.size = file_meta.len();
                meta.modified_at = Utc::now();
                stale.push(meta);
            }
        }

        for key in &orphaned {
            self.remove(key)?;
        }
        for meta in &stale {
            self.save(meta)?;
        }
        for key in &on_disk {
            if let Ok(file_meta) = fs::metadata(bucket_dir.join(key)) {
                let now = Utc::now();
                self.save(&ObjectMeta {
                    path: key.clone(),
                    size: file_meta.len(),
                    content_type: guess_content_type(key, None),
                    created_at: now,
                    modified_at: now,
                })?;
            }
        }

        if orphaned.is_empty() && stale.is_empty() && on_disk.is_empty() {
            tracing::debug!("Storage metadata is consistent with filesystem");
        } else {
            tracing::info!(
                orphaned = orphaned.len(),
                untracked = on_disk.len(),
                stale = stale.len(),
                "Storage reconciliation complete"
            );
        }
        Ok(())
    }
}

/// Collects object keys (relative, forward-slashed) for every file below `dir`.
fn scan_directory(base_dir: &Path, dir: &Path, keys: &mut HashSet<String>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let path: PathBuf = entry.context("Failed to read directory entry")?.path();

        if path.is_dir() {
            scan_directory(base_dir, &path, keys)?;
        } else if path.is_file()
            && !path.to_string_lossy().ends_with(PARTIAL_SUFFIX)
            && let Ok(relative) = path.strip_prefix(base_dir)
        {
            keys.insert(relative.to_string_lossy().replace('\\', "/"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(path: &str, size: u64) -> ObjectMeta {
        let now = Utc::now();
        ObjectMeta {
            path: path.to_string(),
            size,
            content_type: "text/csv".to_string(),
            created_at: now,
            modified_at: now,
        }
    }

    #[test]
    fn test_save_load_list() {
        let dir = TempDir::new().unwrap();
        let index = MetadataIndex::open(&dir.path().join("metadata.redb")).unwrap();

        index.save(&meta("raw_data/b.csv", 2)).unwrap();
        index.save(&meta("raw_data/a.csv", 1)).unwrap();
        index.save(&meta("other/c.csv", 3)).unwrap();

        assert_eq!(index.load("raw_data/a.csv").unwrap().unwrap().size, 1);
        assert!(index.load("raw_data/z.csv").unwrap().is_none());

        let listed: Vec<_> = index
            .list(Some("raw_data/"))
            .unwrap()
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(listed, ["raw_data/a.csv", "raw_data/b.csv"]);
    }

    #[test]
    fn test_reconcile_tracks_disk_and_ignores_partials() {
        let dir = TempDir::new().unwrap();
        let bucket = dir.path().join("bucket");
        fs::create_dir_all(bucket.join("raw_data/2024-01")).unwrap();
        fs::write(bucket.join("raw_data/2024-01/a.csv"), b"abc").unwrap();
        fs::write(bucket.join("raw_data/2024-01/b.csv.part"), b"x").unwrap();

        let index = MetadataIndex::open(&dir.path().join("metadata.redb")).unwrap();
        index.save(&meta("raw_data/gone.csv", 1)).unwrap();
        index.save(&meta("raw_data/2024-01/a.csv", 1)).unwrap();

        index.reconcile(&bucket).unwrap();

        let listed = index.list(None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "raw_data/2024-01/a.csv");
        assert_eq!(listed[0].size, 3);
    }
}
