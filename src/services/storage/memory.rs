//! In-memory storage backend.
//!
//! Provides a fast, non-persistent object store using DashMap for
//! concurrent access. Used by tests and dry runs.

use super::backend::{ObjectWriter, StorageBackend};
use super::types::ObjectMeta;
use super::validation::object_key;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Entry stored in the memory backend.
#[derive(Clone)]
struct MemoryObject {
    data: Vec<u8>,
    meta: ObjectMeta,
}

/// In-memory object storage backend using DashMap.
///
/// All data is lost when the process exits. Clones share the same store.
///
/// # Example
///
/// ```ignore
/// use etlpipe::services::storage::MemoryStorageBackend;
///
/// let backend = MemoryStorageBackend::new();
/// backend.put("raw_data/2024-01/", b"", None).await?; // directory marker
/// ```
#[derive(Clone, Default)]
pub struct MemoryStorageBackend {
    data: Arc<DashMap<String, MemoryObject>>,
    bucket_created: Arc<AtomicBool>,
}

impl MemoryStorageBackend {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of objects in the store.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn insert(&self, key: String, data: Vec<u8>, content_type: Option<&str>) -> ObjectMeta {
        let content_type = guess_content_type(&key, content_type);
        let now = Utc::now();
        let created_at = self
            .data
            .get(&key)
            .map_or(now, |entry| entry.value().meta.created_at);
        let meta = ObjectMeta {
            path: key.clone(),
            size: data.len() as u64,
            content_type,
            created_at,
            modified_at: now,
        };
        self.data.insert(
            key,
            MemoryObject {
                data,
                meta: meta.clone(),
            },
        );
        meta
    }
}

/// Resolves the content type from an explicit value or the key's extension.
pub(crate) fn guess_content_type(key: &str, content_type: Option<&str>) -> String {
    content_type
        .map(std::string::ToString::to_string)
        .or_else(|| mime_guess::from_path(key).first().map(|mime| mime.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Buffers chunks until `finish` publishes them as one object.
struct MemoryObjectWriter {
    store: MemoryStorageBackend,
    key: String,
    content_type: Option<String>,
    buffer: Vec<u8>,
}

#[async_trait]
impl ObjectWriter for MemoryObjectWriter {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<ObjectMeta> {
        let Self {
            store,
            key,
            content_type,
            buffer,
        } = *self;
        Ok(store.insert(key, buffer, content_type.as_deref()))
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    async fn ensure_bucket(&self) -> Result<bool> {
        Ok(!self.bucket_created.swap(true, Ordering::SeqCst))
    }

    async fn put(&self, path: &str, data: &[u8], content_type: Option<&str>) -> Result<ObjectMeta> {
        let key = object_key(path)?;
        Ok(self.insert(key, data.to_vec(), content_type))
    }

    async fn open_writer(
        &self,
        path: &str,
        content_type: Option<&str>,
    ) -> Result<Box<dyn ObjectWriter>> {
        let key = object_key(path)?;
        Ok(Box::new(MemoryObjectWriter {
            store: self.clone(),
            key,
            content_type: content_type.map(std::string::ToString::to_string),
            buffer: Vec::new(),
        }))
    }

    async fn get(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>> {
        let key = object_key(path)?;
        Ok(self.data.get(&key).map(|entry| {
            let obj = entry.value();
            (obj.data.clone(), obj.meta.clone())
        }))
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        let mut objects: Vec<ObjectMeta> = self
            .data
            .iter()
            .filter(|entry| prefix.is_none_or(|prefix| entry.key().starts_with(prefix)))
            .map(|entry| entry.value().meta.clone())
            .collect();

        // Sort by key for consistent ordering
        objects.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_bucket_reports_creation_once() {
        let backend = MemoryStorageBackend::new();
        assert!(backend.ensure_bucket().await.unwrap());
        assert!(!backend.clone().ensure_bucket().await.unwrap());
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let backend = MemoryStorageBackend::new();

        let meta = backend
            .put("raw_data/a.csv", b"id\n1\n", None)
            .await
            .unwrap();
        assert_eq!(meta.path, "raw_data/a.csv");
        assert_eq!(meta.size, 5);
        assert_eq!(meta.content_type, "text/csv");

        let (data, _) = backend.get("raw_data/a.csv").await.unwrap().unwrap();
        assert_eq!(data, b"id\n1\n");
        assert!(backend.get("raw_data/b.csv").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writer_publishes_on_finish() {
        let backend = MemoryStorageBackend::new();

        let mut writer = backend.open_writer("raw_data/x.bin", None).await.unwrap();
        writer.write(b"abc").await.unwrap();
        writer.write(b"def").await.unwrap();
        assert!(backend.is_empty());

        let meta = writer.finish().await.unwrap();
        assert_eq!(meta.size, 6);
        assert_eq!(meta.content_type, "application/octet-stream");
        let (data, _) = backend.get("raw_data/x.bin").await.unwrap().unwrap();
        assert_eq!(data, b"abcdef");
    }

    #[tokio::test]
    async fn test_writer_abort_leaves_nothing() {
        let backend = MemoryStorageBackend::new();
        let mut writer = backend.open_writer("raw_data/x.csv", None).await.unwrap();
        writer.write(b"partial").await.unwrap();
        writer.abort().await.unwrap();
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_list_prefix_and_markers() {
        let backend = MemoryStorageBackend::new();
        backend.put("raw_data/2024-01/", b"", None).await.unwrap();
        backend.put("raw_data/2024-01/b.csv", b"1", None).await.unwrap();
        backend.put("raw_data/2024-01/a.csv", b"1", None).await.unwrap();
        backend.put("other/c.csv", b"1", None).await.unwrap();

        let objects = backend.list(Some("raw_data/")).await.unwrap();
        let paths: Vec<_> = objects.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(
            paths,
            ["raw_data/2024-01/", "raw_data/2024-01/a.csv", "raw_data/2024-01/b.csv"]
        );
        assert!(objects[0].is_directory_marker());
        assert!(!objects[1].is_directory_marker());
        assert_eq!(backend.list(None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_path_traversal_prevention() {
        let backend = MemoryStorageBackend::new();
        for path in ["../etc/passwd", "/etc/passwd"] {
            assert!(backend.put(path, b"attack", None).await.is_err(), "{path}");
        }
    }
}
