//! High-level `StorageService` wrapper over backend implementations.
//!
//! Provides a convenient API that wraps any `StorageBackend` implementation.

use super::backend::{ObjectWriter, StorageBackend};
use super::filesystem::FilesystemBackend;
use super::memory::MemoryStorageBackend;
use super::types::ObjectMeta;
use anyhow::Result;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// High-level object storage service interface.
///
/// Wraps a `StorageBackend` implementation together with the bucket name it
/// serves, and provides a consistent API regardless of the underlying
/// storage mechanism.
///
/// # Thread Safety
///
/// `StorageService` is `Clone` and can be shared across threads. The underlying
/// backend handles concurrent access safely.
///
/// # Example
///
/// ```ignore
/// use etlpipe::services::storage::StorageService;
///
/// let storage = StorageService::memory("landing");
/// storage.ensure_bucket().await?;
/// storage.put_object("raw_data/2024-01/a__2024-01-01_00-00-00.csv", b"id\n1\n", None).await?;
/// for meta in storage.list_objects(Some("raw_data/")).await? {
///     println!("{} ({} bytes)", storage.uri(&meta.path), meta.size);
/// }
/// ```
#[derive(Clone)]
pub struct StorageService {
    backend: Arc<dyn StorageBackend>,
    bucket: String,
}

impl StorageService {
    /// Creates a new `StorageService` backed by a directory under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage root cannot be created or opened.
    pub fn file<P: AsRef<Path>>(root: P, bucket: &str) -> Result<Self> {
        let backend = FilesystemBackend::open(root, bucket)?;
        Ok(Self::custom(bucket, backend))
    }

    /// Creates a new `StorageService` backed by an in-memory store.
    ///
    /// All data is lost when the process exits.
    pub fn memory(bucket: &str) -> Self {
        Self::custom(bucket, MemoryStorageBackend::new())
    }

    /// Creates a new `StorageService` with a custom backend.
    pub fn custom<B: StorageBackend>(bucket: &str, backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            bucket: bucket.to_string(),
        }
    }

    /// Creates a new `StorageService` from a boxed backend.
    pub fn from_boxed(bucket: &str, backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: Arc::from(backend),
            bucket: bucket.to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Human-readable location of an object, for logs.
    pub fn uri(&self, path: &str) -> String {
        format!("storage://{}/{}", self.bucket, path)
    }

    /// Creates the bucket if absent. Returns `true` if it was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be checked or created.
    pub async fn ensure_bucket(&self) -> Result<bool> {
        self.backend.ensure_bucket().await
    }

    /// Stores an object with metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or storage fails.
    pub async fn put_object(
        &self,
        path: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> Result<ObjectMeta> {
        self.backend.put(path, data, content_type).await
    }

    /// Opens a streaming writer; see [`ObjectWriter`].
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the writer cannot be opened.
    pub async fn open_writer(
        &self,
        path: &str,
        content_type: Option<&str>,
    ) -> Result<Box<dyn ObjectWriter>> {
        self.backend.open_writer(path, content_type).await
    }

    /// Retrieves an object and its metadata.
    ///
    /// Returns `Ok(None)` if the object doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or retrieval fails.
    pub async fn get_object(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>> {
        self.backend.get(path).await
    }

    /// Lists all objects, optionally filtered by prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    pub async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        self.backend.list(prefix).await
    }
}

impl fmt::Debug for StorageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageService")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}
