//! Backend trait for the storage service.
//!
//! Defines the interface that all storage backends must implement,
//! enabling pluggable object stores (filesystem, memory, cloud buckets).

use super::types::ObjectMeta;
use anyhow::Result;
use async_trait::async_trait;

/// Backend trait for object storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
///
/// # Example
///
/// ```ignore
/// use etlpipe::services::storage::{StorageBackend, MemoryStorageBackend};
///
/// let backend = MemoryStorageBackend::new();
/// backend.put("raw_data/2024-01/a__2024-01-01_00-00-00.csv", b"x\n1\n", None).await?;
/// let objects = backend.list(Some("raw_data/")).await?;
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Makes sure the bucket (or its local equivalent) exists.
    ///
    /// # Returns
    /// * `Ok(true)` - The bucket was created by this call
    /// * `Ok(false)` - The bucket already existed
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be checked or created.
    async fn ensure_bucket(&self) -> Result<bool>;

    /// Stores a complete object.
    ///
    /// # Arguments
    /// * `path` - Object key
    /// * `data` - Object data bytes
    /// * `content_type` - Optional MIME type (guessed from the key if None)
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    async fn put(&self, path: &str, data: &[u8], content_type: Option<&str>) -> Result<ObjectMeta>;

    /// Opens a streaming writer for a new object.
    ///
    /// The object only becomes visible once [`ObjectWriter::finish`] succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the writer cannot be opened.
    async fn open_writer(
        &self,
        path: &str,
        content_type: Option<&str>,
    ) -> Result<Box<dyn ObjectWriter>>;

    /// Retrieves an object and its metadata.
    ///
    /// # Returns
    /// * `Ok(Some((data, meta)))` - Object found
    /// * `Ok(None)` - Object not found
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the read fails.
    async fn get(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>>;

    /// Lists all objects, optionally filtered by key prefix.
    ///
    /// # Returns
    /// Vector of object metadata sorted by key
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>>;
}

/// Sequential writer for one object.
///
/// Chunks are appended in call order. Callers must end with either
/// [`finish`](ObjectWriter::finish) or [`abort`](ObjectWriter::abort).
#[async_trait]
pub trait ObjectWriter: Send {
    /// Appends one chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk cannot be written.
    async fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Commits the object and returns its metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be committed.
    async fn finish(self: Box<Self>) -> Result<ObjectMeta>;

    /// Discards everything written so far.
    ///
    /// # Errors
    ///
    /// Returns an error if partial data cannot be cleaned up.
    async fn abort(self: Box<Self>) -> Result<()>;
}
