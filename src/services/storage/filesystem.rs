//! Filesystem-backed storage backend.
//!
//! Provides persistent object storage using the local filesystem with
//! metadata tracked in redb.
//!
//! Layout under the configured root:
//!
//! ```text
//! <root>/<bucket>.redb      metadata index
//! <root>/<bucket>/<key>     object data
//! ```

use super::backend::{ObjectWriter, StorageBackend};
use super::memory::guess_content_type;
use super::metadata::{MetadataIndex, PARTIAL_SUFFIX};
use super::types::ObjectMeta;
use super::validation::{object_key, object_path};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Filesystem-backed object storage backend.
///
/// # Thread Safety
///
/// `FilesystemBackend` is `Clone` and can be shared across threads. The underlying
/// database handles concurrent access safely.
#[derive(Clone)]
pub struct FilesystemBackend {
    bucket_dir: PathBuf,
    index: Arc<MetadataIndex>,
}

impl FilesystemBackend {
    /// Opens the bucket `bucket` under `root`.
    ///
    /// The bucket directory itself is only created by
    /// [`StorageBackend::ensure_bucket`] or the first write.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The bucket name is not a single path segment
    /// - The root directory cannot be created
    /// - The metadata database cannot be opened or reconciled
    pub fn open<P: AsRef<Path>>(root: P, bucket: &str) -> Result<Self> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            bail!("Invalid bucket name: '{bucket}'");
        }
        let root = root.as_ref();

        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create storage root: {}", root.display()))?;

        let index = MetadataIndex::open(&root.join(format!("{bucket}.redb")))?;
        let bucket_dir = root.join(bucket);
        index.reconcile(&bucket_dir)?;

        Ok(Self {
            bucket_dir,
            index: Arc::new(index),
        })
    }

    /// Directory holding the bucket's objects.
    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    fn file_key(path: &str) -> Result<String> {
        let key = object_key(path)?;
        if key.ends_with('/') {
            bail!("Directory markers are not stored by the filesystem backend: {path}");
        }
        if key.ends_with(PARTIAL_SUFFIX) {
            bail!("Object keys cannot end with '{PARTIAL_SUFFIX}': {path}");
        }
        Ok(key)
    }

    fn ensure_bucket_sync(&self) -> Result<bool> {
        if self.bucket_dir.is_dir() {
            return Ok(false);
        }
        fs::create_dir_all(&self.bucket_dir).with_context(|| {
            format!("Failed to create bucket: {}", self.bucket_dir.display())
        })?;
        Ok(true)
    }

    fn record(&self, key: &str, size: u64, content_type: Option<&str>) -> Result<ObjectMeta> {
        let now = Utc::now();
        let created_at = self.index.load(key)?.map_or(now, |meta| meta.created_at);
        let meta = ObjectMeta {
            path: key.to_string(),
            size,
            content_type: guess_content_type(key, content_type),
            created_at,
            modified_at: now,
        };
        self.index.save(&meta)?;
        Ok(meta)
    }

    fn put_sync(&self, path: &str, data: &[u8], content_type: Option<&str>) -> Result<ObjectMeta> {
        let key = Self::file_key(path)?;
        let file_path = object_path(&self.bucket_dir, &key)?;

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directories for: {key}"))?;
        }
        fs::write(&file_path, data).with_context(|| format!("Failed to write object: {key}"))?;

        self.record(&key, data.len() as u64, content_type)
    }

    fn get_sync(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>> {
        let key = Self::file_key(path)?;
        let file_path = object_path(&self.bucket_dir, &key)?;

        if !file_path.is_file() {
            return Ok(None);
        }
        let data = fs::read(&file_path).with_context(|| format!("Failed to read object: {key}"))?;

        let meta = match self.index.load(&key)? {
            Some(meta) => meta,
            None => {
                let now = Utc::now();
                ObjectMeta {
                    path: key.clone(),
                    size: data.len() as u64,
                    content_type: guess_content_type(&key, None),
                    created_at: now,
                    modified_at: now,
                }
            },
        };
        Ok(Some((data, meta)))
    }

    fn open_writer_sync(&self, path: &str) -> Result<(String, PathBuf, PathBuf)> {
        let key = Self::file_key(path)?;
        let final_path = object_path(&self.bucket_dir, &key)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directories for: {key}"))?;
        }
        let mut part = final_path.clone().into_os_string();
        part.push(PARTIAL_SUFFIX);
        Ok((key, final_path, PathBuf::from(part)))
    }
}

/// Streams into `<object>.part` and renames on finish.
struct FilesystemObjectWriter {
    backend: FilesystemBackend,
    key: String,
    content_type: Option<String>,
    final_path: PathBuf,
    part_path: PathBuf,
    file: tokio::fs::File,
    written: u64,
}

#[async_trait]
impl ObjectWriter for FilesystemObjectWriter {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .with_context(|| format!("Failed to write object chunk: {}", self.key))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<ObjectMeta> {
        let Self {
            backend,
            key,
            content_type,
            final_path,
            part_path,
            mut file,
            written,
        } = *self;

        file.flush()
            .await
            .with_context(|| format!("Failed to flush object: {key}"))?;
        file.sync_all()
            .await
            .with_context(|| format!("Failed to sync object: {key}"))?;
        drop(file);

        tokio::fs::rename(&part_path, &final_path)
            .await
            .with_context(|| format!("Failed to commit object: {key}"))?;

        tokio::task::spawn_blocking(move || backend.record(&key, written, content_type.as_deref()))
            .await
            .context("Task join error")?
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        let Self {
            key,
            part_path,
            file,
            ..
        } = *self;
        drop(file);
        match tokio::fs::remove_file(&part_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to discard partial object: {key}")),
        }
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn ensure_bucket(&self) -> Result<bool> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.ensure_bucket_sync())
            .await
            .context("Task join error")?
    }

    async fn put(&self, path: &str, data: &[u8], content_type: Option<&str>) -> Result<ObjectMeta> {
        let backend = self.clone();
        let path = path.to_string();
        let data = data.to_vec();
        let content_type = content_type.map(std::string::ToString::to_string);
        tokio::task::spawn_blocking(move || backend.put_sync(&path, &data, content_type.as_deref()))
            .await
            .context("Task join error")?
    }

    async fn open_writer(
        &self,
        path: &str,
        content_type: Option<&str>,
    ) -> Result<Box<dyn ObjectWriter>> {
        let backend = self.clone();
        let path = path.to_string();
        let (key, final_path, part_path) =
            tokio::task::spawn_blocking(move || backend.open_writer_sync(&path))
                .await
                .context("Task join error")??;

        let file = tokio::fs::File::create(&part_path)
            .await
            .with_context(|| format!("Failed to open object for writing: {key}"))?;

        Ok(Box::new(FilesystemObjectWriter {
            backend: self.clone(),
            key,
            content_type: content_type.map(std::string::ToString::to_string),
            final_path,
            part_path,
            file,
            written: 0,
        }))
    }

    async fn get(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>> {
        let backend = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || backend.get_sync(&path))
            .await
            .context("Task join error")?
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        let backend = self.clone();
        let prefix = prefix.map(std::string::ToString::to_string);
        tokio::task::spawn_blocking(move || backend.index.list(prefix.as_deref()))
            .await
            .context("Task join error")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_bucket_creates_directory_once() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::open(dir.path(), "landing").unwrap();

        assert!(!backend.bucket_dir().exists());
        assert!(backend.ensure_bucket().await.unwrap());
        assert!(backend.bucket_dir().is_dir());
        assert!(!backend.ensure_bucket().await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_bad_bucket_names() {
        let dir = TempDir::new().unwrap();
        for bucket in ["", "a/b", ".."] {
            assert!(FilesystemBackend::open(dir.path(), bucket).is_err(), "{bucket}");
        }
    }

    #[tokio::test]
    async fn test_streamed_object_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let key = "raw_data/2024-01/a__2024-01-02_03-04-05.csv";
        {
            let backend = FilesystemBackend::open(dir.path(), "landing").unwrap();
            let mut writer = backend.open_writer(key, None).await.unwrap();
            writer.write(b"id,name\n").await.unwrap();
            writer.write(b"1,x\n").await.unwrap();
            let meta = writer.finish().await.unwrap();
            assert_eq!(meta.size, 12);
            assert_eq!(meta.content_type, "text/csv");
        }

        let backend = FilesystemBackend::open(dir.path(), "landing").unwrap();
        let listed = backend.list(Some("raw_data/")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, key);

        let (data, _) = backend.get(key).await.unwrap().unwrap();
        assert_eq!(data, b"id,name\n1,x\n");
    }

    #[tokio::test]
    async fn test_aborted_writer_leaves_no_object() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::open(dir.path(), "landing").unwrap();
        let key = "raw_data/2024-01/a__2024-01-02_03-04-05.parquet";

        let mut writer = backend.open_writer(key, None).await.unwrap();
        writer.write(b"PAR1").await.unwrap();
        writer.abort().await.unwrap();

        assert!(backend.list(None).await.unwrap().is_empty());
        assert!(backend.get(key).await.unwrap().is_none());
        assert!(!backend.bucket_dir().join(format!("{key}.part")).exists());
    }

    #[tokio::test]
    async fn test_marker_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::open(dir.path(), "landing").unwrap();
        assert!(backend.put("raw_data/2024-01/", b"", None).await.is_err());
        assert!(backend.put("../escape.csv", b"x", None).await.is_err());
    }
}
