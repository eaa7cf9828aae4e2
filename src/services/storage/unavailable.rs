//! Storage double whose every call fails, for exercising error paths.

use super::backend::{ObjectWriter, StorageBackend};
use super::types::ObjectMeta;
use anyhow::{Result, bail};
use async_trait::async_trait;

/// Backend standing in for an unreachable object store.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UnavailableBackend;

#[async_trait]
impl StorageBackend for UnavailableBackend {
    async fn ensure_bucket(&self) -> Result<bool> {
        bail!("storage unavailable")
    }

    async fn put(&self, _path: &str, _data: &[u8], _content_type: Option<&str>) -> Result<ObjectMeta> {
        bail!("storage unavailable")
    }

    async fn open_writer(
        &self,
        _path: &str,
        _content_type: Option<&str>,
    ) -> Result<Box<dyn ObjectWriter>> {
        bail!("storage unavailable")
    }

    async fn get(&self, _path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>> {
        bail!("storage unavailable")
    }

    async fn list(&self, _prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        bail!("storage unavailable")
    }
}
