//! Stage 1: stream remote datasets into object storage.
//!
//! Every source of one run is stored under the same [`BatchIdentity`],
//! captured once before the first transfer.

use bytes::BytesMut;
use futures::StreamExt;
use std::time::Duration;

use crate::config::{Config, SourceDescriptor};
use crate::constants::{HTTP_CONNECT_TIMEOUT_SECS, PROGRESS_LOG_INTERVAL_BYTES};
use crate::error::{Error, Result};
use crate::pipeline::batch::BatchIdentity;
use crate::pipeline::path_codec::{PathCodec, infer_format};
use crate::pipeline::report::UnitResults;
use crate::services::storage::{ObjectWriter, StorageService};
use crate::utils::{format_bytes, format_progress};

/// Downloads configured sources into batch-stamped object paths.
#[derive(Debug, Clone)]
pub struct Downloader {
    storage: StorageService,
    codec: PathCodec,
    sources: Vec<SourceDescriptor>,
    chunk_size: usize,
    client: reqwest::Client,
}

impl Downloader {
    /// `timeout` bounds each whole transfer, body included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the chunk size is zero or the HTTP client
    /// cannot be built.
    pub fn new(
        storage: StorageService,
        codec: PathCodec,
        sources: Vec<SourceDescriptor>,
        chunk_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("download chunk size must be positive"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            storage,
            codec,
            sources,
            chunk_size,
            client,
        })
    }

    /// Builds a downloader from the `[storage]`, `[execution]` and
    /// `[[sources]]` sections.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn from_config(config: &Config, storage: StorageService) -> Result<Self> {
        Self::new(
            storage,
            PathCodec::new(&config.storage.raw_folder),
            config.sources.clone(),
            config.chunk_size_bytes(),
            config.timeout(),
        )
    }

    /// Downloads every active source (or only `filter`) under a fresh batch
    /// identity.
    pub async fn download(&self, filter: Option<&str>) -> UnitResults {
        self.download_at(BatchIdentity::now(), filter).await
    }

    /// Downloads under a caller-supplied batch identity.
    ///
    /// Returns no outcomes at all when the bucket cannot be ensured or the
    /// filter names an unknown source. Inactive sources are skipped without
    /// an outcome.
    pub async fn download_at(&self, identity: BatchIdentity, filter: Option<&str>) -> UnitResults {
        let mut results = UnitResults::new();

        match self.storage.ensure_bucket().await {
            Ok(true) => tracing::info!(bucket = %self.storage.bucket(), "Created storage bucket"),
            Ok(false) => tracing::debug!(bucket = %self.storage.bucket(), "Storage bucket exists"),
            Err(e) => {
                tracing::error!(bucket = %self.storage.bucket(), error = %format!("{e:#}"), "Cannot ensure storage bucket");
                return results;
            },
        }

        let selected: Vec<&SourceDescriptor> = match filter {
            Some(name) => match self.sources.iter().find(|source| source.name == name) {
                Some(source) => vec![source],
                None => {
                    let known: Vec<&str> = self.sources.iter().map(|s| s.name.as_str()).collect();
                    tracing::error!(source = name, known = ?known, "Unknown source");
                    return results;
                },
            },
            None => self.sources.iter().collect(),
        };

        tracing::info!(batch = %identity, sources = selected.len(), "Starting downloads");

        for source in selected {
            if !source.active {
                tracing::info!(source = %source.name, "Source inactive, skipping");
                continue;
            }
            let ok = match self.download_source(source, identity).await {
                Ok(bytes) => {
                    tracing::info!(source = %source.name, size = %format_bytes(bytes), "Download complete");
                    true
                },
                Err(e) => {
                    tracing::error!(source = %source.name, error = %e, "Download failed");
                    false
                },
            };
            results.record(&source.name, ok);
        }

        results.log_summary("download");
        tracing::info!(timestamp = %identity.sql_timestamp(), "Batch timestamp for this download");
        results
    }

    /// Streams one source into storage; returns the byte count.
    async fn download_source(&self, source: &SourceDescriptor, identity: BatchIdentity) -> Result<u64> {
        let format = infer_format(&source.url);
        let path = self.codec.encode(&source.name, identity, format)?;
        let uri = self.storage.uri(&path);
        tracing::info!(source = %source.name, url = %source.url, destination = %uri, "Downloading");

        let response = self
            .client
            .get(&source.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::http(&source.name, e))?;
        let total = response.content_length();
        if let Some(total) = total {
            tracing::info!(source = %source.name, size = %format_bytes(total), "Remote size");
        }

        let mut writer = self
            .storage
            .open_writer(&path, Some(format.content_type()))
            .await
            .map_err(|e| Error::storage(format!("opening {uri}"), &e))?;

        match self
            .stream_into(&source.name, &uri, response, writer.as_mut(), total)
            .await
        {
            Ok(written) => {
                writer
                    .finish()
                    .await
                    .map_err(|e| Error::storage(format!("finishing {uri}"), &e))?;
                Ok(written)
            },
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    tracing::warn!(destination = %uri, error = %format!("{abort:#}"), "Failed to discard partial upload");
                }
                Err(e)
            },
        }
    }

    /// Re-chunks the body into `chunk_size` writes.
    async fn stream_into(
        &self,
        source: &str,
        uri: &str,
        response: reqwest::Response,
        writer: &mut dyn ObjectWriter,
        total: Option<u64>,
    ) -> Result<u64> {
        let mut body = response.bytes_stream();
        let mut buffer = BytesMut::with_capacity(self.chunk_size);
        let mut written = 0u64;
        let mut next_report = PROGRESS_LOG_INTERVAL_BYTES;

        while let Some(piece) = body.next().await {
            let piece = piece.map_err(|e| Error::http(source, e))?;
            buffer.extend_from_slice(&piece);

            while buffer.len() >= self.chunk_size {
                let chunk = buffer.split_to(self.chunk_size);
                written += self.write_chunk(uri, writer, &chunk).await?;
                if written >= next_report {
                    tracing::info!(source, progress = %format_progress(written, total), "Download progress");
                    next_report = written - written % PROGRESS_LOG_INTERVAL_BYTES + PROGRESS_LOG_INTERVAL_BYTES;
                }
            }
        }
        if !buffer.is_empty() {
            written += self.write_chunk(uri, writer, &buffer).await?;
        }
        Ok(written)
    }

    async fn write_chunk(&self, uri: &str, writer: &mut dyn ObjectWriter, chunk: &[u8]) -> Result<u64> {
        writer
            .write(chunk)
            .await
            .map_err(|e| Error::storage(format!("writing {uri}"), &e))?;
        Ok(chunk.len() as u64)
    }
}
