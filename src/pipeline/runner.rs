//! Stage sequencing: `DOWNLOAD -> LOAD -> TRANSFORM`, fail-fast.
//!
//! ```text
//! START -> [DOWNLOAD] -> [LOAD] -> TRANSFORM -> DONE
//!              |            |
//!              +-- failure -+--> stop
//! ```
//!
//! Bracketed stages can be skipped. A skipped stage contributes nothing to
//! the outcome; transform always runs once reached.

use async_trait::async_trait;
use chrono::Utc;

use crate::config::{Config, StorageKind, WarehouseKind};
use crate::error::{Error, Result};
use crate::pipeline::download::Downloader;
use crate::pipeline::load::LoadCoordinator;
use crate::pipeline::report::UnitResults;
use crate::pipeline::views::Transformer;
use crate::services::storage::StorageService;
use crate::services::warehouse::WarehouseService;
use crate::utils::format_duration;

/// The three stage entry points, as seen by the runner.
#[async_trait]
pub trait Stages: Send + Sync {
    /// Stage 1; one outcome per attempted source.
    async fn download(&self, source: Option<&str>) -> UnitResults;

    /// Stage 2 for the most recent staged batch.
    async fn load(&self) -> bool;

    /// Stage 3; one outcome per view.
    async fn transform(&self, timestamp: Option<&str>) -> UnitResults;
}

/// Operator switches for a full run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Download only this source.
    pub source: Option<String>,
    /// Filter views to this ISO-8601 batch instead of the latest.
    pub timestamp: Option<String>,
    pub skip_download: bool,
    pub skip_load: bool,
}

/// Runs the stages in order and stops at the first failing one.
#[derive(Debug)]
pub struct StageRunner<S> {
    stages: S,
}

impl<S: Stages> StageRunner<S> {
    pub fn new(stages: S) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &S {
        &self.stages
    }

    pub async fn run(&self, options: &RunOptions) -> bool {
        let started = Utc::now();
        tracing::info!(
            source = ?options.source,
            timestamp = ?options.timestamp,
            skip_download = options.skip_download,
            skip_load = options.skip_load,
            "Pipeline started"
        );

        let ok = self.run_stages(options).await;

        let elapsed = format_duration(Utc::now() - started);
        if ok {
            tracing::info!(elapsed = %elapsed, "Pipeline completed successfully");
        } else {
            tracing::error!(elapsed = %elapsed, "Pipeline failed");
        }
        ok
    }

    async fn run_stages(&self, options: &RunOptions) -> bool {
        if options.skip_download {
            tracing::info!(stage = "download", "Skipped");
        } else {
            let started = Utc::now();
            let results = self.stages.download(options.source.as_deref()).await;
            let ok = results.success();
            log_stage("download", ok, started);
            if !ok {
                return false;
            }
        }

        if options.skip_load {
            tracing::info!(stage = "load", "Skipped");
        } else {
            let started = Utc::now();
            let ok = self.stages.load().await;
            log_stage("load", ok, started);
            if !ok {
                return false;
            }
        }

        let started = Utc::now();
        let ok = self
            .stages
            .transform(options.timestamp.as_deref())
            .await
            .success();
        log_stage("transform", ok, started);
        ok
    }
}

fn log_stage(stage: &str, ok: bool, started: chrono::DateTime<Utc>) {
    let elapsed = format_duration(Utc::now() - started);
    if ok {
        tracing::info!(stage, elapsed = %elapsed, "Stage succeeded");
    } else {
        tracing::error!(stage, elapsed = %elapsed, "Stage failed, stopping");
    }
}

/// Storage and warehouse clients opened from configuration.
#[derive(Debug, Clone)]
pub struct Services {
    pub storage: StorageService,
    pub warehouse: WarehouseService,
}

impl Services {
    /// # Errors
    ///
    /// Returns [`Error::Storage`] or [`Error::Warehouse`] if a backend
    /// cannot be opened.
    pub fn open(config: &Config) -> Result<Self> {
        let bucket = &config.storage.bucket;
        let storage = match config.storage.backend {
            StorageKind::Filesystem => {
                let root = config.storage_root();
                StorageService::file(&root, bucket)
                    .map_err(|e| Error::storage(format!("opening {}", root.display()), &e))?
            },
            StorageKind::Memory => StorageService::memory(bucket),
        };

        let warehouse = match config.warehouse.backend {
            WarehouseKind::Sqlite => {
                let database = config.warehouse_database();
                WarehouseService::file(&database, storage.clone())
                    .map_err(|e| Error::warehouse(format!("opening {}", database.display()), &e))?
            },
            WarehouseKind::Memory => WarehouseService::memory(storage.clone())
                .map_err(|e| Error::warehouse("opening in-memory warehouse", &e))?,
        };

        Ok(Self { storage, warehouse })
    }
}

/// Production [`Stages`] wired from configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    downloader: Downloader,
    loader: LoadCoordinator,
    transformer: Transformer,
}

impl Pipeline {
    pub fn new(downloader: Downloader, loader: LoadCoordinator, transformer: Transformer) -> Self {
        Self {
            downloader,
            loader,
            transformer,
        }
    }

    /// # Errors
    ///
    /// Returns a configuration error if the downloader cannot be built.
    pub fn from_services(config: &Config, services: &Services) -> Result<Self> {
        Ok(Self::new(
            Downloader::from_config(config, services.storage.clone())?,
            LoadCoordinator::from_config(config, services.storage.clone(), services.warehouse.clone()),
            Transformer::from_config(config, services.warehouse.clone()),
        ))
    }

    /// # Errors
    ///
    /// Returns an error if a backend cannot be opened or the downloader
    /// cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::from_services(config, &Services::open(config)?)
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    pub fn loader(&self) -> &LoadCoordinator {
        &self.loader
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }
}

#[async_trait]
impl Stages for Pipeline {
    async fn download(&self, source: Option<&str>) -> UnitResults {
        self.downloader.download(source).await
    }

    async fn load(&self) -> bool {
        self.loader.load_latest().await
    }

    async fn transform(&self, timestamp: Option<&str>) -> UnitResults {
        self.transformer.transform(timestamp).await
    }
}
