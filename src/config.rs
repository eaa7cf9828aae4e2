//! Configuration types for the etlpipe pipeline.
//!
//! This module loads and validates `etlpipe.toml`:
//!
//! - [`Config`] - Root configuration struct
//! - [`ProjectConfig`] - Project identity and logging
//! - [`StorageConfig`] - Object storage for staged downloads
//! - [`WarehouseConfig`] - Warehouse dataset, tables and stamp columns
//! - [`SourceDescriptor`] - One remote dataset to download
//! - [`ViewDefinition`] - One view template to apply
//!
//! Relative paths are resolved against the directory holding the config
//! file. Nothing here is global: each pipeline component is built from the
//! values it needs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::pipeline::path_codec::validate_source_name;
use crate::services::warehouse::TableRef;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// etlpipe.toml configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    pub storage: StorageConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
    #[serde(default)]
    pub views: Vec<ViewDefinition>,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Warehouse project; first part of every table reference.
    pub id: String,
    /// Location recorded for the storage bucket and warehouse dataset.
    pub region: String,
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Object storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Filesystem,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_kind")]
    pub backend: StorageKind,
    pub bucket: String,
    /// Root directory of the filesystem backend.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default = "default_raw_folder")]
    pub raw_folder: String,
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: usize,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Filesystem
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("storage")
}

fn default_raw_folder() -> String {
    constants::DEFAULT_RAW_FOLDER.to_string()
}

fn default_chunk_size_mb() -> usize {
    constants::DEFAULT_CHUNK_SIZE_MB
}

/// Warehouse backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_warehouse_kind")]
    pub backend: WarehouseKind,
    pub dataset: String,
    /// SQLite database file of the sqlite backend.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Raw table name, `{source}` replaced by the source name.
    #[serde(default = "default_raw_table_pattern")]
    pub raw_table_pattern: String,
    /// Raw table whose stamps list the loaded batches. Defaults to the raw
    /// table of the first configured source.
    #[serde(default)]
    pub reference_table: Option<String>,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default = "default_date_column")]
    pub date_column: String,
}

fn default_warehouse_kind() -> WarehouseKind {
    WarehouseKind::Sqlite
}

fn default_database() -> PathBuf {
    PathBuf::from("warehouse.db")
}

fn default_raw_table_pattern() -> String {
    constants::DEFAULT_RAW_TABLE_PATTERN.to_string()
}

fn default_timestamp_column() -> String {
    constants::DEFAULT_TIMESTAMP_COLUMN.to_string()
}

fn default_date_column() -> String {
    constants::DEFAULT_DATE_COLUMN.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    constants::DEFAULT_TIMEOUT_SECS
}

/// One remote dataset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub url: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub description: String,
}

fn default_active() -> bool {
    true
}

/// One view, created from a SQL template file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ViewDefinition {
    pub name: String,
    /// Template path; relative to the config file.
    pub sql: PathBuf,
    #[serde(default)]
    pub description: String,
}

impl Config {
    /// Load configuration from `etlpipe.toml` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn load() -> Result<Self> {
        Self::load_from(constants::DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Required fields are missing or have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Resolves a configured path against the config file directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn storage_root(&self) -> PathBuf {
        self.resolve(&self.storage.root)
    }

    pub fn warehouse_database(&self) -> PathBuf {
        self.resolve(&self.warehouse.database)
    }

    pub fn view_template(&self, view: &ViewDefinition) -> PathBuf {
        self.resolve(&view.sql)
    }

    pub fn chunk_size_bytes(&self) -> usize {
        self.storage.chunk_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_seconds)
    }

    /// Effective log filter: `project.log_level` or the default.
    pub fn log_level(&self) -> &str {
        self.project
            .log_level
            .as_deref()
            .unwrap_or(constants::DEFAULT_LOG_LEVEL)
    }

    /// Raw table name for a source.
    pub fn raw_table_name(&self, source: &str) -> String {
        self.warehouse
            .raw_table_pattern
            .replace(constants::SOURCE_PLACEHOLDER, source)
    }

    pub fn table(&self, name: &str) -> TableRef {
        TableRef::new(&self.project.id, &self.warehouse.dataset, name)
    }

    /// Table whose stamps enumerate loaded batches.
    pub fn reference_table(&self) -> Option<TableRef> {
        match &self.warehouse.reference_table {
            Some(name) => Some(self.table(name)),
            None => self
                .sources
                .first()
                .map(|source| self.table(&self.raw_table_name(&source.name))),
        }
    }

    pub fn source(&self, name: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|source| source.name == name)
    }

    /// Check an operator-supplied `--source` before any work starts.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is given and no source carries it.
    pub fn require_source(&self, name: Option<&str>) -> Result<()> {
        if let Some(name) = name
            && self.source(name).is_none()
        {
            anyhow::bail!("Unknown source '{name}'");
        }
        Ok(())
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error listing every problem found:
    /// - Empty project id, region, bucket, dataset or stamp columns
    /// - Zero chunk size or timeout
    /// - Raw table pattern without `{source}`
    /// - Duplicate or unencodable source names, unparsable source URLs
    /// - Empty or duplicate view names, missing view templates
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Project
        if self.project.id.trim().is_empty() {
            errors.push("project.id cannot be empty".to_string());
        }
        if self.project.region.trim().is_empty() {
            errors.push("project.region cannot be empty".to_string());
        }

        // 2. Storage
        if self.storage.bucket.trim().is_empty() {
            errors.push("storage.bucket cannot be empty".to_string());
        } else if self.storage.bucket.contains(['/', '\\']) {
            errors.push(format!(
                "storage.bucket must be a single name (got: '{}')",
                self.storage.bucket
            ));
        }
        if self.storage.raw_folder.trim_matches('/').is_empty() {
            errors.push("storage.raw_folder cannot be empty".to_string());
        }
        if self.storage.chunk_size_mb == 0 {
            errors.push(format!(
                "storage.chunk_size_mb cannot be 0. Use a positive size (default: {})",
                constants::DEFAULT_CHUNK_SIZE_MB
            ));
        } else if self.storage.chunk_size_mb > 1024 {
            warnings.push(format!(
                "storage.chunk_size_mb {} is very high (> 1024)\n  \
                 Each download buffers one chunk in memory",
                self.storage.chunk_size_mb
            ));
        }

        // 3. Execution
        if self.execution.timeout_seconds == 0 {
            errors.push(format!(
                "execution.timeout_seconds cannot be 0 (default: {})",
                constants::DEFAULT_TIMEOUT_SECS
            ));
        }

        // 4. Warehouse
        if self.warehouse.dataset.trim().is_empty() {
            errors.push("warehouse.dataset cannot be empty".to_string());
        }
        if !self
            .warehouse
            .raw_table_pattern
            .contains(constants::SOURCE_PLACEHOLDER)
        {
            errors.push(format!(
                "warehouse.raw_table_pattern must contain '{}' (got: '{}')",
                constants::SOURCE_PLACEHOLDER,
                self.warehouse.raw_table_pattern
            ));
        }
        if self.warehouse.timestamp_column.trim().is_empty()
            || self.warehouse.date_column.trim().is_empty()
        {
            errors.push("warehouse stamp column names cannot be empty".to_string());
        } else if self.warehouse.timestamp_column == self.warehouse.date_column {
            errors.push(format!(
                "warehouse.timestamp_column and warehouse.date_column must differ (both '{}')",
                self.warehouse.timestamp_column
            ));
        }
        if let Some(reference) = &self.warehouse.reference_table
            && reference.trim().is_empty()
        {
            errors.push("warehouse.reference_table cannot be empty when set".to_string());
        }

        // 5. Sources
        let mut seen = HashSet::new();
        for source in &self.sources {
            if let Err(e) = validate_source_name(&source.name) {
                errors.push(e.to_string());
            } else if !seen.insert(source.name.as_str()) {
                errors.push(format!("duplicate source name '{}'", source.name));
            }
            match url::Url::parse(&source.url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {},
                Ok(url) => errors.push(format!(
                    "source '{}' url must be http or https (got scheme '{}')",
                    source.name,
                    url.scheme()
                )),
                Err(e) => errors.push(format!(
                    "source '{}' url is invalid: {e} (got: '{}')",
                    source.name, source.url
                )),
            }
        }
        if self.sources.is_empty() {
            warnings.push("No sources configured; downloads and loads will have nothing to do".to_string());
        } else if self.sources.iter().all(|source| !source.active) {
            warnings.push("Every source is inactive; downloads will be skipped".to_string());
        }

        // 6. Views
        let mut seen = HashSet::new();
        for view in &self.views {
            if view.name.trim().is_empty() {
                errors.push("view name cannot be empty".to_string());
            } else if !seen.insert(view.name.as_str()) {
                errors.push(format!("duplicate view name '{}'", view.name));
            }
            let template = self.view_template(view);
            if !template.is_file() {
                errors.push(format!(
                    "view '{}' template not found: {}",
                    view.name,
                    template.display()
                ));
            }
        }
        if self.views.is_empty() {
            warnings.push("No views configured; the transform stage will report failure".to_string());
        }

        // 7. Backend-specific hints
        if self.storage.backend == StorageKind::Memory {
            warnings.push(
                "storage.backend = \"memory\": staged files are lost when the process exits"
                    .to_string(),
            );
        }
        if self.warehouse.backend == WarehouseKind::Memory {
            warnings.push(
                "warehouse.backend = \"memory\": loaded tables are lost when the process exits"
                    .to_string(),
            );
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
