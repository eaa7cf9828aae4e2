//! High-level `WarehouseService` wrapper over backend implementations.

use super::backend::WarehouseBackend;
use super::sqlite::SqliteWarehouse;
use super::types::{ColumnType, Row, TableRef, Value};
use crate::services::storage::{FileFormat, StorageService};
use anyhow::Result;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// High-level warehouse service interface.
///
/// Wraps a `WarehouseBackend` implementation and provides a consistent API
/// regardless of the underlying engine.
///
/// # Example
///
/// ```ignore
/// use etlpipe::services::warehouse::WarehouseService;
///
/// let warehouse = WarehouseService::memory(storage)?;
/// warehouse.ensure_dataset("acme", "landing", "EU").await?;
/// let rows = warehouse.query("SELECT 1", &[]).await?;
/// ```
#[derive(Clone)]
pub struct WarehouseService {
    backend: Arc<dyn WarehouseBackend>,
}

impl WarehouseService {
    /// Creates a `WarehouseService` backed by a SQLite database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn file<P: AsRef<Path>>(path: P, storage: StorageService) -> Result<Self> {
        Ok(Self::custom(SqliteWarehouse::open(path, storage)?))
    }

    /// Creates a `WarehouseService` backed by an in-memory SQLite database.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn memory(storage: StorageService) -> Result<Self> {
        Ok(Self::custom(SqliteWarehouse::memory(storage)?))
    }

    /// Creates a `WarehouseService` with a custom backend.
    pub fn custom<B: WarehouseBackend>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Creates a `WarehouseService` from a boxed backend.
    pub fn from_boxed(backend: Box<dyn WarehouseBackend>) -> Self {
        Self {
            backend: Arc::from(backend),
        }
    }

    /// Creates the dataset if missing. Returns `true` if it was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be checked or created.
    pub async fn ensure_dataset(&self, project: &str, dataset: &str, location: &str) -> Result<bool> {
        self.backend.ensure_dataset(project, dataset, location).await
    }

    /// Column names of `table`, `None` when the table does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be read.
    pub async fn table_columns(&self, table: &TableRef) -> Result<Option<Vec<String>>> {
        self.backend.table_columns(table).await
    }

    /// Adds a nullable column.
    ///
    /// # Errors
    ///
    /// Returns an error if the column cannot be added.
    pub async fn add_column(&self, table: &TableRef, column: &str, kind: ColumnType) -> Result<()> {
        self.backend.add_column(table, column, kind).await
    }

    /// Appends a staged object to `table`, returning the row count.
    ///
    /// # Errors
    ///
    /// Returns an error if the load fails.
    pub async fn load_append(
        &self,
        table: &TableRef,
        object_path: &str,
        format: FileFormat,
    ) -> Result<u64> {
        self.backend.load_append(table, object_path, format).await
    }

    /// Executes one statement, returning the affected row count.
    ///
    /// # Errors
    ///
    /// Returns an error if statement execution fails.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.backend.execute(sql, params).await
    }

    /// Executes a multi-statement script.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub async fn execute_script(&self, sql: &str) -> Result<()> {
        self.backend.execute_script(sql).await
    }

    /// Runs a query and returns all rows.
    ///
    /// # Errors
    ///
    /// Returns an error if query execution fails.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.backend.query(sql, params).await
    }
}

impl fmt::Debug for WarehouseService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseService").finish_non_exhaustive()
    }
}
