//! Backend trait for the warehouse service.
//!
//! Defines the interface that all warehouse backends must implement,
//! enabling pluggable table stores (SQLite, cloud warehouses, etc.).

use super::types::{ColumnType, Row, TableRef, Value};
use crate::services::storage::FileFormat;
use anyhow::Result;
use async_trait::async_trait;

/// Backend trait for warehouse access.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
///
/// # Example
///
/// ```ignore
/// use etlpipe::services::warehouse::{WarehouseBackend, SqliteWarehouse, TableRef};
///
/// let backend = SqliteWarehouse::memory(storage)?;
/// backend.ensure_dataset("acme", "landing", "EU").await?;
/// let table = TableRef::new("acme", "landing", "ratios_raw");
/// let loaded = backend.load_append(&table, "raw_data/2024-01/ratios__2024-01-31_10-00-00.csv", FileFormat::Csv).await?;
/// ```
#[async_trait]
pub trait WarehouseBackend: Send + Sync + 'static {
    /// Creates the dataset if missing.
    ///
    /// Returns `true` when it was created by this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be checked or created.
    async fn ensure_dataset(&self, project: &str, dataset: &str, location: &str) -> Result<bool>;

    /// Column names of a table, or `None` if the table does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be read.
    async fn table_columns(&self, table: &TableRef) -> Result<Option<Vec<String>>>;

    /// Adds a nullable column to an existing table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is missing or the column already exists.
    async fn add_column(&self, table: &TableRef, column: &str, kind: ColumnType) -> Result<()>;

    /// Appends the rows of a staged object to `table`.
    ///
    /// The schema is detected from the object. A missing table is created;
    /// columns the table lacks are added. Columns of the table absent from
    /// the object are left NULL. Returns the number of rows appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset is missing, the object cannot be read
    /// or decoded, or the append fails.
    async fn load_append(&self, table: &TableRef, object_path: &str, format: FileFormat)
    -> Result<u64>;

    /// Executes a single DML statement and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Executes a multi-statement script.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement in the script fails.
    async fn execute_script(&self, sql: &str) -> Result<()>;

    /// Runs a query and returns all rows.
    ///
    /// # Errors
    ///
    /// Returns an error if preparation or execution fails.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;
}
