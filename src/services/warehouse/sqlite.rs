//! SQLite-backed warehouse.
//!
//! Tables are named by their full `project.dataset.table` reference, so SQL
//! written against backtick-quoted references runs unchanged. Datasets are
//! tracked in a small catalog table. A `TIMESTAMP(text)` scalar function
//! normalizes timestamp literals to `YYYY-MM-DD HH:MM:SS`; SQLite's built-in
//! `DATE(text)` already yields `YYYY-MM-DD`.

use super::backend::WarehouseBackend;
use super::staged::StagedTable;
use super::types::{ColumnType, Row, TableRef, Value};
use crate::services::storage::{FileFormat, StorageService};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const CATALOG_TABLE: &str = "_etlpipe_datasets";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Embedded SQLite warehouse reading staged objects from a [`StorageService`].
///
/// # Thread Safety
///
/// `SqliteWarehouse` is `Clone`; clones share one connection guarded by a
/// mutex. All SQLite work runs on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteWarehouse {
    conn: Arc<Mutex<Connection>>,
    storage: StorageService,
}

impl SqliteWarehouse {
    /// Opens (or creates) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or initialized.
    pub fn open<P: AsRef<Path>>(path: P, storage: StorageService) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create warehouse directory: {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open warehouse database: {}", path.display()))?;
        Self::init(conn, storage)
    }

    /// Creates a throwaway in-memory warehouse.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be initialized.
    pub fn memory(storage: StorageService) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory warehouse")?;
        Self::init(conn, storage)
    }

    fn init(conn: Connection, storage: StorageService) -> Result<Self> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {CATALOG_TABLE} (
                dataset_id TEXT PRIMARY KEY,
                location   TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"
        ))
        .context("Failed to initialize dataset catalog")?;

        conn.create_scalar_function(
            "TIMESTAMP",
            1,
            FunctionFlags::SQLITE_UTF8
                | FunctionFlags::SQLITE_DETERMINISTIC
                | FunctionFlags::SQLITE_INNOCUOUS,
            |ctx| {
                let raw: Option<String> = ctx.get(0)?;
                raw.map(|raw| {
                    normalize_timestamp(&raw).ok_or_else(|| {
                        rusqlite::Error::UserFunctionError(
                            format!("invalid timestamp literal: '{raw}'").into(),
                        )
                    })
                })
                .transpose()
            },
        )
        .context("Failed to register TIMESTAMP function")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            storage,
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .context("Task join error")?
    }
}

/// Canonical `YYYY-MM-DD HH:MM:SS` form of a timestamp literal.
///
/// Accepts RFC 3339 (converted to UTC), ISO-8601 with `T` or space and
/// optional fractional seconds or `Z`, and bare dates (midnight).
/// Fractional seconds are dropped.
pub(crate) fn normalize_timestamp(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc().format(TIMESTAMP_FORMAT).to_string());
    }

    let trimmed = trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix(" UTC"))
        .unwrap_or(trimmed);
    let parsed = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ]
    .into_iter()
    .find_map(|layout| NaiveDateTime::parse_from_str(trimmed, layout).ok())
    .or_else(|| {
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })?;

    Some(parsed.format(TIMESTAMP_FORMAT).to_string())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn columns_of(conn: &Connection, table: &str) -> Result<Option<Vec<String>>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1)")
        .context("Failed to prepare schema probe")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))
        .with_context(|| format!("Failed to read schema of {table}"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("Failed to read schema of {table}"))?;
    Ok((!columns.is_empty()).then_some(columns))
}

fn require_dataset(conn: &Connection, dataset_id: &str) -> Result<()> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM {CATALOG_TABLE} WHERE dataset_id = ?1"),
            [dataset_id],
            |_| Ok(()),
        )
        .optional()
        .context("Failed to read dataset catalog")?;
    if found.is_none() {
        bail!("Dataset not found: {dataset_id}");
    }
    Ok(())
}

fn append_rows(conn: &mut Connection, table: &TableRef, staged: &StagedTable) -> Result<u64> {
    if staged.columns.is_empty() {
        bail!("Staged object has no columns");
    }
    require_dataset(conn, &table.dataset_id())?;

    let qualified = table.qualified();
    let name = quote_ident(&qualified);
    let tx = conn
        .transaction()
        .context("Failed to begin load transaction")?;

    let types = staged.column_types();
    match columns_of(&tx, &qualified)? {
        None => {
            let defs: Vec<String> = staged
                .columns
                .iter()
                .zip(&types)
                .map(|(column, ty)| format!("{} {ty}", quote_ident(column)))
                .collect();
            tx.execute_batch(&format!("CREATE TABLE {name} ({})", defs.join(", ")))
                .with_context(|| format!("Failed to create table {qualified}"))?;
            tracing::info!(table = %qualified, columns = defs.len(), "Created table from staged schema");
        },
        Some(existing) => {
            for (column, ty) in staged.columns.iter().zip(&types) {
                if existing.iter().any(|e| e.eq_ignore_ascii_case(column)) {
                    continue;
                }
                tx.execute_batch(&format!(
                    "ALTER TABLE {name} ADD COLUMN {} {ty}",
                    quote_ident(column)
                ))
                .with_context(|| format!("Failed to add column {column} to {qualified}"))?;
                tracing::info!(table = %qualified, column = %column, "Added column from staged schema");
            }
        },
    }

    {
        let columns: Vec<String> = staged.columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {name} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ))
            .with_context(|| format!("Failed to prepare insert into {qualified}"))?;
        for (idx, row) in staged.rows.iter().enumerate() {
            stmt.execute(params_from_iter(row.iter().map(Value::to_rusqlite)))
                .with_context(|| format!("Failed to insert row {} into {qualified}", idx + 1))?;
        }
    }

    tx.commit().context("Failed to commit load transaction")?;
    Ok(staged.rows.len() as u64)
}

#[async_trait]
impl WarehouseBackend for SqliteWarehouse {
    async fn ensure_dataset(&self, project: &str, dataset: &str, location: &str) -> Result<bool> {
        let dataset_id = format!("{project}.{dataset}");
        let location = location.to_string();
        self.with_conn(move |conn| {
            let inserted = conn
                .execute(
                    &format!(
                        "INSERT OR IGNORE INTO {CATALOG_TABLE} (dataset_id, location) VALUES (?1, ?2)"
                    ),
                    params![dataset_id, location],
                )
                .with_context(|| format!("Failed to create dataset {dataset_id}"))?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn table_columns(&self, table: &TableRef) -> Result<Option<Vec<String>>> {
        let qualified = table.qualified();
        self.with_conn(move |conn| columns_of(conn, &qualified))
            .await
    }

    async fn add_column(&self, table: &TableRef, column: &str, kind: ColumnType) -> Result<()> {
        let qualified = table.qualified();
        let column = column.to_string();
        self.with_conn(move |conn| {
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {kind}",
                quote_ident(&qualified),
                quote_ident(&column)
            ))
            .with_context(|| format!("Failed to add column {column} to {qualified}"))
        })
        .await
    }

    async fn load_append(
        &self,
        table: &TableRef,
        object_path: &str,
        format: FileFormat,
    ) -> Result<u64> {
        let (data, _) = self
            .storage
            .get_object(object_path)
            .await?
            .with_context(|| format!("Staged object not found: {}", self.storage.uri(object_path)))?;

        let uri = self.storage.uri(object_path);
        let staged = tokio::task::spawn_blocking(move || {
            StagedTable::decode(format, Bytes::from(data))
                .with_context(|| format!("Failed to decode {format} object {uri}"))
        })
        .await
        .context("Task join error")??;

        let table = table.clone();
        self.with_conn(move |conn| append_rows(conn, &table, &staged))
            .await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let sql = sql.to_string();
        let params: Vec<_> = params.iter().map(Value::to_rusqlite).collect();
        self.with_conn(move |conn| {
            let affected = conn
                .execute(&sql, params_from_iter(params))
                .context("Failed to execute statement")?;
            Ok(affected as u64)
        })
        .await
    }

    async fn execute_script(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.with_conn(move |conn| conn.execute_batch(&sql).context("Failed to execute script"))
            .await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let params: Vec<_> = params.iter().map(Value::to_rusqlite).collect();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql).context("Failed to prepare query")?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let width = columns.len();

            let rows = stmt
                .query_map(params_from_iter(params), |row| {
                    (0..width)
                        .map(|idx| row.get_ref(idx).map(Value::from))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })
                .context("Failed to execute query")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to fetch query rows")?;

            Ok(rows
                .into_iter()
                .map(|values| Row::new(columns.clone(), values))
                .collect())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::warehouse::staged::tests::parquet_fixture;

    async fn warehouse() -> (SqliteWarehouse, StorageService) {
        let storage = StorageService::memory("landing");
        let warehouse = SqliteWarehouse::memory(storage.clone()).unwrap();
        warehouse.ensure_dataset("acme", "raw", "EU").await.unwrap();
        (warehouse, storage)
    }

    fn table() -> TableRef {
        TableRef::new("acme", "raw", "ratios_raw")
    }

    #[test]
    fn test_normalize_timestamp() {
        for (raw, expected) in [
            ("2024-01-31T10:00:00", "2024-01-31 10:00:00"),
            ("2024-01-31 10:00:00.123456", "2024-01-31 10:00:00"),
            ("2024-01-31T10:00:00Z", "2024-01-31 10:00:00"),
            ("2024-01-31T12:00:00+02:00", "2024-01-31 10:00:00"),
            ("2024-01-31T10:00", "2024-01-31 10:00:00"),
            ("2024-01-31", "2024-01-31 00:00:00"),
        ] {
            assert_eq!(normalize_timestamp(raw).as_deref(), Some(expected), "{raw}");
        }
        assert!(normalize_timestamp("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_ensure_dataset_reports_creation_once() {
        let (warehouse, _) = warehouse().await;
        assert!(!warehouse.ensure_dataset("acme", "raw", "EU").await.unwrap());
        assert!(warehouse.ensure_dataset("acme", "curated", "EU").await.unwrap());
    }

    #[tokio::test]
    async fn test_load_requires_dataset() {
        let storage = StorageService::memory("landing");
        storage.put_object("a.csv", b"id\n1\n", None).await.unwrap();
        let warehouse = SqliteWarehouse::memory(storage).unwrap();

        let err = warehouse
            .load_append(&table(), "a.csv", FileFormat::Csv)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Dataset not found"));
    }

    #[tokio::test]
    async fn test_load_creates_then_appends_and_widens() {
        let (warehouse, storage) = warehouse().await;
        storage.put_object("a.csv", b"id,label\n1,x\n2,y\n", None).await.unwrap();
        storage.put_object("b.csv", b"id,label,extra\n3,z,0.5\n", None).await.unwrap();

        assert!(warehouse.table_columns(&table()).await.unwrap().is_none());
        assert_eq!(warehouse.load_append(&table(), "a.csv", FileFormat::Csv).await.unwrap(), 2);
        assert_eq!(
            warehouse.table_columns(&table()).await.unwrap().unwrap(),
            ["id", "label"]
        );

        assert_eq!(warehouse.load_append(&table(), "b.csv", FileFormat::Csv).await.unwrap(), 1);
        assert_eq!(
            warehouse.table_columns(&table()).await.unwrap().unwrap(),
            ["id", "label", "extra"]
        );

        let rows = warehouse
            .query(&format!("SELECT COUNT(*) AS n FROM {}", table()), &[])
            .await
            .unwrap();
        assert_eq!(rows[0].get("n").and_then(Value::as_integer), Some(3));
    }

    #[tokio::test]
    async fn test_load_parquet_object() {
        let (warehouse, storage) = warehouse().await;
        storage
            .put_object("p.parquet", &parquet_fixture(&[(10, "a"), (20, "b")]), None)
            .await
            .unwrap();

        let loaded = warehouse
            .load_append(&table(), "p.parquet", FileFormat::Parquet)
            .await
            .unwrap();
        assert_eq!(loaded, 2);

        let rows = warehouse
            .query(&format!("SELECT siren, name FROM {} ORDER BY siren", table()), &[])
            .await
            .unwrap();
        assert_eq!(rows[1].values, [Value::Integer(20), Value::Text("b".into())]);
    }

    #[tokio::test]
    async fn test_missing_object_is_an_error() {
        let (warehouse, _) = warehouse().await;
        assert!(
            warehouse
                .load_append(&table(), "nope.csv", FileFormat::Csv)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_add_column_and_timestamp_function() {
        let (warehouse, storage) = warehouse().await;
        storage.put_object("a.csv", b"id\n1\n", None).await.unwrap();
        warehouse.load_append(&table(), "a.csv", FileFormat::Csv).await.unwrap();
        warehouse
            .add_column(&table(), "extraction_timestamp", ColumnType::Timestamp)
            .await
            .unwrap();

        let updated = warehouse
            .execute(
                &format!(
                    "UPDATE {} SET extraction_timestamp = TIMESTAMP('2024-01-31T10:00:00') \
                     WHERE extraction_timestamp IS NULL",
                    table()
                ),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let rows = warehouse
            .query(&format!("SELECT extraction_timestamp FROM {}", table()), &[])
            .await
            .unwrap();
        assert_eq!(
            rows[0].first().and_then(Value::as_text),
            Some("2024-01-31 10:00:00")
        );
        assert!(
            warehouse
                .query("SELECT TIMESTAMP('not a time')", &[])
                .await
                .is_err()
        );
    }
}
