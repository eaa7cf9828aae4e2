//! Stage 2: append one staged batch into per-source raw tables and stamp
//! the appended rows with the batch identity.
//!
//! Sources are loaded independently: one failing table never blocks its
//! siblings. Rows are stamped with `WHERE <timestamp> IS NULL`, so a load
//! only ever stamps rows it appended (or rows an interrupted earlier load
//! left unstamped).

use crate::config::{Config, WarehouseConfig};
use crate::error::{Error, Result};
use crate::pipeline::batch::BatchIdentity;
use crate::pipeline::index::{BatchIndex, StorageObjectRecord};
use crate::pipeline::path_codec::PathCodec;
use crate::pipeline::report::UnitResults;
use crate::pipeline::selector::{BatchSelector, SelectionHints};
use crate::services::storage::StorageService;
use crate::services::warehouse::{ColumnType, TableRef, WarehouseService};

/// Names of the two columns that record which batch loaded a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampColumns {
    pub timestamp: String,
    pub date: String,
}

impl StampColumns {
    pub fn new(timestamp: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            date: date.into(),
        }
    }

    pub fn from_config(config: &WarehouseConfig) -> Self {
        Self::new(&config.timestamp_column, &config.date_column)
    }

    /// Stamp columns absent from `existing` (case-insensitive).
    pub fn missing(&self, existing: &[String]) -> Vec<(&str, ColumnType)> {
        [
            (self.timestamp.as_str(), ColumnType::Timestamp),
            (self.date.as_str(), ColumnType::Date),
        ]
        .into_iter()
        .filter(|(column, _)| !existing.iter().any(|e| e.eq_ignore_ascii_case(column)))
        .collect()
    }

    /// `UPDATE` stamping every not-yet-stamped row of `table`.
    pub fn update_sql(&self, table: &TableRef, identity: BatchIdentity) -> String {
        format!(
            "UPDATE {table} SET {ts} = TIMESTAMP('{stamp}'), {date} = DATE('{day}') WHERE {ts} IS NULL",
            ts = self.timestamp,
            date = self.date,
            stamp = identity.sql_timestamp(),
            day = identity.date_str(),
        )
    }
}

/// Where raw tables live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetTarget {
    pub project: String,
    pub dataset: String,
    pub location: String,
    /// Table name with a `{source}` placeholder.
    pub raw_table_pattern: String,
}

impl DatasetTarget {
    pub fn from_config(config: &Config) -> Self {
        Self {
            project: config.project.id.clone(),
            dataset: config.warehouse.dataset.clone(),
            location: config.project.region.clone(),
            raw_table_pattern: config.warehouse.raw_table_pattern.clone(),
        }
    }

    pub fn table(&self, source: &str) -> TableRef {
        TableRef::new(
            &self.project,
            &self.dataset,
            self.raw_table_pattern
                .replace(crate::constants::SOURCE_PLACEHOLDER, source),
        )
    }
}

/// Outcome of one load call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Batch that was loaded; `None` when nothing was selected.
    pub identity: Option<BatchIdentity>,
    /// Per-source outcome, in listing order.
    pub results: UnitResults,
}

impl LoadReport {
    /// At least one source attempted and every attempt succeeded.
    pub fn success(&self) -> bool {
        self.identity.is_some() && self.results.success()
    }
}

/// Drives stage 2 for one batch.
#[derive(Debug, Clone)]
pub struct LoadCoordinator {
    warehouse: WarehouseService,
    selector: BatchSelector,
    target: DatasetTarget,
    stamps: StampColumns,
    expected_sources: usize,
}

impl LoadCoordinator {
    pub fn new(
        warehouse: WarehouseService,
        selector: BatchSelector,
        target: DatasetTarget,
        stamps: StampColumns,
    ) -> Self {
        Self {
            warehouse,
            selector,
            target,
            stamps,
            expected_sources: 0,
        }
    }

    pub fn from_config(config: &Config, storage: StorageService, warehouse: WarehouseService) -> Self {
        let index = BatchIndex::new(storage, PathCodec::new(&config.storage.raw_folder));
        Self::new(
            warehouse,
            BatchSelector::new(index),
            DatasetTarget::from_config(config),
            StampColumns::from_config(&config.warehouse),
        )
        .with_expected_sources(config.sources.iter().filter(|s| s.active).count())
    }

    /// Number of sources a complete batch holds; a smaller batch is
    /// loaded anyway with a warning.
    #[must_use]
    pub fn with_expected_sources(mut self, expected: usize) -> Self {
        self.expected_sources = expected;
        self
    }

    pub fn stamps(&self) -> &StampColumns {
        &self.stamps
    }

    /// Loads the batch the hints resolve to.
    ///
    /// Transfer failures are logged and reported as unsuccessful.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed date hint.
    pub async fn load_batch(&self, hints: &SelectionHints) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        let target = &self.target;
        match self
            .warehouse
            .ensure_dataset(&target.project, &target.dataset, &target.location)
            .await
        {
            Ok(true) => tracing::info!(dataset = %target.dataset, location = %target.location, "Created dataset"),
            Ok(false) => tracing::debug!(dataset = %target.dataset, "Dataset exists"),
            Err(e) => {
                tracing::error!(dataset = %target.dataset, error = %format!("{e:#}"), "Cannot ensure dataset");
                return Ok(report);
            },
        }

        let identity = match self.selector.select_hints(hints).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                tracing::error!(hints = ?hints, "No staged batch matches");
                return Ok(report);
            },
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                tracing::error!(error = %e, "Batch selection failed");
                return Ok(report);
            },
        };
        report.identity = Some(identity);

        let records = match self.selector.index().records(identity).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(batch = %identity, error = %e, "Cannot list batch objects");
                return Ok(report);
            },
        };
        if records.len() < self.expected_sources {
            tracing::warn!(
                batch = %identity,
                found = records.len(),
                expected = self.expected_sources,
                "Partial batch, loading the sources present"
            );
        }
        tracing::info!(batch = %identity, files = records.len(), "Loading batch");

        for record in &records {
            let ok = match self.load_record(record, identity).await {
                Ok(rows) => {
                    tracing::info!(source = %record.source, rows, "Loaded");
                    true
                },
                Err(e) => {
                    tracing::error!(source = %record.source, error = %e, "Load failed");
                    false
                },
            };
            report.results.record(&record.source, ok);
        }

        report.results.log_summary("load");
        Ok(report)
    }

    /// Loads the most recent batch; true on full success.
    pub async fn load_latest(&self) -> bool {
        match self.load_batch(&SelectionHints::latest()).await {
            Ok(report) => report.success(),
            Err(e) => {
                tracing::error!(error = %e, "Load aborted");
                false
            },
        }
    }

    async fn load_record(&self, record: &StorageObjectRecord, identity: BatchIdentity) -> Result<u64> {
        let table = self.target.table(&record.source);
        let name = table.qualified();

        match self.columns(&table).await? {
            Some(columns) => self.add_missing_stamps(&table, &columns).await?,
            None => tracing::info!(table = %name, "Table not found, will be created by load"),
        }

        let rows = self
            .warehouse
            .load_append(&table, &record.path, record.format)
            .await
            .map_err(|e| Error::warehouse(format!("loading {} into {name}", record.path), &e))?;

        // The load may just have created the table without stamp columns.
        let columns = self.columns(&table).await?.ok_or_else(|| Error::Warehouse {
            context: format!("stamping {name}"),
            reason: "table missing after load".to_string(),
        })?;
        self.add_missing_stamps(&table, &columns).await?;

        let stamped = self
            .warehouse
            .execute(&self.stamps.update_sql(&table, identity), &[])
            .await
            .map_err(|e| Error::warehouse(format!("stamping {name}"), &e))?;
        tracing::debug!(table = %name, stamped, "Stamped rows");
        Ok(rows)
    }

    async fn columns(&self, table: &TableRef) -> Result<Option<Vec<String>>> {
        self.warehouse
            .table_columns(table)
            .await
            .map_err(|e| Error::warehouse(format!("reading schema of {}", table.qualified()), &e))
    }

    async fn add_missing_stamps(&self, table: &TableRef, columns: &[String]) -> Result<()> {
        for (column, kind) in self.stamps.missing(columns) {
            self.warehouse
                .add_column(table, column, kind)
                .await
                .map_err(|e| Error::warehouse(format!("adding {column} to {}", table.qualified()), &e))?;
            tracing::info!(table = %table.qualified(), column, kind = %kind, "Added stamp column");
        }
        Ok(())
    }
}
