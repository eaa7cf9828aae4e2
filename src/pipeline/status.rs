//! Operator status: what is staged, what is loaded.
//!
//! Every figure is a [`Probe`], so a failed lookup is never mistaken for
//! an empty result.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::pipeline::batch::BatchIdentity;
use crate::pipeline::index::BatchIndex;
use crate::pipeline::load::DatasetTarget;
use crate::pipeline::path_codec::PathCodec;
use crate::pipeline::selector::WarehouseSelector;
use crate::services::storage::StorageService;
use crate::services::warehouse::{TableRef, WarehouseService};

/// Outcome of one status lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Value(T),
    Failed(String),
}

impl<T> Probe<T> {
    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// One staged batch and how many files it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub identity: BatchIdentity,
    pub files: usize,
    pub bytes: u64,
}

/// Row count of one raw table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub source: String,
    pub table: TableRef,
    pub rows: Probe<u64>,
}

/// Row count of one configured view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewStatus {
    pub name: String,
    pub view: TableRef,
    pub rows: Probe<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Staged batches, most recent first.
    pub batches: Probe<Vec<BatchSummary>>,
    /// Staged object count per configured source.
    pub objects: Probe<BTreeMap<String, usize>>,
    pub tables: Vec<TableStatus>,
    pub views: Vec<ViewStatus>,
    /// Loaded batch timestamps, most recent first.
    pub timestamps: Probe<Vec<BatchIdentity>>,
}

/// Gathers a [`StatusReport`].
#[derive(Debug, Clone)]
pub struct StatusCollector {
    index: BatchIndex,
    warehouse: WarehouseService,
    sources: Vec<String>,
    target: DatasetTarget,
    timestamps: Option<WarehouseSelector>,
    views: Vec<String>,
}

impl StatusCollector {
    pub fn new(
        index: BatchIndex,
        warehouse: WarehouseService,
        sources: Vec<String>,
        target: DatasetTarget,
        timestamps: Option<WarehouseSelector>,
    ) -> Self {
        Self {
            index,
            warehouse,
            sources,
            target,
            timestamps,
            views: Vec::new(),
        }
    }

    /// Views whose row counts are reported alongside the raw tables.
    #[must_use]
    pub fn with_views(mut self, views: Vec<String>) -> Self {
        self.views = views;
        self
    }

    pub fn from_config(config: &Config, storage: StorageService, warehouse: WarehouseService) -> Self {
        let timestamps = config.reference_table().map(|table| {
            WarehouseSelector::new(warehouse.clone(), table, &config.warehouse.timestamp_column)
        });
        Self::new(
            BatchIndex::new(storage, PathCodec::new(&config.storage.raw_folder)),
            warehouse,
            config.sources.iter().map(|s| s.name.clone()).collect(),
            DatasetTarget::from_config(config),
            timestamps,
        )
        .with_views(config.views.iter().map(|v| v.name.clone()).collect())
    }

    pub async fn collect(&self) -> StatusReport {
        let listing = self.index.list(None, None).await;

        let (batches, objects) = match listing {
            Ok(map) => {
                let batches = map
                    .iter()
                    .rev()
                    .map(|(identity, records)| BatchSummary {
                        identity: *identity,
                        files: records.len(),
                        bytes: records.iter().map(|r| r.size).sum(),
                    })
                    .collect();
                let mut objects: BTreeMap<String, usize> =
                    self.sources.iter().map(|s| (s.clone(), 0)).collect();
                for record in map.values().flatten() {
                    if let Some(count) = objects.get_mut(&record.source) {
                        *count += 1;
                    }
                }
                (Probe::Value(batches), Probe::Value(objects))
            },
            Err(e) => {
                let reason = e.to_string();
                (Probe::Failed(reason.clone()), Probe::Failed(reason))
            },
        };

        let mut tables = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let table = self.target.table(source);
            let rows = self.count_rows(&table).await;
            tables.push(TableStatus {
                source: source.clone(),
                table,
                rows,
            });
        }

        let mut views = Vec::with_capacity(self.views.len());
        for name in &self.views {
            let view = TableRef::new(&self.target.project, &self.target.dataset, name);
            let rows = self.count_rows(&view).await;
            views.push(ViewStatus {
                name: name.clone(),
                view,
                rows,
            });
        }

        let timestamps = match &self.timestamps {
            Some(selector) => Probe::from_result(selector.available().await),
            None => Probe::Failed("no reference table configured".to_string()),
        };

        StatusReport {
            batches,
            objects,
            tables,
            views,
            timestamps,
        }
    }

    async fn count_rows(&self, table: &TableRef) -> Probe<u64> {
        let rows = match self
            .warehouse
            .query(&format!("SELECT COUNT(*) FROM {table}"), &[])
            .await
        {
            Ok(rows) => rows,
            Err(e) => return Probe::Failed(format!("{e:#}")),
        };
        match rows.first().and_then(|row| row.first()).and_then(|v| v.as_integer()) {
            Some(count) => Probe::Value(u64::try_from(count).unwrap_or_default()),
            None => Probe::Failed("COUNT(*) returned no integer".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::FileFormat;

    fn id(key: &str) -> BatchIdentity {
        BatchIdentity::parse_key(key).unwrap()
    }

    #[tokio::test]
    async fn test_zero_rows_is_value_missing_table_is_failed() {
        let storage = StorageService::memory("landing");
        let codec = PathCodec::new("raw_data");
        for key in ["2024-01-01_10-00-00", "2024-02-01_09-00-00"] {
            let path = codec.encode("ratios", id(key), FileFormat::Csv).unwrap();
            storage.put_object(&path, b"a\n1\n", None).await.unwrap();
        }

        let warehouse = WarehouseService::memory(storage.clone()).unwrap();
        warehouse
            .execute_script("CREATE TABLE `acme.raw.ratios_raw` (a INTEGER, extraction_timestamp TIMESTAMP)")
            .await
            .unwrap();

        let target = DatasetTarget {
            project: "acme".to_string(),
            dataset: "raw".to_string(),
            location: "EU".to_string(),
            raw_table_pattern: "{source}_raw".to_string(),
        };
        let selector = WarehouseSelector::new(
            warehouse.clone(),
            target.table("ratios"),
            "extraction_timestamp",
        );
        let collector = StatusCollector::new(
            BatchIndex::new(storage, codec),
            warehouse,
            vec!["ratios".to_string(), "stock".to_string()],
            target,
            Some(selector),
        );

        let report = collector.collect().await;
        let batches = report.batches.value().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].identity, id("2024-02-01_09-00-00"));
        assert_eq!(batches[0].files, 1);

        let objects = report.objects.value().unwrap();
        assert_eq!(objects["ratios"], 2);
        assert_eq!(objects["stock"], 0);

        assert_eq!(report.tables[0].rows, Probe::Value(0));
        assert!(report.tables[1].rows.is_failed());
        assert_eq!(report.timestamps, Probe::Value(Vec::new()));
    }

    #[tokio::test]
    async fn test_view_row_counts() {
        let storage = StorageService::memory("landing");
        let warehouse = WarehouseService::memory(storage.clone()).unwrap();
        warehouse
            .execute_script(
                "CREATE TABLE `acme.raw.ratios_raw` (a INTEGER);
                 INSERT INTO `acme.raw.ratios_raw` VALUES (1), (2), (3);
                 CREATE VIEW `acme.raw.ratios_cleaned` AS SELECT a FROM `acme.raw.ratios_raw` WHERE a > 1;",
            )
            .await
            .unwrap();
        let target = DatasetTarget {
            project: "acme".to_string(),
            dataset: "raw".to_string(),
            location: "EU".to_string(),
            raw_table_pattern: "{source}_raw".to_string(),
        };
        let collector = StatusCollector::new(
            BatchIndex::new(storage, PathCodec::new("raw_data")),
            warehouse,
            vec!["ratios".to_string()],
            target,
            None,
        )
        .with_views(vec!["ratios_cleaned".to_string(), "absent".to_string()]);

        let report = collector.collect().await;
        assert_eq!(report.tables[0].rows, Probe::Value(3));
        assert_eq!(report.views.len(), 2);
        assert_eq!(report.views[0].name, "ratios_cleaned");
        assert_eq!(report.views[0].rows, Probe::Value(2));
        assert!(report.views[1].rows.is_failed());
        assert!(report.timestamps.is_failed());
    }

    #[tokio::test]
    async fn test_unavailable_storage_is_failed_not_empty() {
        let storage = StorageService::custom(
            "landing",
            crate::services::storage::unavailable::UnavailableBackend,
        );
        let warehouse = WarehouseService::memory(storage.clone()).unwrap();
        let collector = StatusCollector::new(
            BatchIndex::new(storage, PathCodec::new("raw_data")),
            warehouse,
            vec!["ratios".to_string()],
            DatasetTarget {
                project: "acme".to_string(),
                dataset: "raw".to_string(),
                location: "EU".to_string(),
                raw_table_pattern: "{source}_raw".to_string(),
            },
            None,
        );

        let report = collector.collect().await;
        assert!(report.batches.is_failed());
        assert!(report.objects.is_failed());
    }
}
