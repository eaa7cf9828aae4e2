//! Choosing one batch from storage or from warehouse stamps.
//!
//! `Ok(None)` means nothing matched. Malformed hints are configuration
//! errors and failed listings are transfer errors.

use crate::constants::TIMESTAMP_HINT_LIMIT;
use crate::error::{Error, Result};
use crate::pipeline::batch::{BatchIdentity, parse_date_hint};
use crate::pipeline::index::BatchIndex;
use crate::services::warehouse::{TableRef, Value, WarehouseService};

/// Operator hints for picking a storage batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionHints {
    /// Exact batch; wins over `date`.
    pub batch: Option<BatchIdentity>,
    /// `YYYY-MM-DD`; the latest batch of that day.
    pub date: Option<String>,
}

impl SelectionHints {
    /// No hints: the most recent batch.
    pub fn latest() -> Self {
        Self::default()
    }

    /// Parses raw CLI hints. `batch` accepts a batch key or ISO-8601.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHint`] for a malformed batch or date.
    pub fn parse(batch: Option<&str>, date: Option<&str>) -> Result<Self> {
        let batch = batch.map(str::parse::<BatchIdentity>).transpose()?;
        if let Some(date) = date {
            parse_date_hint(date)?;
        }
        Ok(Self {
            batch,
            date: date.map(str::to_string),
        })
    }
}

/// Picks a batch identity out of the storage index.
#[derive(Debug, Clone)]
pub struct BatchSelector {
    index: BatchIndex,
}

impl BatchSelector {
    pub fn new(index: BatchIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &BatchIndex {
        &self.index
    }

    /// Resolves hints to one identity.
    ///
    /// 1. `identity`: that batch if it has objects (date ignored).
    /// 2. `date_prefix`: the latest batch of that day.
    /// 3. Neither: the latest batch overall.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHint`] for a malformed date and
    /// [`Error::Storage`] when listing fails.
    pub async fn select(
        &self,
        identity: Option<BatchIdentity>,
        date_prefix: Option<&str>,
    ) -> Result<Option<BatchIdentity>> {
        let date = date_prefix.map(parse_date_hint).transpose()?;

        if let Some(identity) = identity {
            let batches = self
                .index
                .list_month(&identity.year_month(), Some(identity))
                .await?;
            return Ok(batches.contains_key(&identity).then_some(identity));
        }

        if let Some(date) = date {
            let day = date.format("%Y-%m-%d").to_string();
            let month = date.format("%Y-%m").to_string();
            let batches = self.index.list_month(&month, None).await?;
            return Ok(batches
                .keys()
                .rev()
                .find(|candidate| candidate.key().starts_with(&day))
                .copied());
        }

        let batches = self.index.list(None, None).await?;
        Ok(batches.keys().next_back().copied())
    }

    /// [`select`](Self::select) driven by parsed hints.
    ///
    /// # Errors
    ///
    /// Same as [`select`](Self::select).
    pub async fn select_hints(&self, hints: &SelectionHints) -> Result<Option<BatchIdentity>> {
        self.select(hints.batch, hints.date.as_deref()).await
    }
}

/// Picks a batch from the stamp values already in the warehouse.
#[derive(Debug, Clone)]
pub struct WarehouseSelector {
    warehouse: WarehouseService,
    table: TableRef,
    timestamp_column: String,
}

impl WarehouseSelector {
    /// `table` is the reference raw table whose stamps define the batches.
    pub fn new(warehouse: WarehouseService, table: TableRef, timestamp_column: impl Into<String>) -> Self {
        Self {
            warehouse,
            table,
            timestamp_column: timestamp_column.into(),
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Distinct stamped batches, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Warehouse`] if the query fails (a missing table
    /// included); an empty table is `Ok(vec![])`.
    pub async fn available(&self) -> Result<Vec<BatchIdentity>> {
        let column = &self.timestamp_column;
        let sql = format!(
            "SELECT DISTINCT {column} FROM {table} WHERE {column} IS NOT NULL ORDER BY {column} DESC",
            table = self.table,
        );
        let rows = self.warehouse.query(&sql, &[]).await.map_err(|e| {
            Error::warehouse(format!("reading timestamps from {}", self.table.qualified()), &e)
        })?;

        let mut identities: Vec<BatchIdentity> = rows
            .iter()
            .filter_map(|row| match row.first() {
                Some(Value::Text(raw)) => {
                    let parsed = BatchIdentity::parse_iso(raw);
                    if parsed.is_none() {
                        tracing::warn!(value = %raw, "Ignoring unparseable stamp value");
                    }
                    parsed
                },
                Some(other) => {
                    tracing::warn!(value = %other, "Ignoring non-text stamp value");
                    None
                },
                None => None,
            })
            .collect();
        identities.sort_unstable_by(|a, b| b.cmp(a));
        identities.dedup();
        Ok(identities)
    }

    /// Resolves an optional ISO-8601 request against the stamped batches.
    ///
    /// Without a request, or when the request is unparseable or absent from
    /// the warehouse, falls back to the most recent batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Warehouse`] if the stamp query fails.
    pub async fn select(&self, requested: Option<&str>) -> Result<Option<BatchIdentity>> {
        let available = self.available().await?;
        let Some(latest) = available.first().copied() else {
            tracing::warn!(table = %self.table.qualified(), "No batch timestamps in the warehouse");
            return Ok(None);
        };

        let Some(requested) = requested else {
            tracing::info!(timestamp = %latest.sql_timestamp(), "No timestamp requested, using most recent");
            return Ok(Some(latest));
        };

        match BatchIdentity::parse_iso(requested) {
            Some(identity) if available.contains(&identity) => Ok(Some(identity)),
            Some(_) => {
                tracing::warn!(requested, "Requested timestamp not found in the warehouse");
                for (rank, identity) in available.iter().take(TIMESTAMP_HINT_LIMIT).enumerate() {
                    tracing::info!(rank = rank + 1, timestamp = %identity.sql_timestamp(), "Available timestamp");
                }
                tracing::info!(timestamp = %latest.sql_timestamp(), "Using most recent timestamp");
                Ok(Some(latest))
            },
            None => {
                tracing::warn!(
                    requested,
                    fallback = %latest.sql_timestamp(),
                    "Unparseable timestamp, using most recent"
                );
                Ok(Some(latest))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::path_codec::PathCodec;
    use crate::services::storage::StorageService;

    fn id(key: &str) -> BatchIdentity {
        BatchIdentity::parse_key(key).unwrap()
    }

    async fn selector(keys: &[&str]) -> BatchSelector {
        let storage = StorageService::memory("landing");
        let codec = PathCodec::new("raw_data");
        for key in keys {
            let identity = id(key);
            let path = codec
                .encode("ratios", identity, crate::services::storage::FileFormat::Csv)
                .unwrap();
            storage.put_object(&path, b"id\n1\n", None).await.unwrap();
        }
        BatchSelector::new(BatchIndex::new(storage, codec))
    }

    const KEYS: [&str; 3] = [
        "2024-01-01_10-00-00",
        "2024-01-01_12-00-00",
        "2024-02-01_09-00-00",
    ];

    #[tokio::test]
    async fn test_precedence() {
        let selector = selector(&KEYS).await;

        assert_eq!(
            selector.select(None, None).await.unwrap(),
            Some(id("2024-02-01_09-00-00"))
        );
        assert_eq!(
            selector.select(None, Some("2024-01-01")).await.unwrap(),
            Some(id("2024-01-01_12-00-00"))
        );
        assert_eq!(
            selector
                .select(Some(id("2024-01-01_10-00-00")), Some("2024-02-01"))
                .await
                .unwrap(),
            Some(id("2024-01-01_10-00-00"))
        );
        assert_eq!(
            selector.select(Some(id("2024-01-01_11-00-00")), None).await.unwrap(),
            None
        );
        assert_eq!(selector.select(None, Some("2024-01-02")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_index_is_not_found() {
        let selector = selector(&[]).await;
        assert_eq!(selector.select(None, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_date_is_configuration_error() {
        let selector = selector(&KEYS).await;
        for date in ["2024-1-01", "2024-13-01", "yesterday"] {
            let err = selector.select(None, Some(date)).await.unwrap_err();
            assert!(err.is_configuration(), "{date}");
        }
    }

    #[test]
    fn test_hint_parsing() {
        let hints = SelectionHints::parse(Some("2024-01-01T10:00:00"), Some("2024-01-01")).unwrap();
        assert_eq!(hints.batch, Some(id("2024-01-01_10-00-00")));
        assert_eq!(hints.date.as_deref(), Some("2024-01-01"));

        assert!(SelectionHints::parse(Some("garbage"), None).is_err());
        assert!(SelectionHints::parse(None, Some("2024/01/01")).is_err());
        assert_eq!(SelectionHints::parse(None, None).unwrap(), SelectionHints::latest());
    }

    async fn stamped_warehouse(stamps: &[&str]) -> WarehouseSelector {
        let storage = StorageService::memory("landing");
        let warehouse = WarehouseService::memory(storage).unwrap();
        let table = TableRef::new("acme", "raw", "ratios_raw");
        warehouse
            .execute_script(&format!(
                "CREATE TABLE {table} (id INTEGER, extraction_timestamp TIMESTAMP)"
            ))
            .await
            .unwrap();
        for (idx, stamp) in stamps.iter().enumerate() {
            warehouse
                .execute(
                    &format!("INSERT INTO {table} VALUES (?1, TIMESTAMP(?2))"),
                    &[Value::Integer(idx as i64), Value::Text((*stamp).to_string())],
                )
                .await
                .unwrap();
        }
        warehouse
            .execute(&format!("INSERT INTO {table} VALUES (99, NULL)"), &[])
            .await
            .unwrap();
        WarehouseSelector::new(warehouse, table, "extraction_timestamp")
    }

    #[tokio::test]
    async fn test_warehouse_available_descending_distinct() {
        let selector = stamped_warehouse(&[
            "2024-01-01T10:00:00",
            "2024-02-01T09:00:00",
            "2024-01-01T10:00:00",
        ])
        .await;
        assert_eq!(
            selector.available().await.unwrap(),
            [id("2024-02-01_09-00-00"), id("2024-01-01_10-00-00")]
        );
    }

    #[tokio::test]
    async fn test_warehouse_select_with_fallbacks() {
        let selector = stamped_warehouse(&["2024-01-01T10:00:00", "2024-02-01T09:00:00"]).await;

        assert_eq!(selector.select(None).await.unwrap(), Some(id("2024-02-01_09-00-00")));
        assert_eq!(
            selector.select(Some("2024-01-01T10:00:00")).await.unwrap(),
            Some(id("2024-01-01_10-00-00"))
        );
        assert_eq!(
            selector.select(Some("2023-06-01T00:00:00")).await.unwrap(),
            Some(id("2024-02-01_09-00-00"))
        );
        assert_eq!(
            selector.select(Some("not-a-timestamp")).await.unwrap(),
            Some(id("2024-02-01_09-00-00"))
        );
    }

    #[tokio::test]
    async fn test_warehouse_empty_vs_failed() {
        let empty = stamped_warehouse(&[]).await;
        assert_eq!(empty.select(None).await.unwrap(), None);

        let storage = StorageService::memory("landing");
        let missing = WarehouseSelector::new(
            WarehouseService::memory(storage).unwrap(),
            TableRef::new("acme", "raw", "absent"),
            "extraction_timestamp",
        );
        assert!(matches!(
            missing.select(None).await,
            Err(Error::Warehouse { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_listing_is_not_not_found() {
        let storage = StorageService::custom(
            "landing",
            crate::services::storage::unavailable::UnavailableBackend,
        );
        let selector = BatchSelector::new(BatchIndex::new(storage, PathCodec::new("raw_data")));

        for (identity, date) in [
            (None, None),
            (None, Some("2024-01-01")),
            (Some(id("2024-01-01_10-00-00")), None),
        ] {
            let result = selector.select(identity, date).await;
            assert!(matches!(result, Err(Error::Storage { .. })), "{result:?}");
        }
    }
}
