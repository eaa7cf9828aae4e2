//! Stage 3: rebuild analytical views restricted to one batch.

use std::path::PathBuf;

use crate::config::Config;
use crate::constants::{DATASET_PLACEHOLDER, FILTER_PLACEHOLDER, PROJECT_PLACEHOLDER};
use crate::error::{Error, Result};
use crate::pipeline::batch::BatchIdentity;
use crate::pipeline::report::UnitResults;
use crate::pipeline::selector::WarehouseSelector;
use crate::services::warehouse::WarehouseService;

/// Renders view templates for one batch.
///
/// Templates carry three placeholders: `{project_id}`, `{dataset}` and
/// `{timestamp_filter}`. Everything else is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewFilterBuilder {
    timestamp_column: String,
    project_id: String,
    dataset: String,
}

impl ViewFilterBuilder {
    pub fn new(
        timestamp_column: impl Into<String>,
        project_id: impl Into<String>,
        dataset: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_column: timestamp_column.into(),
            project_id: project_id.into(),
            dataset: dataset.into(),
        }
    }

    /// `AND <col> = TIMESTAMP('<iso>')`, or empty without a batch.
    pub fn build_filter(&self, identity: Option<BatchIdentity>) -> String {
        match identity {
            Some(identity) => format!(
                "AND {} = TIMESTAMP('{}')",
                self.timestamp_column,
                identity.iso()
            ),
            None => String::new(),
        }
    }

    pub fn render(&self, template: &str, identity: Option<BatchIdentity>) -> String {
        template
            .replace(PROJECT_PLACEHOLDER, &self.project_id)
            .replace(DATASET_PLACEHOLDER, &self.dataset)
            .replace(FILTER_PLACEHOLDER, &self.build_filter(identity))
    }
}

/// A view to (re)create from a template file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTemplate {
    pub name: String,
    pub path: PathBuf,
}

/// Applies view templates in order against the warehouse.
#[derive(Debug, Clone)]
pub struct Transformer {
    warehouse: WarehouseService,
    selector: Option<WarehouseSelector>,
    builder: ViewFilterBuilder,
    views: Vec<ViewTemplate>,
}

impl Transformer {
    /// Without a selector, views are always rendered unfiltered.
    pub fn new(
        warehouse: WarehouseService,
        selector: Option<WarehouseSelector>,
        builder: ViewFilterBuilder,
        views: Vec<ViewTemplate>,
    ) -> Self {
        Self {
            warehouse,
            selector,
            builder,
            views,
        }
    }

    pub fn from_config(config: &Config, warehouse: WarehouseService) -> Self {
        let column = &config.warehouse.timestamp_column;
        let selector = config
            .reference_table()
            .map(|table| WarehouseSelector::new(warehouse.clone(), table, column));
        let views = config
            .views
            .iter()
            .map(|view| ViewTemplate {
                name: view.name.clone(),
                path: config.view_template(view),
            })
            .collect();
        Self::new(
            warehouse,
            selector,
            ViewFilterBuilder::new(column, &config.project.id, &config.warehouse.dataset),
            views,
        )
    }

    /// Batch the views will be filtered to; `None` means unfiltered.
    ///
    /// Lookup failures are logged, not propagated.
    pub async fn resolve(&self, requested: Option<&str>) -> Option<BatchIdentity> {
        let selector = self.selector.as_ref()?;
        match selector.select(requested).await {
            Ok(Some(identity)) => {
                tracing::info!(timestamp = %identity.iso(), "Filtering views to batch");
                Some(identity)
            },
            Ok(None) => {
                tracing::warn!("No batch timestamp available, views will not be filtered");
                None
            },
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read batch timestamps, views will not be filtered");
                None
            },
        }
    }

    /// Recreates every view; one outcome per view, in order.
    pub async fn transform(&self, requested: Option<&str>) -> UnitResults {
        let identity = self.resolve(requested).await;
        let mut results = UnitResults::new();

        for view in &self.views {
            let ok = match self.apply(view, identity).await {
                Ok(()) => {
                    tracing::info!(view = %view.name, "View created");
                    true
                },
                Err(e) => {
                    tracing::error!(view = %view.name, error = %e, "View creation failed");
                    false
                },
            };
            results.record(&view.name, ok);
        }

        results.log_summary("transform");
        results
    }

    async fn apply(&self, view: &ViewTemplate, identity: Option<BatchIdentity>) -> Result<()> {
        let template = tokio::fs::read_to_string(&view.path).await.map_err(|e| {
            Error::config(format!("cannot read template {}: {e}", view.path.display()))
        })?;
        let sql = self.builder.render(&template, identity);
        tracing::debug!(view = %view.name, sql = %sql, "Rendered view");
        self.warehouse
            .execute_script(&sql)
            .await
            .map_err(|e| Error::warehouse(format!("creating view {}", view.name), &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::StorageService;
    use crate::services::warehouse::TableRef;
    use tempfile::TempDir;

    fn builder() -> ViewFilterBuilder {
        ViewFilterBuilder::new("extraction_timestamp", "acme", "entreprises")
    }

    #[test]
    fn test_build_filter() {
        let identity = BatchIdentity::parse_key("2024-12-05_10-30-00");
        assert_eq!(
            builder().build_filter(identity),
            "AND extraction_timestamp = TIMESTAMP('2024-12-05T10:30:00')"
        );
        assert_eq!(builder().build_filter(None), "");
    }

    #[test]
    fn test_render_touches_only_placeholders() {
        let template = "SELECT '{other}' FROM `{project_id}.{dataset}.t` WHERE 1=1 {timestamp_filter}";
        assert_eq!(
            builder().render(template, None),
            "SELECT '{other}' FROM `acme.entreprises.t` WHERE 1=1 "
        );
    }

    async fn fixture(templates: &[(&str, &str)]) -> (TempDir, WarehouseService, Transformer) {
        let dir = TempDir::new().unwrap();
        let warehouse = WarehouseService::memory(StorageService::memory("landing")).unwrap();
        let table = TableRef::new("acme", "entreprises", "ratios_raw");
        warehouse
            .execute_script(&format!(
                "CREATE TABLE {table} (siren INTEGER, extraction_timestamp TIMESTAMP);
                 INSERT INTO {table} VALUES (1, '2024-01-01 10:00:00');
                 INSERT INTO {table} VALUES (2, '2024-02-01 09:00:00');"
            ))
            .await
            .unwrap();

        let views = templates
            .iter()
            .map(|(name, sql)| {
                let path = dir.path().join(format!("{name}.sql"));
                std::fs::write(&path, sql).unwrap();
                ViewTemplate {
                    name: (*name).to_string(),
                    path,
                }
            })
            .collect();
        let selector = WarehouseSelector::new(warehouse.clone(), table, "extraction_timestamp");
        let transformer = Transformer::new(warehouse.clone(), Some(selector), builder(), views);
        (dir, warehouse, transformer)
    }

    const LATEST_VIEW: &str = "DROP VIEW IF EXISTS `{project_id}.{dataset}.latest`;
CREATE VIEW `{project_id}.{dataset}.latest` AS
SELECT siren FROM `{project_id}.{dataset}.ratios_raw` WHERE 1=1 {timestamp_filter};";

    #[tokio::test]
    async fn test_views_filtered_to_requested_batch() {
        let (_dir, warehouse, transformer) = fixture(&[("latest", LATEST_VIEW)]).await;

        let results = transformer.transform(None).await;
        assert!(results.success());
        let rows = warehouse
            .query("SELECT siren FROM `acme.entreprises.latest`", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].first().and_then(|v| v.as_integer()), Some(2));

        assert!(transformer.transform(Some("2024-01-01T10:00:00")).await.success());
        let rows = warehouse
            .query("SELECT siren FROM `acme.entreprises.latest`", &[])
            .await
            .unwrap();
        assert_eq!(rows[0].first().and_then(|v| v.as_integer()), Some(1));
    }

    #[tokio::test]
    async fn test_view_failures_are_per_view() {
        let (_dir, _warehouse, mut transformer) =
            fixture(&[("broken", "CREATE VIEW oops AS SELEC 1;"), ("latest", LATEST_VIEW)]).await;
        transformer.views.push(ViewTemplate {
            name: "missing".to_string(),
            path: PathBuf::from("/nonexistent/missing.sql"),
        });

        let results = transformer.transform(None).await;
        assert_eq!(results.get("broken"), Some(false));
        assert_eq!(results.get("latest"), Some(true));
        assert_eq!(results.get("missing"), Some(false));
        assert!(!results.success());
    }

    #[tokio::test]
    async fn test_no_views_is_failure() {
        let (_dir, _warehouse, transformer) = fixture(&[]).await;
        assert!(!transformer.transform(None).await.success());
    }
}
