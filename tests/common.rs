//! Shared fixtures for integration tests.
//!
//! - [`SourceServer`] serves in-memory files over HTTP on a random port.
//! - [`write_config`] writes an `etlpipe.toml` plus view templates into a
//!   temporary directory, using the in-memory storage and warehouse.

#![allow(dead_code)]

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

use etlpipe::config::Config;

pub const RATIOS_CSV: &str = "siren,name,ratio\n1,alpha,0.5\n2,beta,1.5\n3,gamma,2.5\n";
pub const STOCK_CSV: &str = "siren,employees\n1,10\n2,20\n";

/// View over the ratios raw table, filtered to one batch.
pub const RATIOS_VIEW: &str = "DROP VIEW IF EXISTS `{project_id}.{dataset}.ratios_latest`;
CREATE VIEW `{project_id}.{dataset}.ratios_latest` AS
SELECT siren, name, ratio, extraction_timestamp, extraction_date
FROM `{project_id}.{dataset}.ratios_raw`
WHERE 1=1 {timestamp_filter};
";

type Files = Arc<HashMap<String, Vec<u8>>>;

async fn serve_file(State(files): State<Files>, Path(name): Path<String>) -> Response {
    match files.get(&name) {
        Some(body) => (StatusCode::OK, body.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Local HTTP server standing in for the remote data portal.
pub struct SourceServer {
    base_url: String,
    handle: JoinHandle<()>,
}

impl SourceServer {
    pub async fn start(files: &[(&str, &[u8])]) -> Self {
        let files: Files = Arc::new(
            files
                .iter()
                .map(|(name, body)| ((*name).to_string(), body.to_vec()))
                .collect(),
        );
        let router = Router::new()
            .route("/files/{name}", get(serve_file))
            .with_state(files);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind source server");
        let addr = listener.local_addr().expect("No local address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        Self {
            base_url: format!("http://{addr}"),
            handle,
        }
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}/files/{name}", self.base_url)
    }
}

impl Drop for SourceServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Writes a memory-backed configuration with one view and loads it.
///
/// `sources` are `(name, url)` pairs, all active.
pub fn write_config(dir: &std::path::Path, sources: &[(&str, String)]) -> Config {
    let views = dir.join("sql").join("views");
    std::fs::create_dir_all(&views).expect("Failed to create view dir");
    std::fs::write(views.join("ratios_latest.sql"), RATIOS_VIEW).expect("Failed to write view");

    let mut toml = String::from(
        r#"
[project]
id = "acme"
region = "EU"

[storage]
backend = "memory"
bucket = "acme-landing"

[warehouse]
backend = "memory"
dataset = "entreprises"

[[views]]
name = "ratios_latest"
sql = "sql/views/ratios_latest.sql"
"#,
    );
    for (name, url) in sources {
        toml.push_str(&format!("\n[[sources]]\nname = \"{name}\"\nurl = \"{url}\"\n"));
    }

    let path = dir.join("etlpipe.toml");
    std::fs::write(&path, toml).expect("Failed to write config");
    let config = Config::load_from(&path).expect("Failed to load config");
    config.validate().expect("Config should be valid");
    config
}
