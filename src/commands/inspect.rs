//! Read-only listings: `batches`, `timestamps` and `status`.

use anyhow::{Context, Result};

use etlpipe::config::Config;
use etlpipe::pipeline::batch::parse_month_hint;
use etlpipe::pipeline::{BatchIndex, PathCodec, Probe, StatusCollector, WarehouseSelector};
use etlpipe::ui;
use etlpipe::utils::format_bytes;

use super::open_services;

/// `etlpipe batches [--month YYYY-MM]`
pub async fn batches(config: &Config, month: Option<&str>) -> Result<bool> {
    let month = month.map(parse_month_hint).transpose()?;
    let services = open_services(config)?;
    let index = BatchIndex::new(services.storage, PathCodec::new(&config.storage.raw_folder));

    let batches = match &month {
        Some(month) => index.list_month(month, None).await?,
        None => index.list(None, None).await?,
    };

    ui::print_banner("STAGED BATCHES");
    if batches.is_empty() {
        println!("  No batches found");
        return Ok(true);
    }
    for (identity, records) in batches.iter().rev() {
        let size: u64 = records.iter().map(|r| r.size).sum();
        let sources: Vec<&str> = records.iter().map(|r| r.source.as_str()).collect();
        println!(
            "  {identity}  {} file(s)  {:>10}  {}",
            records.len(),
            format_bytes(size),
            sources.join(", ")
        );
    }
    println!("  Total: {} batch(es)", batches.len());
    Ok(true)
}

/// `etlpipe timestamps`
pub async fn timestamps(config: &Config) -> Result<bool> {
    let table = config
        .reference_table()
        .context("No reference table: configure a source or warehouse.reference_table")?;
    let services = open_services(config)?;
    let selector = WarehouseSelector::new(services.warehouse, table, &config.warehouse.timestamp_column);

    let available = selector.available().await?;
    ui::print_banner("LOADED BATCH TIMESTAMPS");
    if available.is_empty() {
        println!("  No timestamps in {}", selector.table().qualified());
        return Ok(true);
    }
    for (rank, identity) in available.iter().enumerate() {
        let marker = if rank == 0 { "  (most recent)" } else { "" };
        println!("  {:>3}. {}{marker}", rank + 1, identity.iso());
    }
    Ok(true)
}

/// `etlpipe status`
pub async fn status(config: &Config) -> Result<bool> {
    let services = open_services(config)?;
    let report = StatusCollector::from_config(config, services.storage, services.warehouse)
        .collect()
        .await;

    ui::print_banner("PIPELINE STATUS");

    println!("Staged batches:");
    match &report.batches {
        Probe::Value(batches) if batches.is_empty() => println!("  none"),
        Probe::Value(batches) => {
            if let Some(latest) = batches.first() {
                println!("  latest: {} ({} file(s))", latest.identity, latest.files);
            }
            println!("  total:  {}", batches.len());
        },
        Probe::Failed(reason) => println!("  unavailable: {reason}"),
    }

    println!("\nStaged objects per source:");
    match &report.objects {
        Probe::Value(objects) => ui::print_key_values(
            &objects
                .iter()
                .map(|(source, count)| (source.as_str(), count.to_string()))
                .collect::<Vec<_>>(),
        ),
        Probe::Failed(reason) => println!("  unavailable: {reason}"),
    }

    println!("\nWarehouse rows per table:");
    let rows: Vec<(&str, String)> = report
        .tables
        .iter()
        .map(|status| {
            let value = match &status.rows {
                Probe::Value(rows) => rows.to_string(),
                Probe::Failed(reason) => format!("unavailable ({reason})"),
            };
            (status.table.table.as_str(), value)
        })
        .collect();
    ui::print_key_values(&rows);

    if !report.views.is_empty() {
        println!("\nRows per view:");
        let rows: Vec<(&str, String)> = report
            .views
            .iter()
            .map(|status| {
                let value = match &status.rows {
                    Probe::Value(rows) => rows.to_string(),
                    Probe::Failed(reason) => format!("unavailable ({reason})"),
                };
                (status.name.as_str(), value)
            })
            .collect();
        ui::print_key_values(&rows);
    }

    println!("\nLoaded batch timestamps:");
    match &report.timestamps {
        Probe::Value(timestamps) if timestamps.is_empty() => println!("  none"),
        Probe::Value(timestamps) => {
            for identity in timestamps {
                println!("  {}", identity.iso());
            }
        },
        Probe::Failed(reason) => println!("  unavailable: {reason}"),
    }
    Ok(true)
}
