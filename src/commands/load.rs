//! `etlpipe load`

use anyhow::Result;

use etlpipe::config::Config;
use etlpipe::pipeline::{LoadCoordinator, SelectionHints};
use etlpipe::ui;

use super::open_services;

pub async fn execute(config: &Config, batch: Option<&str>, date: Option<&str>) -> Result<bool> {
    let hints = SelectionHints::parse(batch, date)?;
    let services = open_services(config)?;
    let loader = LoadCoordinator::from_config(config, services.storage, services.warehouse);

    ui::print_banner("STAGE 2: LOAD");
    let report = loader.load_batch(&hints).await?;
    match report.identity {
        Some(identity) => {
            println!("  Batch: {}", identity.sql_timestamp());
            ui::print_unit_table(report.results.iter());
        },
        None => println!("  No batch loaded"),
    }
    Ok(report.success())
}
