//! `etlpipe download`

use anyhow::Result;

use etlpipe::config::Config;
use etlpipe::pipeline::Downloader;
use etlpipe::ui;

use super::open_services;

pub async fn execute(config: &Config, source: Option<&str>) -> Result<bool> {
    config.require_source(source)?;

    let services = open_services(config)?;
    let downloader = Downloader::from_config(config, services.storage)?;

    ui::print_banner("STAGE 1: DOWNLOAD");
    let results = downloader.download(source).await;
    if results.is_empty() {
        println!("  Nothing downloaded");
    } else {
        ui::print_unit_table(results.iter());
    }
    Ok(results.success())
}
