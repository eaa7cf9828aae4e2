//! `etlpipe transform`

use anyhow::Result;

use etlpipe::config::Config;
use etlpipe::pipeline::Transformer;
use etlpipe::ui;

use super::open_services;

pub async fn execute(config: &Config, timestamp: Option<&str>) -> Result<bool> {
    let services = open_services(config)?;
    let transformer = Transformer::from_config(config, services.warehouse);

    ui::print_banner("STAGE 3: TRANSFORM");
    let results = transformer.transform(timestamp).await;
    ui::print_unit_table(results.iter());
    Ok(results.success())
}
