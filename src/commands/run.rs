//! `etlpipe run`: download, load and transform in one go.

use anyhow::Result;

use etlpipe::config::Config;
use etlpipe::pipeline::{Pipeline, RunOptions, StageRunner};
use etlpipe::ui;

use super::open_services;
use crate::RunArgs;

pub async fn execute(config: &Config, args: RunArgs) -> Result<bool> {
    config.require_source(args.source.as_deref())?;

    let services = open_services(config)?;
    let pipeline = Pipeline::from_services(config, &services)?;
    let options = RunOptions {
        source: args.source,
        timestamp: args.timestamp,
        skip_download: args.skip_download,
        skip_load: args.skip_load,
    };

    ui::print_banner("ETL PIPELINE");
    let ok = StageRunner::new(pipeline).run(&options).await;
    println!("\nPipeline {}", ui::status_label(ok));
    Ok(ok)
}
