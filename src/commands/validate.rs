//! `etlpipe validate`

use anyhow::Result;

use etlpipe::config::Config;
use etlpipe::ui;

pub fn execute(config: &Config) -> Result<bool> {
    let result = config.validate()?;

    ui::print_banner("Configuration OK");
    let active = config.sources.iter().filter(|s| s.active).count();
    ui::print_key_values(&[
        ("project", config.project.id.clone()),
        ("region", config.project.region.clone()),
        ("bucket", config.storage.bucket.clone()),
        ("dataset", config.warehouse.dataset.clone()),
        ("sources", format!("{active} active / {} configured", config.sources.len())),
        ("views", config.views.len().to_string()),
    ]);

    if result.has_warnings() {
        println!("\nWarnings:");
        for warning in &result.warnings {
            println!("  - {warning}");
        }
    }
    Ok(true)
}
