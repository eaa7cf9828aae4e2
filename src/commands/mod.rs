//! CLI command implementations for etlpipe.
//!
//! - [`run`] - All three stages, fail-fast
//! - [`download`] - Stage 1
//! - [`load`] - Stage 2
//! - [`transform`] - Stage 3
//! - [`inspect`] - Batch, timestamp and status listings
//! - [`validate`] - Configuration check
//!
//! Each handler returns `Ok(false)` when the work ran but did not succeed;
//! `main` turns that into exit code 1.

pub mod download;
pub mod inspect;
pub mod load;
pub mod run;
pub mod transform;
pub mod validate;

use anyhow::{Context, Result};

use etlpipe::config::Config;
use etlpipe::pipeline::Services;

/// Validates the configuration and logs its warnings.
pub fn validated(config: &Config) -> Result<()> {
    let result = config.validate()?;
    for warning in &result.warnings {
        tracing::warn!("{warning}");
    }
    Ok(())
}

/// Opens the storage and warehouse backends named in the configuration.
pub fn open_services(config: &Config) -> Result<Services> {
    Services::open(config).context("Failed to open pipeline backends")
}
