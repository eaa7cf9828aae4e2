//! etlpipe: a three-stage batch ETL pipeline.
//!
//! Stage 1 streams remote datasets into object storage under batch-stamped
//! paths, stage 2 appends one batch into per-source warehouse tables and
//! stamps the loaded rows, stage 3 rebuilds analytical views filtered to a
//! single batch.
//!
//! The batch identity (the execution timestamp captured at stage 1) is the
//! thread that ties the stages together:
//!
//! - [`pipeline::path_codec`] encodes it into object paths and recovers it.
//! - [`pipeline::index`] groups stored objects by identity.
//! - [`pipeline::selector`] picks one identity from hints.
//! - [`pipeline::load`] stamps warehouse rows with it.
//! - [`pipeline::views`] filters views down to it.
//! - [`pipeline::runner`] sequences the stages.

pub mod config;
pub mod constants;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod ui;
pub mod utils;

pub use error::{PipelineError, Result};
