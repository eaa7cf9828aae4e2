//! The three pipeline stages and the batch-identity plumbing between them.

pub mod batch;
pub mod download;
pub mod index;
pub mod load;
pub mod path_codec;
pub mod report;
pub mod runner;
pub mod selector;
pub mod status;
pub mod views;

pub use batch::BatchIdentity;
pub use download::Downloader;
pub use index::{BatchIndex, BatchMap, StorageObjectRecord};
pub use load::{DatasetTarget, LoadCoordinator, LoadReport, StampColumns};
pub use path_codec::{DecodedPath, PathCodec};
pub use report::UnitResults;
pub use runner::{Pipeline, RunOptions, Services, StageRunner, Stages};
pub use selector::{BatchSelector, SelectionHints, WarehouseSelector};
pub use status::{Probe, StatusCollector, StatusReport};
pub use views::{Transformer, ViewFilterBuilder, ViewTemplate};
