//! Object storage for staged source files.
//!
//! Objects are addressed by relative keys inside one bucket. Two backends
//! ship with the crate:
//!
//! - [`FilesystemBackend`]: files under `<root>/<bucket>/`, metadata in redb
//! - [`MemoryStorageBackend`]: DashMap, for tests and dry runs
//!
//! Security features:
//! - Path traversal protection (keys cannot escape the bucket)
//! - Streaming writes become visible only once committed

mod backend;
mod filesystem;
mod memory;
mod metadata;
mod service;
mod types;
#[cfg(test)]
pub(crate) mod unavailable;
mod validation;

pub use backend::{ObjectWriter, StorageBackend};
pub use filesystem::FilesystemBackend;
pub use memory::MemoryStorageBackend;
pub use service::StorageService;
pub use types::{FileFormat, ObjectMeta};
