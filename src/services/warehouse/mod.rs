//! Warehouse access: schema probes, append-loads from staged objects and
//! ad-hoc SQL.
//!
//! [`SqliteWarehouse`] is the shipped backend, file-based or in-memory.

mod backend;
mod service;
mod sqlite;
mod staged;
mod types;

pub use backend::WarehouseBackend;
pub use service::WarehouseService;
pub use sqlite::SqliteWarehouse;
pub use staged::StagedTable;
pub use types::{ColumnType, Row, TableRef, Value};
