//! Types and constants for the storage service.

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Table for object metadata storage
pub(crate) const OBJECTS_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("objects");

/// Metadata for a stored object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object key (e.g., "raw_data/2024-01/ratios__2024-01-31_10-00-00.parquet")
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// MIME content type (e.g., "text/csv")
    pub content_type: String,
    /// Timestamp when object was created
    pub created_at: DateTime<Utc>,
    /// Timestamp when object was last modified
    pub modified_at: DateTime<Utc>,
}

impl ObjectMeta {
    /// Directory markers are zero-length keys ending in `/`.
    pub fn is_directory_marker(&self) -> bool {
        self.size == 0 && self.path.ends_with('/')
    }
}

/// File formats accepted for staged source files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Parquet,
    Csv,
}

impl FileFormat {
    /// Every accepted format, in inference priority order.
    pub const ALL: [Self; 2] = [Self::Parquet, Self::Csv];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }

    /// Exact, lowercase extension lookup.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Parquet => "application/vnd.apache.parquet",
            Self::Csv => "text/csv",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
