//! Shared constants and defaults.

/// Configuration file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "etlpipe.toml";

/// Folder under the bucket where raw downloads are staged.
pub const DEFAULT_RAW_FOLDER: &str = "raw_data";

/// Separator between the source name and the batch key in object names.
pub const PATH_FIELD_SEPARATOR: &str = "__";

/// `strftime` layout of a batch key (`YYYY-MM-DD_HH-MM-SS`).
pub const BATCH_KEY_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Length of a rendered batch key.
pub const BATCH_KEY_LEN: usize = 19;

/// Upload chunk size for streamed downloads, in MiB.
pub const DEFAULT_CHUNK_SIZE_MB: usize = 32;

/// Download progress is logged every time this many bytes have been uploaded.
pub const PROGRESS_LOG_INTERVAL_BYTES: u64 = 50 * 1024 * 1024;

/// Timeout applied to each source download.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// HTTP connect timeout for source downloads.
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Stamp column holding the batch timestamp.
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "extraction_timestamp";

/// Stamp column holding the batch date.
pub const DEFAULT_DATE_COLUMN: &str = "extraction_date";

/// Raw table naming pattern; `{source}` is replaced by the source name.
pub const DEFAULT_RAW_TABLE_PATTERN: &str = "{source}_raw";

/// Placeholder substituted by the source name in table patterns.
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// View template placeholders.
pub const PROJECT_PLACEHOLDER: &str = "{project_id}";
pub const DATASET_PLACEHOLDER: &str = "{dataset}";
pub const FILTER_PLACEHOLDER: &str = "{timestamp_filter}";

/// Default log filter when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Number of available timestamps echoed when a requested one is missing.
pub const TIMESTAMP_HINT_LIMIT: usize = 10;
