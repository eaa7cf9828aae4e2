//! Object path encoding of batch identities.
//!
//! Layout: `<raw-prefix>/<YYYY>-<MM>/<source>__<YYYY>-<MM>-<DD>_<HH>-<MM>-<SS>.<ext>`
//!
//! Stage 1 writes through [`PathCodec::encode`]; stages 2 and 3 rediscover
//! batches through [`PathCodec::decode`].

use crate::constants::PATH_FIELD_SEPARATOR;
use crate::error::{Error, Result};
use crate::pipeline::batch::BatchIdentity;
use crate::services::storage::FileFormat;

/// A storage path split back into its batch fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPath {
    pub source: String,
    pub identity: BatchIdentity,
    pub format: FileFormat,
}

/// Encodes and decodes batch-stamped object paths under a raw prefix.
#[derive(Debug, Clone)]
pub struct PathCodec {
    raw_prefix: String,
}

impl PathCodec {
    /// Creates a codec rooted at `raw_prefix` (e.g. `raw_data`).
    pub fn new(raw_prefix: impl Into<String>) -> Self {
        let raw_prefix = raw_prefix.into().trim_matches('/').to_string();
        Self { raw_prefix }
    }

    /// Prefix covering every staged object, with trailing separator.
    pub fn root_prefix(&self) -> String {
        format!("{}/", self.raw_prefix)
    }

    /// Prefix covering one year-month partition, with trailing separator.
    pub fn month_prefix(&self, year_month: &str) -> String {
        format!("{}/{year_month}/", self.raw_prefix)
    }

    /// Builds the object path for one source in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSourceName`] if the name could not be decoded
    /// back unambiguously.
    pub fn encode(
        &self,
        source: &str,
        identity: BatchIdentity,
        format: FileFormat,
    ) -> Result<String> {
        validate_source_name(source)?;
        Ok(format!(
            "{prefix}/{month}/{source}{sep}{key}.{ext}",
            prefix = self.raw_prefix,
            month = identity.year_month(),
            sep = PATH_FIELD_SEPARATOR,
            key = identity.key(),
            ext = format.extension(),
        ))
    }

    /// Recovers the batch fields from an object path.
    ///
    /// Returns `None` for anything that does not follow the layout, including
    /// paths whose partition disagrees with the embedded date. Unrelated
    /// objects under the same prefix are expected, so this is not an error.
    pub fn decode(&self, path: &str) -> Option<DecodedPath> {
        let (dir, file) = path.rsplit_once('/')?;
        let partition = match dir.rsplit_once('/') {
            Some((parent, partition)) if !parent.is_empty() => partition,
            _ => return None,
        };

        let (stem, ext) = file.rsplit_once('.')?;
        let format = FileFormat::from_extension(ext)?;

        let (source, key) = stem.rsplit_once(PATH_FIELD_SEPARATOR)?;
        if validate_source_name(source).is_err() {
            return None;
        }
        let identity = BatchIdentity::parse_key(key)?;

        if identity.year_month() != partition {
            return None;
        }

        Some(DecodedPath {
            source: source.to_string(),
            identity,
            format,
        })
    }
}

/// Picks the staged format from a source URL.
///
/// Substring match, `parquet` first; anything ambiguous defaults to parquet.
pub fn infer_format(url: &str) -> FileFormat {
    let url = url.to_ascii_lowercase();
    FileFormat::ALL
        .into_iter()
        .find(|format| url.contains(format.extension()))
        .unwrap_or(FileFormat::Parquet)
}

/// Checks that a source name survives a round trip through an object path.
///
/// # Errors
///
/// Returns [`Error::InvalidSourceName`] for empty names, names containing the
/// field separator or a path separator, and names shaped like a date.
pub fn validate_source_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_source_name(name, "name cannot be empty"));
    }
    if name.contains(PATH_FIELD_SEPARATOR) {
        return Err(Error::invalid_source_name(
            name,
            format!("name cannot contain '{PATH_FIELD_SEPARATOR}'"),
        ));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(Error::invalid_source_name(
            name,
            "name cannot contain path separators",
        ));
    }
    if looks_like_date(name) {
        return Err(Error::invalid_source_name(
            name,
            "name cannot look like a date component",
        ));
    }
    Ok(())
}

/// `YYYY-MM` or `YYYY-MM-DD` shaped names would be mistaken for partitions.
fn looks_like_date(name: &str) -> bool {
    let shape = |pattern: &str| {
        name.len() == pattern.len()
            && name.chars().zip(pattern.chars()).all(|(c, p)| match p {
                'd' => c.is_ascii_digit(),
                _ => c == p,
            })
    };
    shape("dddd-dd") || shape("dddd-dd-dd")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn id(key: &str) -> BatchIdentity {
        BatchIdentity::parse_key(key).unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let codec = PathCodec::new("raw_data");
        let path = codec
            .encode("ratios_inpi", id("2025-12-03_14-30-15"), FileFormat::Parquet)
            .unwrap();
        assert_eq!(path, "raw_data/2025-12/ratios_inpi__2025-12-03_14-30-15.parquet");
    }

    #[test]
    fn test_prefix_trailing_slash_normalized() {
        let codec = PathCodec::new("raw_data/");
        assert_eq!(codec.root_prefix(), "raw_data/");
        assert_eq!(codec.month_prefix("2024-01"), "raw_data/2024-01/");
    }

    #[test]
    fn test_decode_valid_path() {
        let codec = PathCodec::new("raw_data");
        let decoded = codec
            .decode("raw_data/2024-01/stock_entreprises__2024-01-31_23-59-59.csv")
            .unwrap();
        assert_eq!(decoded.source, "stock_entreprises");
        assert_eq!(decoded.identity, id("2024-01-31_23-59-59"));
        assert_eq!(decoded.format, FileFormat::Csv);
    }

    #[test]
    fn test_decode_rejects_mismatched_partition() {
        let codec = PathCodec::new("raw_data");
        assert!(
            codec
                .decode("raw_data/2024-02/ratios__2024-01-31_10-00-00.parquet")
                .is_none()
        );
    }

    #[test]
    fn test_decode_rejects_malformed_names() {
        let codec = PathCodec::new("raw_data");
        for path in [
            "raw_data/2024-01/ratios__2024-01-31_10-00-00",
            "raw_data/2024-01/ratios__2024-01-31_10-00-00.json",
            "raw_data/2024-01/ratios__2024-01-31.parquet",
            "raw_data/2024-01/ratios_2024-01-31_10-00-00.parquet",
            "raw_data/2024-01/__2024-01-31_10-00-00.parquet",
            "raw_data/2024-01/a__b__2024-01-31_10-00-00.parquet",
            "raw_data/2024-01/ratios__2024-01-32_10-00-00.parquet",
            "2024-01/ratios__2024-01-31_10-00-00.parquet",
            "ratios__2024-01-31_10-00-00.parquet",
            "raw_data/2024-01/",
            "raw_data/readme.txt",
        ] {
            assert!(codec.decode(path).is_none(), "{path}");
        }
    }

    #[test]
    fn test_encode_rejects_ambiguous_source_names() {
        let codec = PathCodec::new("raw_data");
        let batch = id("2024-01-01_00-00-00");
        for name in ["", "a__b", "a/b", "2024-01", "2024-01-01"] {
            let err = codec.encode(name, batch, FileFormat::Csv).unwrap_err();
            assert!(err.is_configuration(), "{name}");
        }
        assert!(codec.encode("ratios_2024", batch, FileFormat::Csv).is_ok());
    }

    #[test]
    fn test_infer_format() {
        assert_eq!(infer_format("https://x.org/data.parquet"), FileFormat::Parquet);
        assert_eq!(infer_format("https://x.org/export?format=CSV"), FileFormat::Csv);
        assert_eq!(infer_format("https://x.org/api/download"), FileFormat::Parquet);
        // both present: parquet wins
        assert_eq!(infer_format("https://x.org/csv/file.parquet"), FileFormat::Parquet);
    }

    fn arb_source() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,20}[a-z0-9]".prop_filter("no separator", |s| !s.contains("__"))
    }

    fn arb_identity() -> impl Strategy<Value = BatchIdentity> {
        (2000i32..2100, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60).prop_map(
            |(y, mo, d, h, mi, s)| {
                BatchIdentity::from_datetime(
                    NaiveDate::from_ymd_opt(y, mo, d)
                        .unwrap()
                        .and_hms_opt(h, mi, s)
                        .unwrap(),
                )
            },
        )
    }

    proptest! {
        #[test]
        fn prop_encode_decode_round_trip(
            source in arb_source(),
            identity in arb_identity(),
            csv in any::<bool>(),
        ) {
            let format = if csv { FileFormat::Csv } else { FileFormat::Parquet };
            let codec = PathCodec::new("raw_data");
            let path = codec.encode(&source, identity, format).unwrap();
            let decoded = codec.decode(&path).unwrap();
            prop_assert_eq!(decoded, DecodedPath { source, identity, format });
        }
    }
}
