//! Decoding of staged source files into rows.
//!
//! Column names and types are detected from the file itself: parquet carries
//! its own schema, csv takes the header row and infers each cell.

use super::types::Value;
use crate::services::storage::FileFormat;
use anyhow::{Context, Result};
use bytes::Bytes;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;

/// Decoded contents of one staged file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl StagedTable {
    /// Decodes `data` according to `format`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid for the format.
    pub fn decode(format: FileFormat, data: Bytes) -> Result<Self> {
        match format {
            FileFormat::Parquet => Self::from_parquet(data),
            FileFormat::Csv => Self::from_csv(&data),
        }
    }

    /// SQL column type per column, taken from the first non-null value.
    ///
    /// Columns holding only nulls default to `TEXT`.
    pub fn column_types(&self) -> Vec<&'static str> {
        (0..self.columns.len())
            .map(|idx| {
                self.rows
                    .iter()
                    .find_map(|row| row.get(idx).and_then(Value::affinity))
                    .unwrap_or("TEXT")
            })
            .collect()
    }

    fn from_parquet(data: Bytes) -> Result<Self> {
        let reader =
            SerializedFileReader::new(data).context("Failed to read parquet file metadata")?;

        let columns: Vec<String> = reader
            .metadata()
            .file_metadata()
            .schema_descr()
            .root_schema()
            .get_fields()
            .iter()
            .map(|field| field.name().to_string())
            .collect();

        let mut rows = Vec::new();
        for row in reader
            .get_row_iter(None)
            .context("Failed to iterate parquet rows")?
        {
            let row = row.context("Failed to decode parquet row")?;
            rows.push(
                row.get_column_iter()
                    .map(|(_, field)| field_value(field))
                    .collect(),
            );
        }

        Ok(Self { columns, rows })
    }

    fn from_csv(data: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(data);

        let columns: Vec<String> = reader
            .headers()
            .context("Failed to read csv header")?
            .iter()
            .map(|name| name.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read csv record {}", line + 1))?;
            rows.push(record.iter().map(infer_cell).collect());
        }

        Ok(Self { columns, rows })
    }
}

fn field_value(field: &Field) -> Value {
    match field {
        Field::Null => Value::Null,
        Field::Bool(v) => Value::Integer(i64::from(*v)),
        Field::Byte(v) => Value::Integer(i64::from(*v)),
        Field::Short(v) => Value::Integer(i64::from(*v)),
        Field::Int(v) => Value::Integer(i64::from(*v)),
        Field::Long(v) => Value::Integer(*v),
        Field::UByte(v) => Value::Integer(i64::from(*v)),
        Field::UShort(v) => Value::Integer(i64::from(*v)),
        Field::UInt(v) => Value::Integer(i64::from(*v)),
        Field::ULong(v) => i64::try_from(*v).map_or_else(|_| Value::Text(v.to_string()), Value::Integer),
        Field::Float(v) => Value::Real(f64::from(*v)),
        Field::Double(v) => Value::Real(*v),
        Field::Str(v) => Value::Text(v.clone()),
        Field::Bytes(v) => Value::Blob(v.data().to_vec()),
        // dates, timestamps, decimals and nested values keep their display form
        other => Value::Text(other.to_string()),
    }
}

/// Integer, then float, else text. Empty cells are null.
fn infer_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = trimmed.parse::<f64>()
        && f.is_finite()
    {
        return Value::Real(f);
    }
    Value::Text(raw.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parquet::data_type::{ByteArray, ByteArrayType, Int64Type};
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::parser::parse_message_type;
    use std::sync::Arc;

    /// Two-column parquet file: `siren` (INT64) and `name` (UTF8).
    pub(crate) fn parquet_fixture(rows: &[(i64, &str)]) -> Vec<u8> {
        let schema = Arc::new(
            parse_message_type(
                "message fixture {
                    REQUIRED INT64 siren;
                    REQUIRED BINARY name (UTF8);
                }",
            )
            .unwrap(),
        );
        let props = Arc::new(WriterProperties::builder().build());
        let mut buffer = Vec::new();
        let mut writer = SerializedFileWriter::new(&mut buffer, schema, props).unwrap();
        let mut row_group = writer.next_row_group().unwrap();

        if let Some(mut col_writer) = row_group.next_column().unwrap() {
            let values: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
            col_writer
                .typed::<Int64Type>()
                .write_batch(&values, None, None)
                .unwrap();
            col_writer.close().unwrap();
        }
        if let Some(mut col_writer) = row_group.next_column().unwrap() {
            let values: Vec<ByteArray> = rows.iter().map(|(_, n)| ByteArray::from(*n)).collect();
            col_writer
                .typed::<ByteArrayType>()
                .write_batch(&values, None, None)
                .unwrap();
            col_writer.close().unwrap();
        }

        assert!(row_group.next_column().unwrap().is_none());
        row_group.close().unwrap();
        writer.close().unwrap();
        buffer
    }

    #[test]
    fn test_decode_parquet() {
        let data = parquet_fixture(&[(1, "alpha"), (2, "beta")]);
        let table = StagedTable::decode(FileFormat::Parquet, Bytes::from(data)).unwrap();

        assert_eq!(table.columns, ["siren", "name"]);
        assert_eq!(
            table.rows,
            vec![
                vec![Value::Integer(1), Value::Text("alpha".into())],
                vec![Value::Integer(2), Value::Text("beta".into())],
            ]
        );
        assert_eq!(table.column_types(), ["INTEGER", "TEXT"]);
    }

    #[test]
    fn test_decode_csv_infers_cells() {
        let data = b"id, ratio ,label,note\n1,0.5,a,\n2,1e3,b,x\n";
        let table = StagedTable::decode(FileFormat::Csv, Bytes::from_static(data)).unwrap();

        assert_eq!(table.columns, ["id", "ratio", "label", "note"]);
        assert_eq!(
            table.rows[0],
            vec![
                Value::Integer(1),
                Value::Real(0.5),
                Value::Text("a".into()),
                Value::Null
            ]
        );
        assert_eq!(table.column_types(), ["INTEGER", "REAL", "TEXT", "TEXT"]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(StagedTable::decode(FileFormat::Parquet, Bytes::from_static(b"not parquet")).is_err());
        assert!(StagedTable::decode(FileFormat::Csv, Bytes::from_static(b"a,b\n1,2,3\n")).is_err());
    }
}
