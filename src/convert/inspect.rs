//! Read converted artifacts back, for verification and tests.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use parquet::file::reader::{ChunkReader, FileReader};
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::record::Field as ParquetField;

use crate::error::{ConvertError, ConvertResult};
use crate::model::ExternalFormat;
use crate::types::{DataSet, DataType, Field, Schema, Value};

/// Row count and column names of one converted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub format: ExternalFormat,
    pub row_count: usize,
    pub column_names: Vec<String>,
}

/// Summarize a `.parquet` or `.json`/`.ndjson` artifact.
pub fn inspect(path: impl AsRef<Path>) -> ConvertResult<ArtifactSummary> {
    let path = path.as_ref();
    let suffix = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match ExternalFormat::from_suffix(suffix) {
        Some(ExternalFormat::Parquet) => {
            let ds = read_parquet(path)?;
            Ok(ArtifactSummary {
                format: ExternalFormat::Parquet,
                row_count: ds.row_count(),
                column_names: ds.schema.field_names().map(str::to_string).collect(),
            })
        }
        Some(ExternalFormat::NewlineDelimitedJson) => inspect_ndjson(path),
        None => Err(ConvertError::UnsupportedFormat {
            path: path.to_path_buf(),
            suffix: suffix.to_string(),
        }),
    }
}

/// Read a Parquet file into an in-memory [`DataSet`], mapping physical types onto
/// [`DataType`].
pub fn read_parquet(path: impl AsRef<Path>) -> ConvertResult<DataSet> {
    let reader = SerializedFileReader::try_from(path.as_ref())?;
    let schema = schema_of(&reader);

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for row_res in reader.into_iter() {
        let row = row_res?;
        rows.push(row.get_column_iter().map(|(_, f)| convert_parquet_field(f)).collect());
    }

    Ok(DataSet::new(schema, rows))
}

fn schema_of<R: ChunkReader + 'static>(reader: &SerializedFileReader<R>) -> Schema {
    use parquet::basic::Type as PhysicalType;

    let fields = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .map(|c| {
            let dt = match c.physical_type() {
                PhysicalType::BOOLEAN => DataType::Bool,
                PhysicalType::INT32 | PhysicalType::INT64 => DataType::Int64,
                PhysicalType::FLOAT | PhysicalType::DOUBLE => DataType::Float64,
                _ => DataType::Utf8,
            };
            Field::new(c.path().string(), dt)
        })
        .collect();
    Schema::new(fields)
}

fn convert_parquet_field(f: &ParquetField) -> Value {
    match f {
        ParquetField::Null => Value::Null,
        ParquetField::Bool(b) => Value::Bool(*b),
        ParquetField::Byte(v) => Value::Int64(i64::from(*v)),
        ParquetField::Short(v) => Value::Int64(i64::from(*v)),
        ParquetField::Int(v) => Value::Int64(i64::from(*v)),
        ParquetField::Long(v) => Value::Int64(*v),
        ParquetField::UByte(v) => Value::Int64(i64::from(*v)),
        ParquetField::UShort(v) => Value::Int64(i64::from(*v)),
        ParquetField::UInt(v) => Value::Int64(i64::from(*v)),
        ParquetField::Float(v) => Value::Float64(f64::from(*v)),
        ParquetField::Double(v) => Value::Float64(*v),
        ParquetField::Str(s) => Value::Utf8(s.clone()),
        other => Value::Utf8(other.to_string()),
    }
}

fn inspect_ndjson(path: &Path) -> ConvertResult<ArtifactSummary> {
    let reader = BufReader::new(File::open(path)?);
    let mut row_count = 0usize;
    let mut column_names: Vec<String> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(&line)?;
        if let serde_json::Value::Object(obj) = value {
            for key in obj.keys() {
                if !column_names.contains(key) {
                    column_names.push(key.clone());
                }
            }
        }
        row_count += 1;
    }
    Ok(ArtifactSummary {
        format: ExternalFormat::NewlineDelimitedJson,
        row_count,
        column_names,
    })
}
