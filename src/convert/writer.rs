//! Parquet and NDJSON writers.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use parquet::basic::{ConvertedType, Repetition, Type as PhysicalType};
use parquet::column::writer::ColumnWriter;
use parquet::data_type::ByteArray;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::Type as ParquetType;

use crate::error::ConvertResult;
use crate::types::{DataSet, DataType, Schema, Value};

/// Write `dataset` as a single-row-group Parquet file.
///
/// Every column is `OPTIONAL`; [`Value::Null`] cells become nulls.
pub fn write_parquet(dataset: &DataSet, path: impl AsRef<Path>) -> ConvertResult<()> {
    let schema = Arc::new(parquet_schema(&dataset.schema)?);
    let props = Arc::new(WriterProperties::builder().build());
    let file = File::create(path)?;
    let mut writer = SerializedFileWriter::new(file, schema, props)?;

    let mut row_group = writer.next_row_group()?;
    let mut col_idx = 0usize;
    while let Some(mut col) = row_group.next_column()? {
        match col.untyped() {
            ColumnWriter::Int64ColumnWriter(w) => {
                let (values, levels) = column_levels(dataset, col_idx, |v| match v {
                    Value::Int64(x) => Some(*x),
                    _ => None,
                });
                w.write_batch(&values, Some(&levels), None)?;
            }
            ColumnWriter::DoubleColumnWriter(w) => {
                let (values, levels) = column_levels(dataset, col_idx, |v| match v {
                    Value::Float64(x) => Some(*x),
                    _ => None,
                });
                w.write_batch(&values, Some(&levels), None)?;
            }
            ColumnWriter::BoolColumnWriter(w) => {
                let (values, levels) = column_levels(dataset, col_idx, |v| match v {
                    Value::Bool(x) => Some(*x),
                    _ => None,
                });
                w.write_batch(&values, Some(&levels), None)?;
            }
            ColumnWriter::ByteArrayColumnWriter(w) => {
                let (values, levels) = column_levels(dataset, col_idx, |v| match v {
                    Value::Utf8(s) => Some(ByteArray::from(s.as_str())),
                    _ => None,
                });
                w.write_batch(&values, Some(&levels), None)?;
            }
            _ => {
                return Err(ParquetError::General(format!(
                    "unexpected column writer for column {col_idx}"
                ))
                .into());
            }
        }
        col.close()?;
        col_idx += 1;
    }
    row_group.close()?;
    writer.close()?;
    Ok(())
}

/// Write `dataset` as newline-delimited JSON objects, one per row.
pub fn write_ndjson(dataset: &DataSet, path: impl AsRef<Path>) -> ConvertResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for row in &dataset.rows {
        let mut obj = serde_json::Map::with_capacity(dataset.column_count());
        for (idx, field) in dataset.schema.fields.iter().enumerate() {
            let value = row.get(idx).unwrap_or(&Value::Null);
            obj.insert(field.name.clone(), value.to_json());
        }
        serde_json::to_writer(&mut out, &serde_json::Value::Object(obj))?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn parquet_schema(schema: &Schema) -> ConvertResult<ParquetType> {
    let mut fields = Vec::with_capacity(schema.len());
    for f in &schema.fields {
        let builder = match f.data_type {
            DataType::Int64 => ParquetType::primitive_type_builder(&f.name, PhysicalType::INT64),
            DataType::Float64 => ParquetType::primitive_type_builder(&f.name, PhysicalType::DOUBLE),
            DataType::Bool => ParquetType::primitive_type_builder(&f.name, PhysicalType::BOOLEAN),
            DataType::Utf8 => ParquetType::primitive_type_builder(&f.name, PhysicalType::BYTE_ARRAY)
                .with_converted_type(ConvertedType::UTF8),
        };
        fields.push(Arc::new(builder.with_repetition(Repetition::OPTIONAL).build()?));
    }
    Ok(ParquetType::group_type_builder("schema")
        .with_fields(fields)
        .build()?)
}

// Non-null values plus one definition level per row (1 = present, 0 = null).
fn column_levels<T>(
    dataset: &DataSet,
    idx: usize,
    extract: impl Fn(&Value) -> Option<T>,
) -> (Vec<T>, Vec<i16>) {
    let mut values = Vec::with_capacity(dataset.row_count());
    let mut levels = Vec::with_capacity(dataset.row_count());
    for v in dataset.column(idx) {
        match extract(v) {
            Some(x) => {
                values.push(x);
                levels.push(1);
            }
            None => levels.push(0),
        }
    }
    (values, levels)
}
