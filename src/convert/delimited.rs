//! Delimited text (`.csv`, `.tsv`) reader.

use std::fs;
use std::path::Path;

use crate::convert::infer::{dataset_from_text, unique_column_names};
use crate::convert::DelimitedOptions;
use crate::error::ConvertResult;
use crate::types::DataSet;

/// Read a delimited text file into an in-memory [`DataSet`].
///
/// Rules:
///
/// - The first record is the header.
/// - Short records are padded with missing values; long records are truncated to the header.
/// - Empty cells are missing values.
/// - Column types are inferred from the cells.
pub fn read_delimited(path: impl AsRef<Path>, options: &DelimitedOptions) -> ConvertResult<DataSet> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let text = options.encoding.decode(&bytes, path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(options.delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());
    read_delimited_from_reader(&mut rdr)
}

/// Read delimited records from an existing CSV reader.
pub fn read_delimited_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
) -> ConvertResult<DataSet> {
    let headers = rdr.headers()?.clone();
    let names = unique_column_names(headers.iter().map(str::to_string).collect());

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row = (0..names.len())
            .map(|idx| match record.get(idx) {
                Some(raw) if !raw.trim().is_empty() => Some(raw.to_string()),
                _ => None,
            })
            .collect();
        rows.push(row);
    }

    Ok(dataset_from_text(names, rows))
}

#[cfg(test)]
mod tests {
    use super::read_delimited_from_reader;
    use crate::types::{DataType, Value};

    #[test]
    fn semicolon_records_with_ragged_rows() {
        let data = "gwb_code;naam;inwoners\nGM0014;Groningen;231299\nGM0034;Almere\n";
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_reader(data.as_bytes());
        let ds = read_delimited_from_reader(&mut rdr).unwrap();
        assert_eq!(ds.column_count(), 3);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.schema.fields[2].data_type, DataType::Int64);
        assert_eq!(ds.rows[1][2], Value::Null);
        assert_eq!(ds.rows[0][1], Value::Utf8("Groningen".to_string()));
    }
}
