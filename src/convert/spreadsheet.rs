#![cfg(feature = "excel")]
//! Spreadsheet (`.xls`, `.xlsx`, `.ods`, ...) reader.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::convert::infer::{dataset_from_values, unique_column_names};
use crate::convert::{SheetSelection, SpreadsheetOptions};
use crate::error::{ConvertError, ConvertResult};
use crate::types::{DataSet, Value};

/// Read one worksheet into an in-memory [`DataSet`].
///
/// Behavior:
/// - Picks the configured sheet, or the first sheet in workbook order
/// - Drops the rows listed in `skip_rows` (zero-based, counted on the raw sheet)
/// - Uses the first remaining non-empty row as the header row
/// - Treats cells equal to one of `na_values` as missing
/// - Drops fully empty body rows
pub fn read_spreadsheet(
    path: impl AsRef<Path>,
    options: &SpreadsheetOptions,
) -> ConvertResult<DataSet> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)?;

    let sheet = match &options.sheet {
        SheetSelection::First => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ConvertError::EmptySource {
                path: path.to_path_buf(),
            })?,
        SheetSelection::Sheet(name) => name.clone(),
    };
    let range = workbook.worksheet_range(&sheet)?;
    read_range(&range, options, path)
}

fn read_range(
    range: &Range<Data>,
    options: &SpreadsheetOptions,
    path: &Path,
) -> ConvertResult<DataSet> {
    // calamine trims leading empty rows; `skip_rows` counts from the sheet's first row.
    let offset = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows = range
        .rows()
        .enumerate()
        .filter(|(idx, _)| !options.skip_rows.contains(&(idx + offset)))
        .map(|(_, row)| row)
        .filter(|row| row.iter().any(|c| !is_missing(c, &options.na_values)));

    let header = rows.next().ok_or_else(|| ConvertError::EmptySource {
        path: path.to_path_buf(),
    })?;
    let names = unique_column_names(header.iter().map(cell_to_header_string).collect());

    let body: Vec<Vec<Value>> = rows
        .map(|row| {
            (0..names.len())
                .map(|idx| convert_cell(row.get(idx).unwrap_or(&Data::Empty), &options.na_values))
                .collect()
        })
        .collect();

    Ok(dataset_from_values(names, body))
}

fn is_missing(c: &Data, na_values: &[String]) -> bool {
    match c {
        Data::Empty | Data::Error(_) => true,
        Data::String(s) => s.trim().is_empty() || na_values.iter().any(|na| na == s),
        _ => false,
    }
}

fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(f) => f.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

fn convert_cell(c: &Data, na_values: &[String]) -> Value {
    if is_missing(c, na_values) {
        return Value::Null;
    }
    match c {
        Data::String(s) => Value::Utf8(s.clone()),
        Data::Int(i) => Value::Int64(*i),
        Data::Float(f) => Value::Float64(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(_) => Value::Utf8(c.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Utf8(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}
