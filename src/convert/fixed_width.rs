//! Fixed-width text reader.

use std::fs;
use std::path::Path;

use crate::convert::infer::{dataset_from_text, unique_column_names};
use crate::convert::FixedWidthOptions;
use crate::error::{ConvertError, ConvertResult};
use crate::types::DataSet;

/// Read a fixed-width text file.
///
/// Columns are sliced by character count in declaration order. Cells are trimmed; blank cells
/// and the tail of short lines are missing values. Blank lines are ignored.
pub fn read_fixed_width(
    path: impl AsRef<Path>,
    options: &FixedWidthOptions,
) -> ConvertResult<DataSet> {
    let path = path.as_ref();
    validate_columns(options)?;
    let bytes = fs::read(path)?;
    let text = options.encoding.decode(&bytes, path)?;
    Ok(parse_fixed_width(&text, options))
}

pub(crate) fn parse_fixed_width(text: &str, options: &FixedWidthOptions) -> DataSet {
    let names = unique_column_names(options.columns.iter().map(|c| c.name.clone()).collect());

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for line in text.lines().skip(options.skip_lines) {
        if line.trim().is_empty() {
            continue;
        }
        let chars: Vec<char> = line.chars().collect();
        let mut pos = 0usize;
        let mut row = Vec::with_capacity(options.columns.len());
        for col in &options.columns {
            let start = pos.min(chars.len());
            let end = (pos + col.width).min(chars.len());
            let cell: String = chars[start..end].iter().collect();
            let cell = cell.trim();
            row.push(if cell.is_empty() {
                None
            } else {
                Some(cell.to_string())
            });
            pos += col.width;
        }
        rows.push(row);
    }

    dataset_from_text(names, rows)
}

fn validate_columns(options: &FixedWidthOptions) -> ConvertResult<()> {
    if options.columns.is_empty() {
        return Err(ConvertError::FixedWidth {
            line: 0,
            message: "no columns specified".to_string(),
        });
    }
    if let Some(col) = options.columns.iter().find(|c| c.width == 0) {
        return Err(ConvertError::FixedWidth {
            line: 0,
            message: format!("column '{}' has zero width", col.name),
        });
    }
    Ok(())
}
