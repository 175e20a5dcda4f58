//! Source-format conversion.
//!
//! Most callers should use [`convert`], which:
//!
//! - detects the source format from the input suffix
//! - checks that the supplied [`FormatOptions`] belong to that format
//! - reads the input into an in-memory [`crate::types::DataSet`] with inferred column types
//! - writes one Parquet file (or, for fixed-width input on request, one NDJSON file)
//! - removes the source file
//!
//! Format-specific readers live in [`delimited`], [`spreadsheet`] (feature `excel`) and
//! [`fixed_width`]. [`ConversionPlan`] pairs a list of inputs with typed options and converts
//! them on the rayon pool.

pub mod archive;
pub mod delimited;
pub mod fixed_width;
mod infer;
pub mod inspect;
#[cfg(feature = "excel")]
pub mod spreadsheet;
pub mod writer;

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConvertError, ConvertResult};
use crate::types::DataSet;

pub use archive::{extract_archive, is_archive};
pub use inspect::{inspect, ArtifactSummary};

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFormat {
    /// Delimited text (`.csv`, `.tsv`).
    DelimitedText,
    /// Spreadsheet/workbook (`.xls`, `.xlsx`, `.xlsm`, `.xlsb`, `.ods`).
    Spreadsheet,
    /// Fixed-width text (`.txt`, `.dat`, `.fwf`).
    FixedWidth,
}

impl SourceFormat {
    /// Parse a source format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "tsv" => Some(Self::DelimitedText),
            "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => Some(Self::Spreadsheet),
            "txt" | "dat" | "fwf" => Some(Self::FixedWidth),
            _ => None,
        }
    }

    /// Detect the format of `path`, failing with [`ConvertError::UnsupportedFormat`].
    pub fn from_path(path: &Path) -> ConvertResult<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        Self::from_extension(ext).ok_or_else(|| ConvertError::UnsupportedFormat {
            path: path.to_path_buf(),
            suffix: ext.to_string(),
        })
    }
}

/// Character encoding of a text source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte is the code point of the same value.
    Latin1,
}

impl TextEncoding {
    /// Decode raw bytes. A leading UTF-8 byte-order mark is dropped.
    pub fn decode(&self, bytes: &[u8], path: &Path) -> ConvertResult<String> {
        match self {
            TextEncoding::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                String::from_utf8(bytes.to_vec()).map_err(|e| ConvertError::Encoding {
                    path: path.to_path_buf(),
                    encoding: self.to_string(),
                    message: e.to_string(),
                })
            }
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => f.write_str("utf-8"),
            TextEncoding::Latin1 => f.write_str("iso-8859-1"),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "iso-8859-1" | "iso8859-1" | "8859" | "latin1" | "latin-1" => Ok(Self::Latin1),
            _ => Err(ConvertError::UnknownEncoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for TextEncoding {
    type Error = ConvertError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TextEncoding> for String {
    fn from(e: TextEncoding) -> Self {
        e.to_string()
    }
}

/// Options for delimited text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelimitedOptions {
    /// Single-byte field delimiter.
    pub delimiter: u8,
    pub encoding: TextEncoding,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            encoding: TextEncoding::Utf8,
        }
    }
}

/// Which worksheet to convert.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SheetSelection {
    /// The first sheet in workbook order.
    #[default]
    First,
    /// A single named sheet.
    Sheet(String),
}

/// Options for spreadsheets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadsheetOptions {
    pub sheet: SheetSelection,
    /// Zero-based row indices dropped before the header row is located.
    pub skip_rows: Vec<usize>,
    /// Cell strings treated as missing values (exact match).
    pub na_values: Vec<String>,
}

/// One fixed-width column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedWidthColumn {
    pub name: String,
    /// Width in characters.
    pub width: usize,
}

impl FixedWidthColumn {
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }
}

/// Output kind for fixed-width conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordOutput {
    /// Columnar table.
    #[default]
    Parquet,
    /// Newline-delimited JSON records.
    NdJson,
}

impl RecordOutput {
    pub fn suffix(&self) -> &'static str {
        match self {
            RecordOutput::Parquet => "parquet",
            RecordOutput::NdJson => "json",
        }
    }
}

/// Options for fixed-width text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedWidthOptions {
    pub columns: Vec<FixedWidthColumn>,
    /// Leading lines (headers, banners) to ignore.
    #[serde(default)]
    pub skip_lines: usize,
    #[serde(default)]
    pub encoding: TextEncoding,
    #[serde(default)]
    pub output: RecordOutput,
}

impl FixedWidthOptions {
    pub fn new(columns: Vec<FixedWidthColumn>) -> Self {
        Self {
            columns,
            skip_lines: 0,
            encoding: TextEncoding::Utf8,
            output: RecordOutput::Parquet,
        }
    }
}

/// Typed per-format options for one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatOptions {
    Delimited(DelimitedOptions),
    Spreadsheet(SpreadsheetOptions),
    FixedWidth(FixedWidthOptions),
}

impl FormatOptions {
    /// The source format these options apply to.
    pub fn format(&self) -> SourceFormat {
        match self {
            FormatOptions::Delimited(_) => SourceFormat::DelimitedText,
            FormatOptions::Spreadsheet(_) => SourceFormat::Spreadsheet,
            FormatOptions::FixedWidth(_) => SourceFormat::FixedWidth,
        }
    }

    /// Suffix of the converted file.
    pub fn output_suffix(&self) -> &'static str {
        match self {
            FormatOptions::FixedWidth(o) => o.output.suffix(),
            _ => RecordOutput::Parquet.suffix(),
        }
    }

    /// Default options for `format`. Fixed-width input has no default: column widths must be
    /// supplied.
    pub fn default_for(format: SourceFormat) -> Option<Self> {
        match format {
            SourceFormat::DelimitedText => Some(Self::Delimited(DelimitedOptions::default())),
            SourceFormat::Spreadsheet => Some(Self::Spreadsheet(SpreadsheetOptions::default())),
            SourceFormat::FixedWidth => None,
        }
    }

    /// Default options for the format detected from `path`.
    ///
    /// Fails with [`ConvertError::MissingOptions`] when that format has no defaults.
    pub fn for_path(path: &Path) -> ConvertResult<Self> {
        let format = SourceFormat::from_path(path)?;
        Self::default_for(format).ok_or_else(|| ConvertError::MissingOptions {
            path: path.to_path_buf(),
            format,
        })
    }

    fn check_matches(&self, path: &Path) -> ConvertResult<SourceFormat> {
        let detected = SourceFormat::from_path(path)?;
        if detected != self.format() {
            return Err(ConvertError::OptionsMismatch {
                path: path.to_path_buf(),
                expected: detected,
                got: self.format(),
            });
        }
        Ok(detected)
    }
}

/// Output path for `input` converted with `options`, placed in `out_dir`.
pub fn output_path_for(input: &Path, options: &FormatOptions, out_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    out_dir.join(format!("{stem}.{}", options.output_suffix()))
}

/// Read `input` into memory according to its format.
pub fn read_source(input: &Path, options: &FormatOptions) -> ConvertResult<DataSet> {
    options.check_matches(input)?;
    match options {
        FormatOptions::Delimited(o) => delimited::read_delimited(input, o),
        FormatOptions::Spreadsheet(o) => read_spreadsheet_dispatch(input, o),
        FormatOptions::FixedWidth(o) => fixed_width::read_fixed_width(input, o),
    }
}

/// Convert one source file into one output file and remove the source.
///
/// Fails with [`ConvertError::UnsupportedFormat`] for unknown suffixes and
/// [`ConvertError::OptionsMismatch`] when `options` belong to another format. The source is
/// only removed after the output has been written.
///
/// ```no_run
/// use open_data_sync::convert::{convert, DelimitedOptions, FormatOptions, TextEncoding};
///
/// # fn main() -> Result<(), open_data_sync::error::ConvertError> {
/// let options = FormatOptions::Delimited(DelimitedOptions {
///     delimiter: b';',
///     encoding: TextEncoding::Latin1,
/// });
/// let out = convert("download/open_match.csv", "converted/open_match.parquet", &options)?;
/// println!("wrote {}", out.display());
/// # Ok(())
/// # }
/// ```
pub fn convert(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &FormatOptions,
) -> ConvertResult<PathBuf> {
    let input = input.as_ref();
    let output = output.as_ref();

    let dataset = read_source(input, options)?;
    if dataset.column_count() == 0 {
        return Err(ConvertError::EmptySource {
            path: input.to_path_buf(),
        });
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    match options {
        FormatOptions::FixedWidth(o) if o.output == RecordOutput::NdJson => {
            writer::write_ndjson(&dataset, output)?
        }
        _ => writer::write_parquet(&dataset, output)?,
    }

    fs::remove_file(input)?;
    debug!(
        input = %input.display(),
        output = %output.display(),
        rows = dataset.row_count(),
        columns = dataset.column_count(),
        "converted source file"
    );
    Ok(output.to_path_buf())
}

fn read_spreadsheet_dispatch(path: &Path, options: &SpreadsheetOptions) -> ConvertResult<DataSet> {
    // Avoid unused warnings when the feature is off.
    let _ = (path, options);

    #[cfg(feature = "excel")]
    {
        spreadsheet::read_spreadsheet(path, options)
    }

    #[cfg(not(feature = "excel"))]
    {
        Err(ConvertError::SpreadsheetDisabled)
    }
}

/// Inputs paired with their typed options, validated at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPlan {
    items: Vec<(PathBuf, FormatOptions)>,
}

impl ConversionPlan {
    /// Pair `inputs` with `options` (same length, same order).
    ///
    /// Every input must have a supported suffix and options of the matching format, and no two
    /// inputs may convert to the same output file name.
    pub fn new(inputs: Vec<PathBuf>, options: Vec<FormatOptions>) -> ConvertResult<Self> {
        if inputs.len() != options.len() {
            return Err(ConvertError::PlanMismatch {
                inputs: inputs.len(),
                options: options.len(),
            });
        }
        let mut outputs: HashMap<PathBuf, &PathBuf> = HashMap::with_capacity(inputs.len());
        for (input, opts) in inputs.iter().zip(options.iter()) {
            opts.check_matches(input)?;
            let output = output_path_for(input, opts, Path::new(""));
            if let Some(first) = outputs.insert(output.clone(), input) {
                return Err(ConvertError::DuplicateOutput {
                    output,
                    first: first.clone(),
                    second: input.clone(),
                });
            }
        }
        Ok(Self {
            items: inputs.into_iter().zip(options).collect(),
        })
    }

    /// Plan where every input uses the default options for its detected format.
    pub fn with_defaults(inputs: Vec<PathBuf>) -> ConvertResult<Self> {
        let options = inputs
            .iter()
            .map(|input| FormatOptions::for_path(input))
            .collect::<ConvertResult<Vec<_>>>()?;
        Self::new(inputs, options)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[(PathBuf, FormatOptions)] {
        &self.items
    }

    /// Convert every input into `out_dir`, in parallel.
    ///
    /// Results keep plan order; one failed input does not stop the others.
    pub fn run(&self, out_dir: &Path) -> Vec<(PathBuf, ConvertResult<PathBuf>)> {
        self.items
            .par_iter()
            .map(|(input, options)| {
                let output = output_path_for(input, options, out_dir);
                (input.clone(), convert(input, &output, options))
            })
            .collect()
    }
}
