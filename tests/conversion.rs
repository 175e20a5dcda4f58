use std::fs;
use std::path::{Path, PathBuf};

use open_data_sync::convert::inspect::read_parquet;
use open_data_sync::convert::{
    convert, inspect, ConversionPlan, DelimitedOptions, FixedWidthColumn, FixedWidthOptions, FormatOptions,
    RecordOutput, SpreadsheetOptions, TextEncoding,
};
use open_data_sync::error::ConvertError;
use open_data_sync::model::ExternalFormat;
use open_data_sync::types::{DataType, Value};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn staged_copy(dir: &Path, name: &str) -> PathBuf {
    let dest = dir.join(name);
    fs::copy(fixture(name), &dest).unwrap();
    dest
}

fn csv_options() -> FormatOptions {
    FormatOptions::Delimited(DelimitedOptions::default())
}

#[test]
fn delimited_round_trip_preserves_rows_and_columns() {
    let dir = tempfile::tempdir().unwrap();
    let input = staged_copy(dir.path(), "regions.csv");
    let output = dir.path().join("regions.parquet");

    let written = convert(&input, &output, &csv_options()).unwrap();
    assert_eq!(written, output);
    assert!(!input.exists(), "source file should be removed after conversion");

    let ds = read_parquet(&output).unwrap();
    assert_eq!(ds.row_count(), 4);
    assert_eq!(
        ds.schema.field_names().collect::<Vec<_>>(),
        vec!["gwb_code", "regio", "inwoners", "oppervlakte_km2", "stedelijk"]
    );
    let types: Vec<DataType> = ds.schema.fields.iter().map(|f| f.data_type).collect();
    assert_eq!(
        types,
        vec![DataType::Utf8, DataType::Utf8, DataType::Int64, DataType::Float64, DataType::Bool]
    );
    assert_eq!(ds.rows[0][1], Value::Utf8("Groningen".to_string()));
    assert_eq!(ds.rows[1][2], Value::Int64(214715));
    assert_eq!(ds.rows[2][3], Value::Null);
    assert_eq!(ds.rows[3][4], Value::Null);
}

#[test]
fn latin1_semicolon_source_is_decoded() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("gemeenten.csv");
    fs::write(&input, b"code;naam\nGM1900;S\xfadwest-Frysl\xe2n\n").unwrap();
    let output = dir.path().join("gemeenten.parquet");

    let options = FormatOptions::Delimited(DelimitedOptions {
        delimiter: b';',
        encoding: "8859".parse::<TextEncoding>().unwrap(),
    });
    convert(&input, &output, &options).unwrap();

    let ds = read_parquet(&output).unwrap();
    assert_eq!(ds.rows[0][1], Value::Utf8("Súdwest-Fryslân".to_string()));
}

#[test]
fn invalid_utf8_fails_and_keeps_source() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.csv");
    fs::write(&input, b"naam\nS\xfadwest\n").unwrap();

    let err = convert(&input, dir.path().join("bad.parquet"), &csv_options()).unwrap_err();
    assert!(matches!(err, ConvertError::Encoding { .. }));
    assert!(input.exists());
}

#[cfg(feature = "excel")]
#[test]
fn malformed_workbook_fails_and_keeps_source() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("kwb-2019.xlsx");
    fs::write(&input, b"GM0014;233218\n").unwrap();
    let output = dir.path().join("kwb-2019.parquet");

    let options = FormatOptions::Spreadsheet(SpreadsheetOptions::default());
    let err = convert(&input, &output, &options).unwrap_err();
    assert!(matches!(err, ConvertError::Spreadsheet(_)));
    assert!(input.exists());
    assert!(!output.exists());
}

#[test]
fn unsupported_suffix_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("toelichting.pdf");
    fs::write(&input, b"%PDF-1.4").unwrap();

    let err = convert(&input, dir.path().join("toelichting.parquet"), &csv_options()).unwrap_err();
    assert!(matches!(err, ConvertError::UnsupportedFormat { ref suffix, .. } if suffix == "pdf"));
    assert!(input.exists());
}

#[test]
fn options_for_another_format_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = staged_copy(dir.path(), "regions.csv");
    let options = FormatOptions::Spreadsheet(SpreadsheetOptions::default());

    let err = convert(&input, dir.path().join("regions.parquet"), &options).unwrap_err();
    assert!(matches!(err, ConvertError::OptionsMismatch { .. }));
}

#[test]
fn empty_source_has_no_columns() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("leeg.csv");
    fs::write(&input, b"").unwrap();

    let err = convert(&input, dir.path().join("leeg.parquet"), &csv_options()).unwrap_err();
    assert!(matches!(err, ConvertError::EmptySource { .. }));
}

#[test]
fn header_only_source_converts_to_zero_rows() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("kop.csv");
    fs::write(&input, b"a,b\n").unwrap();
    let output = dir.path().join("kop.parquet");

    convert(&input, &output, &csv_options()).unwrap();
    let summary = inspect(&output).unwrap();
    assert_eq!(summary.row_count, 0);
    assert_eq!(summary.column_names, vec!["a", "b"]);
}

#[test]
fn fixed_width_to_ndjson() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("pc6hnr.txt");
    fs::write(&input, "PC6   HNR  GEM \n1011AB   120363\n1011AC    3    \n").unwrap();
    let output = dir.path().join("pc6hnr.json");

    let options = FormatOptions::FixedWidth(FixedWidthOptions {
        skip_lines: 1,
        output: RecordOutput::NdJson,
        ..FixedWidthOptions::new(vec![
            FixedWidthColumn::new("pc6", 6),
            FixedWidthColumn::new("huisnummer", 5),
            FixedWidthColumn::new("gemeente", 4),
        ])
    });
    convert(&input, &output, &options).unwrap();

    let summary = inspect(&output).unwrap();
    assert_eq!(summary.format, ExternalFormat::NewlineDelimitedJson);
    assert_eq!(summary.row_count, 2);
    let mut columns = summary.column_names.clone();
    columns.sort();
    assert_eq!(columns, vec!["gemeente", "huisnummer", "pc6"]);

    let first = fs::read_to_string(&output).unwrap();
    let first: serde_json::Value = serde_json::from_str(first.lines().next().unwrap()).unwrap();
    assert_eq!(first["huisnummer"], 12);
}

#[test]
fn plan_converts_each_input_and_reports_per_input() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("converted");
    let good = staged_copy(dir.path(), "regions.csv");
    let bad = dir.path().join("kapot.csv");
    fs::write(&bad, b"naam\n\xff\n").unwrap();

    let plan = ConversionPlan::new(vec![good.clone(), bad.clone()], vec![csv_options(), csv_options()]).unwrap();
    assert_eq!(plan.len(), 2);

    let results = plan.run(&out);
    assert_eq!(results[0].0, good);
    assert_eq!(results[0].1.as_ref().unwrap(), &out.join("regions.parquet"));
    assert_eq!(results[1].0, bad);
    assert!(results[1].1.is_err());
}
