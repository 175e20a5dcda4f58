//! Column type inference and header normalization.

use std::collections::HashSet;

use crate::types::{DataSet, DataType, Field, Schema, Value};

/// Make header names usable as column names: blanks become `column_{i}` and repeats get a
/// numeric suffix.
pub(crate) fn unique_column_names(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for (idx, name) in raw.into_iter().enumerate() {
        let base = match name.trim() {
            "" => format!("column_{idx}"),
            trimmed => trimmed.to_string(),
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// Build a typed dataset from text cells. `None` cells are missing values.
///
/// Each column gets the narrowest type every non-missing cell parses as, in the order
/// `Int64`, `Float64`, `Bool`, `Utf8`.
pub(crate) fn dataset_from_text(names: Vec<String>, rows: Vec<Vec<Option<String>>>) -> DataSet {
    let types: Vec<DataType> = (0..names.len())
        .map(|idx| infer_text_column(rows.iter().map(|r| r.get(idx).and_then(|c| c.as_deref()))))
        .collect();

    let typed_rows = rows
        .into_iter()
        .map(|row| {
            types
                .iter()
                .enumerate()
                .map(|(idx, dt)| match row.get(idx).and_then(|c| c.as_deref()) {
                    Some(raw) => parse_text(raw, *dt),
                    None => Value::Null,
                })
                .collect()
        })
        .collect();

    let fields = names
        .into_iter()
        .zip(types)
        .map(|(name, dt)| Field::new(name, dt))
        .collect();
    DataSet::new(Schema::new(fields), typed_rows)
}

/// Build a dataset from already-typed cells, unifying each column to one type.
///
/// Integer and float cells widen to `Float64`; any other mix falls back to `Utf8`.
pub(crate) fn dataset_from_values(names: Vec<String>, rows: Vec<Vec<Value>>) -> DataSet {
    let types: Vec<DataType> = (0..names.len())
        .map(|idx| unify_types(rows.iter().filter_map(|r| r.get(idx).and_then(Value::data_type))))
        .collect();

    let typed_rows = rows
        .into_iter()
        .map(|row| {
            types
                .iter()
                .enumerate()
                .map(|(idx, dt)| coerce(row.get(idx).cloned().unwrap_or(Value::Null), *dt))
                .collect()
        })
        .collect();

    let fields = names
        .into_iter()
        .zip(types)
        .map(|(name, dt)| Field::new(name, dt))
        .collect();
    DataSet::new(Schema::new(fields), typed_rows)
}

fn infer_text_column<'a>(cells: impl Iterator<Item = Option<&'a str>>) -> DataType {
    let mut int = true;
    let mut float = true;
    let mut boolean = true;
    let mut any = false;

    for raw in cells.flatten() {
        let s = raw.trim();
        any = true;
        int = int && s.parse::<i64>().is_ok();
        float = float && parse_float(s).is_some();
        boolean = boolean && parse_bool(s).is_some();
        if !int && !float && !boolean {
            return DataType::Utf8;
        }
    }

    match (any, int, float, boolean) {
        (false, ..) => DataType::Utf8,
        (true, true, _, _) => DataType::Int64,
        (true, _, true, _) => DataType::Float64,
        (true, _, _, true) => DataType::Bool,
        _ => DataType::Utf8,
    }
}

fn parse_text(raw: &str, dt: DataType) -> Value {
    let s = raw.trim();
    match dt {
        DataType::Int64 => s.parse().map(Value::Int64).unwrap_or(Value::Null),
        DataType::Float64 => parse_float(s).map(Value::Float64).unwrap_or(Value::Null),
        DataType::Bool => parse_bool(s).map(Value::Bool).unwrap_or(Value::Null),
        DataType::Utf8 => Value::Utf8(raw.to_string()),
    }
}

// `f64::from_str` accepts "inf" and "NaN"; require at least one digit.
fn parse_float(s: &str) -> Option<f64> {
    if !s.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn unify_types(types: impl Iterator<Item = DataType>) -> DataType {
    let mut current: Option<DataType> = None;
    for dt in types {
        current = Some(match (current, dt) {
            (None, dt) => dt,
            (Some(a), b) if a == b => a,
            (Some(DataType::Int64), DataType::Float64) | (Some(DataType::Float64), DataType::Int64) => {
                DataType::Float64
            }
            _ => return DataType::Utf8,
        });
    }
    current.unwrap_or(DataType::Utf8)
}

fn coerce(value: Value, dt: DataType) -> Value {
    match (value, dt) {
        (Value::Null, _) => Value::Null,
        (Value::Int64(v), DataType::Float64) => Value::Float64(v as f64),
        (v, DataType::Utf8) if !matches!(v, Value::Utf8(_)) => {
            v.to_text().map(Value::Utf8).unwrap_or(Value::Null)
        }
        (v, _) => v,
    }
}
