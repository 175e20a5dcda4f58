//! Descriptors, watermarks, artifacts and catalog entries.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Characters replaced by `_` when deriving a table name from a file stem.
pub const TABLE_NAME_REPLACED_CHARS: [char; 5] = ['-', '.', '(', ')', '%'];

/// OData protocol version a dataset is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OdataVersion {
    #[default]
    V3,
    V4,
}

impl fmt::Display for OdataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OdataVersion::V3 => f.write_str("v3"),
            OdataVersion::V4 => f.write_str("v4"),
        }
    }
}

/// One logical remote dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Source-side identifier, e.g. `83583NED`.
    pub id: String,
    /// Publisher label used as dataset prefix, e.g. `cbs`.
    #[serde(default)]
    pub source: Option<String>,
    /// Dataset is hosted by a third party rather than the statistics office itself.
    #[serde(default)]
    pub third_party: bool,
    #[serde(default)]
    pub odata_version: OdataVersion,
}

impl DatasetDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: None,
            third_party: false,
            odata_version: OdataVersion::default(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_third_party(mut self, third_party: bool) -> Self {
        self.third_party = third_party;
        self
    }

    pub fn with_odata_version(mut self, version: OdataVersion) -> Self {
        self.odata_version = version;
        self
    }

    /// Warehouse dataset id this descriptor publishes into.
    pub fn dataset_id(&self) -> String {
        dataset_id(&self.id, self.source.as_deref())
    }
}

/// Warehouse dataset id: `{source}_{dataset_name}` when a source is given, else the name verbatim.
///
/// An empty source counts as absent.
pub fn dataset_id(dataset_name: &str, source: Option<&str>) -> String {
    match source {
        Some(source) if !source.is_empty() => format!("{source}_{dataset_name}"),
        _ => dataset_name.to_string(),
    }
}

/// Replace `-`, `.`, `(`, `)` and `%` with `_`.
pub fn sanitize_table_name(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if TABLE_NAME_REPLACED_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Table name for a file path or URI: the sanitized final stem.
pub fn table_name_for(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    sanitize_table_name(stem)
}

/// A last-modified value as published by a source or recorded on a target.
///
/// Two watermarks compare chronologically when both parse as a date or date-time, and as raw
/// strings otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(String);

impl Watermark {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The watermark as a UTC-naive instant, if it parses.
    pub fn instant(&self) -> Option<NaiveDateTime> {
        let s = self.0.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.naive_utc());
        }
        for fmt in [
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
        ] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(dt);
            }
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

impl From<&str> for Watermark {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Watermark {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for Watermark {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Watermark {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.instant(), other.instant()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => Some(self.0.cmp(&other.0)),
        }
    }
}

/// Source and target watermarks read for one synchronization attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ModificationWatermark {
    pub source_modified: Watermark,
    pub target_modified: Option<Watermark>,
}

/// One converted, uploadable unit of tabular data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File (or directory) inside the staging tree.
    pub local_path: PathBuf,
    /// Path below the staging subtree the artifact lives in; becomes the object key suffix.
    pub relative_path: PathBuf,
    /// External table id.
    pub logical_table_name: String,
    /// Object URIs once uploaded.
    pub remote_uris: Vec<String>,
}

impl Artifact {
    /// Describe `local_path`, which must live below `subtree_root`.
    ///
    /// Paths outside the subtree keep only their file name as relative path.
    pub fn new(subtree_root: &Path, local_path: impl Into<PathBuf>) -> Self {
        let local_path = local_path.into();
        let relative_path = match local_path.strip_prefix(subtree_root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => local_path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| local_path.clone()),
        };
        let logical_table_name = if local_path.is_dir() {
            sanitize_table_name(
                &local_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
        } else {
            sanitize_table_name(
                &local_path
                    .file_stem()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
        };
        Self {
            local_path,
            relative_path,
            logical_table_name,
            remote_uris: Vec::new(),
        }
    }

    pub fn is_uploaded(&self) -> bool {
        !self.remote_uris.is_empty()
    }
}

/// External table formats the warehouse can link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalFormat {
    /// Columnar table (`.parquet`).
    Parquet,
    /// Newline-delimited structured records (`.json`, `.ndjson`), schema auto-detected.
    NewlineDelimitedJson,
}

impl ExternalFormat {
    /// Detect the format from the suffix of a file name or URI.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "parquet" => Some(Self::Parquet),
            "json" | "ndjson" => Some(Self::NewlineDelimitedJson),
            _ => None,
        }
    }

    /// Whether the warehouse should infer the schema itself.
    pub fn autodetect(&self) -> bool {
        matches!(self, Self::NewlineDelimitedJson)
    }
}

/// One external table after publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub dataset_id: String,
    pub table_id: String,
    pub source_uri: String,
    pub format: ExternalFormat,
}
