use std::path::PathBuf;

use thiserror::Error;

use crate::convert::SourceFormat;

/// Result type for format conversion.
pub type ConvertResult<T> = Result<T, ConvertError>;
/// Result type for staging directory management.
pub type StagingResult<T> = Result<T, StagingError>;
/// Result type for blob store operations.
pub type StoreResult<T> = Result<T, StoreError>;
/// Result type for uploads.
pub type UploadResult<T> = Result<T, UploadError>;
/// Result type for warehouse calls.
pub type WarehouseResult<T> = Result<T, WarehouseError>;
/// Result type for publishing.
pub type PublishResult<T> = Result<T, PublishError>;
/// Result type for dataset sources.
pub type SourceResult<T> = Result<T, SourceError>;
/// Result type for a whole synchronization unit.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error returned while turning one source file into one artifact.
///
/// All variants are fatal to the artifact being converted, never to the batch.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Spreadsheet parsing error (malformed or truncated workbook).
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// Spreadsheet input while the `excel` feature is disabled.
    #[error("spreadsheet conversion not enabled (enable cargo feature 'excel')")]
    SpreadsheetDisabled,

    /// Delimited-text parsing error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Columnar writer/reader error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Record (NDJSON) writer error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zip archive could not be read or extracted.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The input suffix maps to no supported source format.
    #[error("unsupported format '{suffix}' ({})", .path.display())]
    UnsupportedFormat { path: PathBuf, suffix: String },

    /// The options supplied for an input belong to another format.
    #[error("options for {got:?} supplied for {expected:?} input ({})", .path.display())]
    OptionsMismatch {
        path: PathBuf,
        expected: SourceFormat,
        got: SourceFormat,
    },

    /// A conversion plan was built with differently sized input/option lists.
    #[error("conversion plan has {inputs} inputs but {options} option records")]
    PlanMismatch { inputs: usize, options: usize },

    /// The source has no columns to write.
    #[error("source has no columns ({})", .path.display())]
    EmptySource { path: PathBuf },

    /// The text could not be decoded with the configured encoding.
    #[error("cannot decode {} as {encoding}: {message}", .path.display())]
    Encoding {
        path: PathBuf,
        encoding: String,
        message: String,
    },

    /// Unknown encoding label.
    #[error("unknown text encoding '{0}'")]
    UnknownEncoding(String),

    /// A fixed-width line or column specification is invalid.
    #[error("fixed-width error at line {line}: {message}")]
    FixedWidth { line: usize, message: String },

    /// The input's format has no default options and none were supplied.
    #[error("no options supplied for {format:?} input ({})", .path.display())]
    MissingOptions { path: PathBuf, format: SourceFormat },

    /// Two inputs of one plan would be written to the same output file.
    #[error("{} and {} both convert to {}", .first.display(), .second.display(), .output.display())]
    DuplicateOutput {
        output: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Error returned by the staging area.
#[derive(Debug, Error)]
pub enum StagingError {
    /// The staging directory (or one of its subfolders) could not be created.
    #[error("cannot create staging directory {}: {source}", .path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two artifacts in one staging directory map to the same table name.
    #[error("table name '{table}' produced by both {} and {}", .first.display(), .second.display())]
    DuplicateTableName {
        table: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Other staging I/O (moving files into the upload area).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error returned by a [`crate::storage::BlobStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object write/read failed.
    #[error("object '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The key is empty or escapes the bucket.
    #[error("invalid object key '{key}'")]
    InvalidKey { key: String },

    /// The object store backend rejected the request.
    #[error("object '{key}': {source}")]
    Backend {
        key: String,
        #[source]
        source: object_store::Error,
    },
}

/// Error returned by the uploader for one artifact.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The staged artifact is gone.
    #[error("artifact path does not exist: {}", .path.display())]
    MissingLocal { path: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error returned by a [`crate::warehouse::Warehouse`].
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// The dataset already exists.
    #[error("dataset '{dataset_id}' already exists")]
    Conflict { dataset_id: String },

    /// The dataset does not exist.
    #[error("dataset '{dataset_id}' not found")]
    NotFound { dataset_id: String },

    /// The dataset already has a table with this id.
    #[error("table '{table_id}' already exists in dataset '{dataset_id}'")]
    TableConflict { dataset_id: String, table_id: String },

    /// An external table points at an object that does not exist.
    #[error("remote object '{uri}' not found")]
    MissingObject { uri: String },

    /// Any other API failure.
    #[error("warehouse api error: {message}")]
    Api { message: String },
}

/// Error returned while publishing one dataset or one of its tables.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The URI suffix is neither columnar nor newline-delimited records.
    #[error("unsupported external table format '{suffix}' for '{uri}'")]
    UnsupportedExternalFormat { uri: String, suffix: String },

    /// Another entry of the same publish already took this table id.
    #[error("table '{table_id}' for '{uri}' already linked from another object")]
    DuplicateTable { uri: String, table_id: String },

    /// The linked object was missing at link time.
    #[error("remote object '{uri}' missing at link time")]
    MissingRemoteObject { uri: String },

    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Error returned by a [`crate::source::DatasetSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// Unknown dataset identifier.
    #[error("dataset '{id}' not found at source")]
    NotFound { id: String },

    /// The source metadata carries no `Modified` value.
    #[error("dataset '{id}' has no Modified field")]
    MissingModified { id: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other catalog/API failure.
    #[error("source api error: {message}")]
    Api { message: String },
}

/// Error returned when loading [`crate::config::SyncConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config parsed but is unusable.
    #[error("invalid config: {message}")]
    Invalid { message: String },
}

/// Error that ends one dataset's synchronization unit.
///
/// Never aborts sibling units in the same batch.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("source: {0}")]
    Source(#[from] SourceError),

    #[error("staging: {0}")]
    Staging(#[from] StagingError),

    #[error("convert: {0}")]
    Convert(#[from] ConvertError),

    #[error("upload: {0}")]
    Upload(#[from] UploadError),

    #[error("publish: {0}")]
    Publish(#[from] PublishError),

    #[error("warehouse: {0}")]
    Warehouse(#[from] WarehouseError),

    /// Every source file of the dataset failed before upload.
    #[error("no artifacts produced for dataset '{dataset}'")]
    NoArtifacts { dataset: String },

    /// The unit panicked; staging was still released.
    #[error("unit panicked: {message}")]
    Panicked { message: String },
}
