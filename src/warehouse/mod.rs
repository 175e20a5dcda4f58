//! Analytical warehouse seam.
//!
//! The publisher talks to a [`Warehouse`]; [`InMemoryWarehouse`] is an in-process implementation
//! that checks external-table URIs against a [`crate::storage::BlobStore`].

mod memory;

use crate::error::WarehouseResult;
use crate::model::{ExternalFormat, Watermark};

pub use memory::InMemoryWarehouse;

/// Label key the source watermark is recorded under.
pub const WATERMARK_LABEL: &str = "source_modified";

/// Dataset to create.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSpec {
    pub dataset_id: String,
    /// Warehouse location, e.g. `EU`.
    pub location: String,
    pub description: Option<String>,
}

/// External table to link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTableSpec {
    pub dataset_id: String,
    pub table_id: String,
    pub source_uris: Vec<String>,
    pub format: ExternalFormat,
    /// Let the warehouse infer the schema from the data.
    pub autodetect: bool,
}

/// Operations the publisher needs from a warehouse.
pub trait Warehouse: Send + Sync {
    fn dataset_exists(&self, dataset_id: &str) -> WarehouseResult<bool>;

    /// Recorded source watermark, `None` if the dataset or the label is absent.
    fn dataset_watermark(&self, dataset_id: &str) -> WarehouseResult<Option<Watermark>>;

    /// Record `watermark` under [`WATERMARK_LABEL`].
    fn set_dataset_watermark(&self, dataset_id: &str, watermark: &Watermark) -> WarehouseResult<()>;

    /// Delete the dataset and all of its tables.
    fn delete_dataset(&self, dataset_id: &str) -> WarehouseResult<()>;

    /// Create an empty dataset; [`crate::error::WarehouseError::Conflict`] if it exists.
    fn create_dataset(&self, spec: &DatasetSpec) -> WarehouseResult<()>;

    /// Link one external table; [`crate::error::WarehouseError::MissingObject`] if a source URI
    /// does not resolve.
    fn create_external_table(&self, spec: &ExternalTableSpec) -> WarehouseResult<()>;

    /// Tables of a dataset, ordered by table id.
    fn list_tables(&self, dataset_id: &str) -> WarehouseResult<Vec<ExternalTableSpec>>;
}
