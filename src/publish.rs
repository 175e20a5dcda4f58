//! (Re)publishing uploaded artifacts as external warehouse tables.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{PublishError, PublishResult, WarehouseError};
use crate::model::{dataset_id, table_name_for, Artifact, CatalogEntry, ExternalFormat, Watermark};
use crate::storage::BlobStore;
use crate::warehouse::{DatasetSpec, ExternalTableSpec, Warehouse};

/// What to link into the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishSource {
    /// Explicit object URIs, one table each.
    Uris(Vec<String>),
    /// Every object below a folder (key prefix) of the blob store.
    Folder(String),
}

/// One publish call.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub dataset_name: String,
    pub source: Option<String>,
    pub tables: PublishSource,
    pub description: Option<String>,
    /// Recorded on the dataset once every table is linked.
    pub watermark: Option<Watermark>,
}

impl PublishRequest {
    pub fn new(dataset_name: impl Into<String>, tables: PublishSource) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            source: None,
            tables,
            description: None,
            watermark: None,
        }
    }

    /// Request linking every URI of every uploaded artifact.
    pub fn from_artifacts(dataset_name: impl Into<String>, artifacts: &[Artifact]) -> Self {
        let uris = artifacts
            .iter()
            .flat_map(|a| a.remote_uris.iter().cloned())
            .collect();
        Self::new(dataset_name, PublishSource::Uris(uris))
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_watermark(mut self, watermark: Option<Watermark>) -> Self {
        self.watermark = watermark;
        self
    }
}

/// Outcome of one publish call.
#[derive(Debug)]
pub struct PublishReport {
    pub dataset_id: String,
    pub linked: Vec<CatalogEntry>,
    /// URIs with an unsupported suffix or a table id taken by an earlier entry.
    pub rejected: Vec<(String, PublishError)>,
    /// URIs whose object was missing at link time.
    pub skipped: Vec<(String, PublishError)>,
    /// Whether the watermark was written.
    pub watermark_recorded: bool,
}

impl PublishReport {
    /// No entry was rejected or skipped.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty() && self.skipped.is_empty()
    }
}

/// Replaces a warehouse dataset with one external table per uploaded object.
#[derive(Clone)]
pub struct CatalogPublisher {
    warehouse: Arc<dyn Warehouse>,
    store: Arc<dyn BlobStore>,
    location: String,
}

impl CatalogPublisher {
    pub fn new(warehouse: Arc<dyn Warehouse>, store: Arc<dyn BlobStore>, location: impl Into<String>) -> Self {
        Self {
            warehouse,
            store,
            location: location.into(),
        }
    }

    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    /// Delete and recreate the dataset, then link each object as an external table.
    ///
    /// - An existing dataset is deleted with all of its tables.
    /// - A `Conflict` on create is logged and publishing continues.
    /// - A URI with an unsupported suffix, or whose table id another entry already took, is
    ///   rejected; its siblings are still linked.
    /// - A URI whose object is gone at link time is skipped with a warning.
    /// - The watermark is recorded only when nothing was rejected or skipped.
    ///
    /// Other warehouse and store errors abort the call.
    pub fn publish(&self, request: &PublishRequest) -> PublishResult<PublishReport> {
        let dataset_id = dataset_id(&request.dataset_name, request.source.as_deref());

        if self.warehouse.dataset_exists(&dataset_id)? {
            self.warehouse.delete_dataset(&dataset_id)?;
            info!(dataset_id = %dataset_id, "deleted existing dataset");
        }

        let spec = DatasetSpec {
            dataset_id: dataset_id.clone(),
            location: self.location.clone(),
            description: request.description.clone(),
        };
        match self.warehouse.create_dataset(&spec) {
            Ok(()) => info!(dataset_id = %dataset_id, location = %self.location, "created dataset"),
            Err(WarehouseError::Conflict { .. }) => {
                warn!(dataset_id = %dataset_id, "dataset already exists; continuing")
            }
            Err(e) => return Err(e.into()),
        }

        let uris = match &request.tables {
            PublishSource::Uris(uris) => uris.clone(),
            PublishSource::Folder(folder) => {
                let prefix = format!("{}/", folder.trim_end_matches('/'));
                self.store
                    .list(&prefix)?
                    .iter()
                    .map(|key| self.store.uri(key))
                    .collect()
            }
        };

        let mut report = PublishReport {
            dataset_id: dataset_id.clone(),
            linked: Vec::new(),
            rejected: Vec::new(),
            skipped: Vec::new(),
            watermark_recorded: false,
        };

        for uri in uris {
            let suffix = uri
                .rsplit('/')
                .next()
                .and_then(|name| name.rsplit_once('.'))
                .map(|(_, ext)| ext.to_string())
                .unwrap_or_default();
            let Some(format) = ExternalFormat::from_suffix(&suffix) else {
                warn!(dataset_id = %dataset_id, uri = %uri, "unsupported external table format");
                report
                    .rejected
                    .push((uri.clone(), PublishError::UnsupportedExternalFormat { uri, suffix }));
                continue;
            };

            let table = ExternalTableSpec {
                dataset_id: dataset_id.clone(),
                table_id: table_name_for(&uri),
                source_uris: vec![uri.clone()],
                format,
                autodetect: format.autodetect(),
            };
            match self.warehouse.create_external_table(&table) {
                Ok(()) => {
                    info!(dataset_id = %dataset_id, table_id = %table.table_id, "linked external table");
                    report.linked.push(CatalogEntry {
                        dataset_id: dataset_id.clone(),
                        table_id: table.table_id,
                        source_uri: uri,
                        format,
                    });
                }
                Err(WarehouseError::TableConflict { table_id, .. }) => {
                    warn!(dataset_id = %dataset_id, uri = %uri, table_id = %table_id, "table id already linked; rejected");
                    report
                        .rejected
                        .push((uri.clone(), PublishError::DuplicateTable { uri, table_id }));
                }
                Err(WarehouseError::MissingObject { .. }) => {
                    warn!(dataset_id = %dataset_id, uri = %uri, "object missing at link time; skipped");
                    report
                        .skipped
                        .push((uri.clone(), PublishError::MissingRemoteObject { uri }));
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(watermark) = &request.watermark {
            if report.is_complete() {
                self.warehouse.set_dataset_watermark(&dataset_id, watermark)?;
                report.watermark_recorded = true;
            } else {
                warn!(dataset_id = %dataset_id, "incomplete publish; watermark not recorded");
            }
        }

        Ok(report)
    }
}
