use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{WarehouseError, WarehouseResult};
use crate::model::Watermark;
use crate::storage::BlobStore;
use crate::warehouse::{DatasetSpec, ExternalTableSpec, Warehouse, WATERMARK_LABEL};

#[derive(Debug, Clone)]
struct DatasetState {
    spec: DatasetSpec,
    labels: BTreeMap<String, String>,
    tables: BTreeMap<String, ExternalTableSpec>,
}

/// In-process [`Warehouse`].
///
/// With a store attached, external tables whose URIs do not resolve in that store fail with
/// [`WarehouseError::MissingObject`].
#[derive(Default)]
pub struct InMemoryWarehouse {
    store: Option<Arc<dyn BlobStore>>,
    datasets: Mutex<BTreeMap<String, DatasetState>>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store: Some(store),
            datasets: Mutex::new(BTreeMap::new()),
        }
    }

    /// Spec of an existing dataset.
    pub fn dataset(&self, dataset_id: &str) -> Option<DatasetSpec> {
        self.lock()
            .ok()
            .and_then(|d| d.get(dataset_id).map(|s| s.spec.clone()))
    }

    /// Ids of all datasets, sorted.
    pub fn dataset_ids(&self) -> Vec<String> {
        self.lock()
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> WarehouseResult<MutexGuard<'_, BTreeMap<String, DatasetState>>> {
        self.datasets.lock().map_err(|_| WarehouseError::Api {
            message: "warehouse state poisoned".to_string(),
        })
    }

    fn check_uri(&self, uri: &str) -> WarehouseResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let found = match store.key_for_uri(uri) {
            Some(key) => store.exists(&key).map_err(|e| WarehouseError::Api {
                message: e.to_string(),
            })?,
            None => false,
        };
        if found {
            Ok(())
        } else {
            Err(WarehouseError::MissingObject {
                uri: uri.to_string(),
            })
        }
    }
}

impl Warehouse for InMemoryWarehouse {
    fn dataset_exists(&self, dataset_id: &str) -> WarehouseResult<bool> {
        Ok(self.lock()?.contains_key(dataset_id))
    }

    fn dataset_watermark(&self, dataset_id: &str) -> WarehouseResult<Option<Watermark>> {
        Ok(self
            .lock()?
            .get(dataset_id)
            .and_then(|d| d.labels.get(WATERMARK_LABEL))
            .map(|s| Watermark::new(s.as_str())))
    }

    fn set_dataset_watermark(&self, dataset_id: &str, watermark: &Watermark) -> WarehouseResult<()> {
        let mut datasets = self.lock()?;
        let state = datasets
            .get_mut(dataset_id)
            .ok_or_else(|| WarehouseError::NotFound {
                dataset_id: dataset_id.to_string(),
            })?;
        state
            .labels
            .insert(WATERMARK_LABEL.to_string(), watermark.as_str().to_string());
        Ok(())
    }

    fn delete_dataset(&self, dataset_id: &str) -> WarehouseResult<()> {
        self.lock()?
            .remove(dataset_id)
            .map(|_| ())
            .ok_or_else(|| WarehouseError::NotFound {
                dataset_id: dataset_id.to_string(),
            })
    }

    fn create_dataset(&self, spec: &DatasetSpec) -> WarehouseResult<()> {
        let mut datasets = self.lock()?;
        if datasets.contains_key(&spec.dataset_id) {
            return Err(WarehouseError::Conflict {
                dataset_id: spec.dataset_id.clone(),
            });
        }
        datasets.insert(
            spec.dataset_id.clone(),
            DatasetState {
                spec: spec.clone(),
                labels: BTreeMap::new(),
                tables: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn create_external_table(&self, spec: &ExternalTableSpec) -> WarehouseResult<()> {
        for uri in &spec.source_uris {
            self.check_uri(uri)?;
        }
        let mut datasets = self.lock()?;
        let state = datasets
            .get_mut(&spec.dataset_id)
            .ok_or_else(|| WarehouseError::NotFound {
                dataset_id: spec.dataset_id.clone(),
            })?;
        if state.tables.contains_key(&spec.table_id) {
            return Err(WarehouseError::TableConflict {
                dataset_id: spec.dataset_id.clone(),
                table_id: spec.table_id.clone(),
            });
        }
        state.tables.insert(spec.table_id.clone(), spec.clone());
        Ok(())
    }

    fn list_tables(&self, dataset_id: &str) -> WarehouseResult<Vec<ExternalTableSpec>> {
        let datasets = self.lock()?;
        let state = datasets.get(dataset_id).ok_or_else(|| WarehouseError::NotFound {
            dataset_id: dataset_id.to_string(),
        })?;
        Ok(state.tables.values().cloned().collect())
    }
}
