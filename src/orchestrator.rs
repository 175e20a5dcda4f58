//! Per-dataset synchronization units and batch fan-out.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{GcpEnv, PublishConfig, SyncConfig};
use crate::convert::{self, FormatOptions};
use crate::error::{ConfigError, ConvertError, SyncError, SyncResult};
use crate::execution::{chunk_ranges, BatchExecutor};
use crate::model::{Artifact, DatasetDescriptor, ModificationWatermark};
use crate::observability::{severity_for_error, SyncObserver, SyncSeverity};
use crate::publish::{CatalogPublisher, PublishReport, PublishRequest};
use crate::source::{DatasetSource, SourceFile};
use crate::staging::{ArtifactSet, StagingArea, StagingDirectory};
use crate::staleness::{decide, Decision, ProcessReason, SkipReason};
use crate::storage::BlobStore;
use crate::upload::ObjectStoreUploader;
use crate::warehouse::Warehouse;

/// One source file (or archive) that did not make it into the warehouse.
#[derive(Debug)]
pub struct ArtifactFailure {
    pub path: PathBuf,
    pub error: SyncError,
}

/// A dataset that was processed and published.
#[derive(Debug)]
pub struct SyncedDataset {
    pub dataset_id: String,
    pub reason: ProcessReason,
    pub watermarks: ModificationWatermark,
    /// Uploaded artifacts.
    pub artifacts: Vec<Artifact>,
    /// Conversion and upload failures of individual files. Non-empty means the watermark was not
    /// recorded.
    pub artifact_failures: Vec<ArtifactFailure>,
    pub report: PublishReport,
}

impl SyncedDataset {
    /// Every file converted, uploaded and linked.
    pub fn is_complete(&self) -> bool {
        self.artifact_failures.is_empty() && self.report.is_complete()
    }
}

/// Final state of one descriptor in a batch.
#[derive(Debug)]
pub enum Outcome {
    Synced(SyncedDataset),
    Skipped(SkipReason),
    Failed(SyncError),
}

impl Outcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, Outcome::Synced(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// Outcome of one descriptor.
#[derive(Debug)]
pub struct DatasetOutcome {
    pub descriptor: DatasetDescriptor,
    pub outcome: Outcome,
}

/// Outcomes of a batch, in descriptor order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<DatasetOutcome>,
}

impl BatchReport {
    pub fn synced_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_synced()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_skipped()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_failed()).count()
    }

    /// Outcome for a warehouse dataset id.
    pub fn get(&self, dataset_id: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.descriptor.dataset_id() == dataset_id)
            .map(|o| &o.outcome)
    }
}

/// Composes staleness check, conversion, staging, upload and publish per dataset.
pub struct SyncOrchestrator {
    source: Arc<dyn DatasetSource>,
    warehouse: Arc<dyn Warehouse>,
    uploader: ObjectStoreUploader,
    publisher: CatalogPublisher,
    staging: StagingArea,
    executor: BatchExecutor,
    publish_config: PublishConfig,
    observer: Option<Arc<dyn SyncObserver>>,
    alert_threshold: SyncSeverity,
}

impl SyncOrchestrator {
    /// Build an orchestrator publishing to `location`.
    ///
    /// # Panics
    ///
    /// Panics if the execution options in `config` are invalid; see [`BatchExecutor::new`].
    pub fn new(
        config: &SyncConfig,
        location: impl Into<String>,
        source: Arc<dyn DatasetSource>,
        store: Arc<dyn BlobStore>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Self {
        Self {
            source,
            uploader: ObjectStoreUploader::new(Arc::clone(&store)),
            publisher: CatalogPublisher::new(Arc::clone(&warehouse), store, location),
            warehouse,
            staging: StagingArea::new(&config.staging.root),
            executor: BatchExecutor::new(config.execution.options()),
            publish_config: config.publish.clone(),
            observer: None,
            alert_threshold: SyncSeverity::Critical,
        }
    }

    /// Build an orchestrator for the project configured for `env`.
    pub fn for_env(
        config: &SyncConfig,
        env: GcpEnv,
        source: Arc<dyn DatasetSource>,
        store: Arc<dyn BlobStore>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let project = config.project(env)?;
        if project.bucket != store.bucket() {
            return Err(ConfigError::Invalid {
                message: format!(
                    "store bucket '{}' does not match [gcp.{env}] bucket '{}'",
                    store.bucket(),
                    project.bucket
                ),
            });
        }
        Ok(Self::new(config, project.location.clone(), source, store, warehouse))
    }

    /// Attach an observer for per-dataset outcomes.
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Failures at or above `severity` are reported through [`SyncObserver::on_alert`].
    pub fn with_alert_threshold(mut self, severity: SyncSeverity) -> Self {
        self.alert_threshold = severity;
        self
    }

    pub fn executor(&self) -> &BatchExecutor {
        &self.executor
    }

    /// Synchronize a batch of datasets.
    ///
    /// Watermarks are read in parallel, then every dataset needing work runs as one unit on the
    /// executor. Units never affect each other; each descriptor gets exactly one [`Outcome`].
    pub fn run_batch(&self, descriptors: &[DatasetDescriptor], force: bool) -> BatchReport {
        info!(datasets = descriptors.len(), force, "starting batch");
        let watermarks = self.executor.map(descriptors, |d| self.read_watermarks(d));

        let mut outcomes: Vec<Option<Outcome>> = Vec::with_capacity(descriptors.len());
        let mut pending: Vec<(usize, ModificationWatermark, ProcessReason)> = Vec::new();
        for (idx, (descriptor, read)) in descriptors.iter().zip(watermarks).enumerate() {
            match read {
                Err(e) => outcomes.push(Some(Outcome::Failed(e))),
                Ok(wm) => match decide(&wm.source_modified, wm.target_modified.as_ref(), force) {
                    Decision::Skip(reason) => {
                        debug!(dataset_id = %descriptor.dataset_id(), %reason, "skipping dataset");
                        outcomes.push(Some(Outcome::Skipped(reason)));
                    }
                    Decision::Process(reason) => {
                        outcomes.push(None);
                        pending.push((idx, wm, reason));
                    }
                },
            }
        }

        let results = self.executor.run_units(&pending, |_, (idx, wm, reason)| {
            self.run_unit_guarded(&descriptors[*idx], wm, *reason)
        });
        for ((idx, _, _), result) in pending.iter().zip(results) {
            outcomes[*idx] = Some(match result {
                Ok(synced) => Outcome::Synced(synced),
                Err(e) => Outcome::Failed(e),
            });
        }

        let report = BatchReport {
            outcomes: descriptors
                .iter()
                .cloned()
                .zip(outcomes)
                .filter_map(|(descriptor, outcome)| {
                    outcome.map(|outcome| DatasetOutcome { descriptor, outcome })
                })
                .collect(),
        };
        self.notify(&report);
        info!(
            synced = report.synced_count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            "batch finished"
        );
        report
    }

    /// Synchronize a full catalog in consecutive batches of `chunk_size` descriptors.
    pub fn run_chunked(&self, descriptors: &[DatasetDescriptor], force: bool) -> BatchReport {
        let ranges = chunk_ranges(descriptors.len(), self.executor.options().chunk_size);
        let chunks = ranges.len();
        let mut report = BatchReport::default();
        for (n, range) in ranges.into_iter().enumerate() {
            info!(chunk = n + 1, chunks, "starting chunk");
            report.outcomes.extend(self.run_batch(&descriptors[range], force).outcomes);
        }
        report
    }

    /// Synchronize a single dataset.
    pub fn sync_one(&self, descriptor: &DatasetDescriptor, force: bool) -> Outcome {
        let mut report = self.run_batch(std::slice::from_ref(descriptor), force);
        match report.outcomes.pop() {
            Some(o) => o.outcome,
            None => Outcome::Failed(SyncError::Panicked {
                message: "batch produced no outcome".to_string(),
            }),
        }
    }

    fn read_watermarks(&self, descriptor: &DatasetDescriptor) -> SyncResult<ModificationWatermark> {
        let source_modified = self.source.source_modified(descriptor)?;
        let target_modified = self.warehouse.dataset_watermark(&descriptor.dataset_id())?;
        Ok(ModificationWatermark {
            source_modified,
            target_modified,
        })
    }

    fn run_unit_guarded(
        &self,
        descriptor: &DatasetDescriptor,
        watermarks: &ModificationWatermark,
        reason: ProcessReason,
    ) -> SyncResult<SyncedDataset> {
        catch_unwind(AssertUnwindSafe(|| self.run_unit(descriptor, watermarks, reason)))
            .unwrap_or_else(|payload| {
                Err(SyncError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            })
    }

    fn run_unit(
        &self,
        descriptor: &DatasetDescriptor,
        watermarks: &ModificationWatermark,
        reason: ProcessReason,
    ) -> SyncResult<SyncedDataset> {
        let dataset_id = descriptor.dataset_id();
        info!(dataset_id = %dataset_id, ?reason, source_modified = %watermarks.source_modified, "processing dataset");

        let staging = self.staging.acquire(&dataset_id)?;
        let result = self.process(descriptor, watermarks, reason, &staging);
        self.staging.release(staging);
        result
    }

    fn process(
        &self,
        descriptor: &DatasetDescriptor,
        watermarks: &ModificationWatermark,
        reason: ProcessReason,
        staging: &StagingDirectory,
    ) -> SyncResult<SyncedDataset> {
        let dataset_id = descriptor.dataset_id();
        let mut failures: Vec<ArtifactFailure> = Vec::new();

        let files = self.source.fetch(descriptor, staging.download())?;
        let inputs = expand_archives(files, staging.download(), &mut failures);

        let mut artifacts = ArtifactSet::new();
        for (path, options) in inputs {
            match convert_into(&path, options, staging.converted()) {
                Ok(converted) => artifacts.insert(staging.promote(&converted)?)?,
                Err(e) => {
                    warn!(dataset_id = %dataset_id, path = %path.display(), error = %e, "conversion failed");
                    failures.push(ArtifactFailure {
                        path,
                        error: e.into(),
                    });
                }
            }
        }
        if artifacts.is_empty() {
            return Err(SyncError::NoArtifacts { dataset: dataset_id });
        }

        let folder = self.publish_config.folder_for(descriptor);
        let mut uploaded: Vec<Artifact> = Vec::with_capacity(artifacts.len());
        for artifact in artifacts.iter_mut() {
            match self.uploader.upload(artifact, &folder) {
                Ok(_) => uploaded.push(artifact.clone()),
                Err(e) => {
                    warn!(dataset_id = %dataset_id, table_id = %artifact.logical_table_name, error = %e, "upload failed");
                    failures.push(ArtifactFailure {
                        path: artifact.local_path.clone(),
                        error: e.into(),
                    });
                }
            }
        }
        if uploaded.is_empty() {
            // Publishing nothing would replace the dataset with an empty one.
            return Err(failures
                .pop()
                .map(|f| f.error)
                .unwrap_or(SyncError::NoArtifacts { dataset: dataset_id }));
        }

        let watermark = failures
            .is_empty()
            .then(|| watermarks.source_modified.clone());
        let request = PublishRequest::from_artifacts(&descriptor.id, &uploaded)
            .with_source(descriptor.source.clone())
            .with_description(describe(descriptor))
            .with_watermark(watermark);
        let report = self.publisher.publish(&request)?;

        Ok(SyncedDataset {
            dataset_id,
            reason,
            watermarks: watermarks.clone(),
            artifacts: uploaded,
            artifact_failures: failures,
            report,
        })
    }

    fn notify(&self, report: &BatchReport) {
        let Some(observer) = &self.observer else {
            return;
        };
        for DatasetOutcome { descriptor, outcome } in &report.outcomes {
            match outcome {
                Outcome::Synced(synced) => observer.on_synced(descriptor, synced),
                Outcome::Skipped(reason) => observer.on_skipped(descriptor, reason),
                Outcome::Failed(error) => {
                    let severity = severity_for_error(error);
                    if severity >= self.alert_threshold {
                        observer.on_alert(descriptor, severity, error);
                    } else {
                        observer.on_failed(descriptor, severity, error);
                    }
                }
            }
        }
    }
}

// Replace each archive by the convertible files inside it, carrying the archive's options.
fn expand_archives(
    files: Vec<SourceFile>,
    download_dir: &Path,
    failures: &mut Vec<ArtifactFailure>,
) -> Vec<(PathBuf, Option<FormatOptions>)> {
    let mut inputs = Vec::with_capacity(files.len());
    for file in files {
        if !convert::is_archive(&file.path) {
            inputs.push((file.path, file.options));
            continue;
        }
        let stem = file
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        match convert::extract_archive(&file.path, &download_dir.join(stem)) {
            Ok(paths) => inputs.extend(paths.into_iter().map(|p| (p, file.options.clone()))),
            Err(e) => failures.push(ArtifactFailure {
                path: file.path,
                error: e.into(),
            }),
        }
    }
    inputs
}

fn convert_into(
    path: &Path,
    options: Option<FormatOptions>,
    out_dir: &Path,
) -> Result<PathBuf, ConvertError> {
    let options = match options {
        Some(options) => options,
        None => FormatOptions::for_path(path)?,
    };
    let output = convert::output_path_for(path, &options, out_dir);
    convert::convert(path, output, &options)
}

fn describe(descriptor: &DatasetDescriptor) -> String {
    let publisher = descriptor.source.as_deref().unwrap_or("unknown publisher");
    let hosting = if descriptor.third_party {
        "third-party"
    } else {
        "first-party"
    };
    format!(
        "{} from {publisher} ({hosting}, OData {})",
        descriptor.id, descriptor.odata_version
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_messages_are_extracted() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn description_mentions_publisher_and_version() {
        let d = DatasetDescriptor::new("83583NED").with_source("cbs");
        assert_eq!(describe(&d), "83583NED from cbs (first-party, OData v3)");
    }

    #[test]
    fn batch_report_counts() {
        let report = BatchReport {
            outcomes: vec![
                DatasetOutcome {
                    descriptor: DatasetDescriptor::new("a"),
                    outcome: Outcome::Failed(SyncError::NoArtifacts { dataset: "a".into() }),
                },
                DatasetOutcome {
                    descriptor: DatasetDescriptor::new("b").with_source("cbs"),
                    outcome: Outcome::Failed(SyncError::NoArtifacts { dataset: "b".into() }),
                },
            ],
        };
        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.synced_count(), 0);
        assert!(report.get("cbs_b").is_some_and(Outcome::is_failed));
        assert!(report.get("b").is_none());
    }
}
