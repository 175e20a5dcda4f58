//! Per-dataset outcome hooks.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::error::{ConvertError, PublishError, SyncError, UploadError};
use crate::model::DatasetDescriptor;
use crate::orchestrator::SyncedDataset;
use crate::staleness::SkipReason;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (unit failed).
    Error,
    /// Critical error (I/O or other infrastructure failures).
    Critical,
}

/// Classify a unit failure.
///
/// Local filesystem and storage failures are `Critical`; bad input data is `Error`; a source
/// without a watermark is a `Warning`.
pub fn severity_for_error(error: &SyncError) -> SyncSeverity {
    use crate::error::SourceError;

    match error {
        SyncError::Staging(_) | SyncError::Panicked { .. } => SyncSeverity::Critical,
        SyncError::Convert(ConvertError::Io(_)) => SyncSeverity::Critical,
        SyncError::Upload(UploadError::Store(_) | UploadError::Io(_)) => SyncSeverity::Critical,
        SyncError::Publish(PublishError::Store(_)) => SyncSeverity::Critical,
        SyncError::Source(SourceError::MissingModified { .. }) => SyncSeverity::Warning,
        SyncError::Source(SourceError::Io(_)) => SyncSeverity::Critical,
        _ => SyncSeverity::Error,
    }
}

/// Observer interface for per-dataset outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait SyncObserver: Send + Sync {
    /// Called when a dataset was published.
    fn on_synced(&self, _descriptor: &DatasetDescriptor, _synced: &SyncedDataset) {}

    /// Called when a dataset was up to date.
    fn on_skipped(&self, _descriptor: &DatasetDescriptor, _reason: &SkipReason) {}

    /// Called when a dataset's unit failed.
    fn on_failed(&self, _descriptor: &DatasetDescriptor, _severity: SyncSeverity, _error: &SyncError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failed`].
    fn on_alert(&self, descriptor: &DatasetDescriptor, severity: SyncSeverity, error: &SyncError) {
        self.on_failed(descriptor, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn SyncObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn SyncObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl SyncObserver for CompositeObserver {
    fn on_synced(&self, descriptor: &DatasetDescriptor, synced: &SyncedDataset) {
        for o in &self.observers {
            o.on_synced(descriptor, synced);
        }
    }

    fn on_skipped(&self, descriptor: &DatasetDescriptor, reason: &SkipReason) {
        for o in &self.observers {
            o.on_skipped(descriptor, reason);
        }
    }

    fn on_failed(&self, descriptor: &DatasetDescriptor, severity: SyncSeverity, error: &SyncError) {
        for o in &self.observers {
            o.on_failed(descriptor, severity, error);
        }
    }

    fn on_alert(&self, descriptor: &DatasetDescriptor, severity: SyncSeverity, error: &SyncError) {
        for o in &self.observers {
            o.on_alert(descriptor, severity, error);
        }
    }
}

/// Emits outcomes as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_synced(&self, descriptor: &DatasetDescriptor, synced: &SyncedDataset) {
        info!(
            dataset_id = %descriptor.dataset_id(),
            tables = synced.report.linked.len(),
            artifact_failures = synced.artifact_failures.len(),
            "dataset synced"
        );
    }

    fn on_skipped(&self, descriptor: &DatasetDescriptor, reason: &SkipReason) {
        info!(dataset_id = %descriptor.dataset_id(), reason = %reason, "dataset skipped");
    }

    fn on_failed(&self, descriptor: &DatasetDescriptor, severity: SyncSeverity, err: &SyncError) {
        warn!(dataset_id = %descriptor.dataset_id(), ?severity, error = %err, "dataset failed");
    }

    fn on_alert(&self, descriptor: &DatasetDescriptor, severity: SyncSeverity, err: &SyncError) {
        error!(dataset_id = %descriptor.dataset_id(), ?severity, error = %err, "ALERT: dataset failed");
    }
}

/// Appends outcomes to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl SyncObserver for FileObserver {
    fn on_synced(&self, descriptor: &DatasetDescriptor, synced: &SyncedDataset) {
        self.append_line(&format!(
            "{} synced dataset={} tables={} artifact_failures={}",
            timestamp(),
            descriptor.dataset_id(),
            synced.report.linked.len(),
            synced.artifact_failures.len()
        ));
    }

    fn on_skipped(&self, descriptor: &DatasetDescriptor, reason: &SkipReason) {
        self.append_line(&format!(
            "{} skipped dataset={} reason={reason}",
            timestamp(),
            descriptor.dataset_id()
        ));
    }

    fn on_failed(&self, descriptor: &DatasetDescriptor, severity: SyncSeverity, err: &SyncError) {
        self.append_line(&format!(
            "{} fail severity={severity:?} dataset={} err={err}",
            timestamp(),
            descriptor.dataset_id()
        ));
    }

    fn on_alert(&self, descriptor: &DatasetDescriptor, severity: SyncSeverity, err: &SyncError) {
        self.append_line(&format!(
            "{} ALERT severity={severity:?} dataset={} err={err}",
            timestamp(),
            descriptor.dataset_id()
        ));
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
