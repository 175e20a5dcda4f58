//! Disposable local working directories, one per synchronization run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StagingError, StagingResult};
use crate::model::{sanitize_table_name, Artifact};

const DOWNLOAD_DIR: &str = "download";
const CONVERTED_DIR: &str = "converted";
const UPLOAD_DIR: &str = "upload";

/// Creates [`StagingDirectory`]s below a parent directory.
#[derive(Debug, Clone)]
pub struct StagingArea {
    parent: PathBuf,
}

impl StagingArea {
    pub fn new(parent: impl Into<PathBuf>) -> Self {
        Self {
            parent: parent.into(),
        }
    }

    pub fn parent(&self) -> &Path {
        &self.parent
    }

    /// Create `<parent>/<run_name>-<uuid>` with `download`, `converted` and `upload` subfolders.
    ///
    /// Path separators in `run_name` are replaced so the directory is always a direct child of
    /// the parent.
    pub fn acquire(&self, run_name: &str) -> StagingResult<StagingDirectory> {
        let safe_name: String = run_name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        let root = self.parent.join(format!("{safe_name}-{}", Uuid::new_v4()));
        let dir = StagingDirectory {
            download: root.join(DOWNLOAD_DIR),
            converted: root.join(CONVERTED_DIR),
            upload: root.join(UPLOAD_DIR),
            root,
            released: false,
        };
        for path in [&dir.download, &dir.converted, &dir.upload] {
            fs::create_dir_all(path).map_err(|source| StagingError::DirectoryCreation {
                path: path.clone(),
                source,
            })?;
        }
        debug!(path = %dir.root.display(), "acquired staging directory");
        Ok(dir)
    }

    /// Delete `dir` recursively. Errors are logged and swallowed.
    pub fn release(&self, dir: StagingDirectory) {
        dir.release();
    }
}

/// A staging directory owned by exactly one run.
///
/// Dropping it without calling [`StagingDirectory::release`] still removes it.
#[derive(Debug)]
pub struct StagingDirectory {
    root: PathBuf,
    download: PathBuf,
    converted: PathBuf,
    upload: PathBuf,
    released: bool,
}

impl StagingDirectory {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where sources are fetched to (and archives extracted).
    pub fn download(&self) -> &Path {
        &self.download
    }

    /// Where converted files are written.
    pub fn converted(&self) -> &Path {
        &self.converted
    }

    /// Where uploadable artifacts live under their final names.
    pub fn upload(&self) -> &Path {
        &self.upload
    }

    /// Move a converted file into the upload area under its sanitized table name and describe it
    /// as an [`Artifact`].
    ///
    /// Fails with [`StagingError::DuplicateTableName`] if another artifact already took the name.
    pub fn promote(&self, converted: &Path) -> StagingResult<Artifact> {
        let stem = converted
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = match converted.extension() {
            Some(ext) => format!("{}.{}", sanitize_table_name(&stem), ext.to_string_lossy()),
            None => sanitize_table_name(&stem),
        };
        let target = self.upload.join(file_name);
        if target.exists() {
            return Err(StagingError::DuplicateTableName {
                table: sanitize_table_name(&stem),
                first: target,
                second: converted.to_path_buf(),
            });
        }
        fs::rename(converted, &target)?;
        Ok(Artifact::new(&self.upload, target))
    }

    /// Delete the directory tree. Errors are logged and swallowed.
    pub fn release(mut self) {
        self.remove();
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(path = %self.root.display(), "released staging directory"),
            Err(e) => warn!(path = %self.root.display(), error = %e, "failed to remove staging directory"),
        }
    }
}

impl Drop for StagingDirectory {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Artifacts of one staging directory, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    by_table: BTreeMap<String, Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact; its table name must be new to the set.
    pub fn insert(&mut self, artifact: Artifact) -> StagingResult<()> {
        if let Some(existing) = self.by_table.get(&artifact.logical_table_name) {
            return Err(StagingError::DuplicateTableName {
                table: artifact.logical_table_name.clone(),
                first: existing.local_path.clone(),
                second: artifact.local_path,
            });
        }
        self.by_table
            .insert(artifact.logical_table_name.clone(), artifact);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_table.is_empty()
    }

    /// Artifacts ordered by table name.
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.by_table.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Artifact> {
        self.by_table.values_mut()
    }

    pub fn into_vec(self) -> Vec<Artifact> {
        self.by_table.into_values().collect()
    }
}
