//! Dataset sources: where watermarks and source files come from.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::convert::FormatOptions;
use crate::error::{SourceError, SourceResult};
use crate::model::{DatasetDescriptor, Watermark};

/// One downloaded source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Conversion options; `None` uses the defaults for the file's format. For a `.zip`, the
    /// options apply to every file inside it.
    pub options: Option<FormatOptions>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: FormatOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Catalog access for one publisher of datasets.
pub trait DatasetSource: Send + Sync {
    /// The `Modified` value currently published for the dataset.
    fn source_modified(&self, descriptor: &DatasetDescriptor) -> SourceResult<Watermark>;

    /// Download the dataset's files into `download_dir`.
    fn fetch(&self, descriptor: &DatasetDescriptor, download_dir: &Path) -> SourceResult<Vec<SourceFile>>;
}

#[derive(Debug, Clone)]
struct StaticEntry {
    modified: Option<Watermark>,
    files: Vec<SourceFile>,
}

/// [`DatasetSource`] backed by local files, keyed by warehouse dataset id.
///
/// `fetch` copies the registered files into the download directory.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    entries: BTreeMap<String, StaticEntry>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset with its published `Modified` value and local files.
    pub fn with_dataset(
        mut self,
        descriptor: &DatasetDescriptor,
        modified: impl Into<Watermark>,
        files: Vec<SourceFile>,
    ) -> Self {
        self.entries.insert(
            descriptor.dataset_id(),
            StaticEntry {
                modified: Some(modified.into()),
                files,
            },
        );
        self
    }

    /// Register a dataset whose metadata carries no `Modified` value.
    pub fn with_unversioned_dataset(mut self, descriptor: &DatasetDescriptor, files: Vec<SourceFile>) -> Self {
        self.entries.insert(
            descriptor.dataset_id(),
            StaticEntry {
                modified: None,
                files,
            },
        );
        self
    }

    fn entry(&self, descriptor: &DatasetDescriptor) -> SourceResult<&StaticEntry> {
        self.entries
            .get(&descriptor.dataset_id())
            .ok_or_else(|| SourceError::NotFound {
                id: descriptor.id.clone(),
            })
    }
}

impl DatasetSource for StaticSource {
    fn source_modified(&self, descriptor: &DatasetDescriptor) -> SourceResult<Watermark> {
        self.entry(descriptor)?
            .modified
            .clone()
            .ok_or_else(|| SourceError::MissingModified {
                id: descriptor.id.clone(),
            })
    }

    fn fetch(&self, descriptor: &DatasetDescriptor, download_dir: &Path) -> SourceResult<Vec<SourceFile>> {
        let entry = self.entry(descriptor)?;
        fs::create_dir_all(download_dir)?;
        let mut out = Vec::with_capacity(entry.files.len());
        for file in &entry.files {
            let name = file.path.file_name().ok_or_else(|| SourceError::Api {
                message: format!("source path has no file name: {}", file.path.display()),
            })?;
            let dest = download_dir.join(name);
            fs::copy(&file.path, &dest)?;
            out.push(SourceFile {
                path: dest,
                options: file.options.clone(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_copies_registered_files() {
        let src = tempfile::tempdir().unwrap();
        let dl = tempfile::tempdir().unwrap();
        let file = src.path().join("a.csv");
        fs::write(&file, "x\n1\n").unwrap();

        let d = DatasetDescriptor::new("83583NED").with_source("cbs");
        let source = StaticSource::new().with_dataset(&d, "2021-05-01", vec![SourceFile::new(&file)]);
        assert_eq!(source.source_modified(&d).unwrap().as_str(), "2021-05-01");

        let fetched = source.fetch(&d, dl.path()).unwrap();
        assert_eq!(fetched[0].path, dl.path().join("a.csv"));
        assert!(file.exists());
        assert!(fetched[0].path.exists());
    }

    #[test]
    fn unknown_and_unversioned_datasets_fail() {
        let d = DatasetDescriptor::new("x");
        let source = StaticSource::new();
        assert!(matches!(source.source_modified(&d), Err(SourceError::NotFound { .. })));

        let source = StaticSource::new().with_unversioned_dataset(&d, vec![]);
        assert!(matches!(
            source.source_modified(&d),
            Err(SourceError::MissingModified { .. })
        ));
    }
}
