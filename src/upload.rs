//! Copies staged artifacts to the blob store.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{UploadError, UploadResult};
use crate::model::Artifact;
use crate::storage::{object_key, BlobStore};

/// Uploads artifacts below a destination folder.
#[derive(Clone)]
pub struct ObjectStoreUploader {
    store: Arc<dyn BlobStore>,
}

impl ObjectStoreUploader {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Upload `artifact` to `<destination_folder>/<relative_path>` and record the URIs on it.
    ///
    /// A directory artifact uploads every regular file beneath it, one object per file, keyed
    /// by its path below the artifact's relative path. Objects are overwritten unconditionally.
    pub fn upload(&self, artifact: &mut Artifact, destination_folder: &str) -> UploadResult<Vec<String>> {
        if !artifact.local_path.exists() {
            return Err(UploadError::MissingLocal {
                path: artifact.local_path.clone(),
            });
        }

        let mut uris = Vec::new();
        if artifact.local_path.is_dir() {
            let mut files: Vec<PathBuf> = Vec::new();
            for entry in WalkDir::new(&artifact.local_path) {
                let entry = entry.map_err(std::io::Error::from)?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
            files.sort();
            for file in files {
                let below = file
                    .strip_prefix(&artifact.local_path)
                    .map(|p| artifact.relative_path.join(p))
                    .unwrap_or_else(|_| artifact.relative_path.clone());
                let key = object_key(destination_folder, &below)?;
                uris.push(self.store.put_file(&file, &key)?);
                debug!(key = %key, "uploaded object");
            }
        } else {
            let key = object_key(destination_folder, &artifact.relative_path)?;
            uris.push(self.store.put_file(&artifact.local_path, &key)?);
        }

        info!(
            table_id = %artifact.logical_table_name,
            objects = uris.len(),
            folder = destination_folder,
            "uploaded artifact"
        );
        artifact.remote_uris = uris.clone();
        Ok(uris)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::storage::LocalBlobStore;

    #[test]
    fn uploads_file_and_directory_artifacts() {
        let bucket = tempfile::tempdir().unwrap();
        let staged = tempfile::tempdir().unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(bucket.path(), "b").unwrap());
        let uploader = ObjectStoreUploader::new(store);

        let file = staged.path().join("kwb_2019.parquet");
        fs::write(&file, b"x").unwrap();
        let mut a = Artifact::new(staged.path(), &file);
        let uris = uploader.upload(&mut a, "cbs/v3/kwb/").unwrap();
        assert_eq!(uris, vec!["gs://b/cbs/v3/kwb/kwb_2019.parquet"]);
        assert!(a.is_uploaded());

        let dir = staged.path().join("pc6");
        fs::create_dir_all(dir.join("part")).unwrap();
        fs::write(dir.join("part").join("0.parquet"), b"0").unwrap();
        fs::write(dir.join("1.parquet"), b"1").unwrap();
        let mut d = Artifact::new(staged.path(), &dir);
        let uris = uploader.upload(&mut d, "f").unwrap();
        assert_eq!(uris, vec!["gs://b/f/pc6/1.parquet", "gs://b/f/pc6/part/0.parquet"]);
    }

    #[test]
    fn missing_local_path_fails() {
        let bucket = tempfile::tempdir().unwrap();
        let uploader = ObjectStoreUploader::new(Arc::new(LocalBlobStore::new(bucket.path(), "b").unwrap()));
        let mut a = Artifact::new(bucket.path(), bucket.path().join("gone.parquet"));
        assert!(matches!(
            uploader.upload(&mut a, "f"),
            Err(UploadError::MissingLocal { .. })
        ));
        assert!(!a.is_uploaded());
    }
}
