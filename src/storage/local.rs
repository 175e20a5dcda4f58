use std::fs;
use std::path::{Path, PathBuf};

use futures::executor::block_on;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::storage::BlobStore;

/// Filesystem-backed [`BlobStore`] on top of `object_store`'s local backend: object `key` lives
/// at `<root>/<key>`.
///
/// Calls are driven to completion on the calling thread. Without a tokio runtime the local
/// backend performs its file I/O inline.
#[derive(Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
    bucket: String,
    inner: LocalFileSystem,
}

impl LocalBlobStore {
    /// Open (and create if needed) the store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> StoreResult<Self> {
        let root = root.into();
        let root_key = root.display().to_string();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            key: root_key.clone(),
            source,
        })?;
        let inner = LocalFileSystem::new_with_prefix(&root).map_err(|source| StoreError::Backend {
            key: root_key,
            source,
        })?;
        Ok(Self {
            root,
            bucket: bucket.into(),
            inner,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn location(&self, key: &str) -> StoreResult<ObjectPath> {
        let invalid = || StoreError::InvalidKey {
            key: key.to_string(),
        };
        if key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(invalid());
        }
        ObjectPath::parse(key).map_err(|_| invalid())
    }
}

impl BlobStore for LocalBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn put_file(&self, local: &Path, key: &str) -> StoreResult<String> {
        let location = self.location(key)?;
        let bytes = fs::read(local).map_err(|source| StoreError::Io {
            key: key.to_string(),
            source,
        })?;
        let size = bytes.len();
        block_on(self.inner.put(&location, PutPayload::from(bytes))).map_err(|source| {
            StoreError::Backend {
                key: key.to_string(),
                source,
            }
        })?;
        debug!(key, bytes = size, "stored object");
        Ok(self.uri(key))
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let location = self.location(key)?;
        match block_on(self.inner.head(&location)) {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(StoreError::Backend {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        // object_store lists whole path segments; narrow to the parent directory, then filter
        // on the raw string prefix.
        let dir = match prefix.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => Some(self.location(dir)?),
            _ => None,
        };
        let backend = |source| StoreError::Backend {
            key: prefix.to_string(),
            source,
        };
        let objects: Vec<_> = block_on(self.inner.list(dir.as_ref()).try_collect()).map_err(backend)?;
        let mut keys: Vec<String> = objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_list_and_uri() {
        let root = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let file = src.path().join("a.parquet");
        fs::write(&file, b"data").unwrap();

        let store = LocalBlobStore::new(root.path(), "dataverbinders-dev").unwrap();
        let uri = store.put_file(&file, "cbs/v3/x/a.parquet").unwrap();
        assert_eq!(uri, "gs://dataverbinders-dev/cbs/v3/x/a.parquet");
        assert!(store.exists("cbs/v3/x/a.parquet").unwrap());
        assert!(!store.exists("cbs/v3/x/b.parquet").unwrap());
        assert_eq!(store.list("cbs/v3/").unwrap(), vec!["cbs/v3/x/a.parquet"]);
        assert_eq!(store.list("cbs/v3/x/a").unwrap(), vec!["cbs/v3/x/a.parquet"]);
        assert!(store.list("mlz/").unwrap().is_empty());
        assert_eq!(store.key_for_uri(&uri).as_deref(), Some("cbs/v3/x/a.parquet"));
        assert_eq!(store.key_for_uri("gs://other/cbs/a.parquet"), None);
    }

    #[test]
    fn put_overwrites_existing_object() {
        let root = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let file = src.path().join("a.json");
        let store = LocalBlobStore::new(root.path(), "b").unwrap();
        fs::write(&file, b"one").unwrap();
        store.put_file(&file, "k/a.json").unwrap();
        fs::write(&file, b"two").unwrap();
        store.put_file(&file, "k/a.json").unwrap();
        assert_eq!(fs::read(root.path().join("k/a.json")).unwrap(), b"two");
    }

    #[test]
    fn invalid_keys_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(root.path(), "b").unwrap();
        assert!(matches!(store.exists("../x"), Err(StoreError::InvalidKey { .. })));
        assert!(matches!(store.exists(""), Err(StoreError::InvalidKey { .. })));
        assert!(matches!(store.exists("a//b"), Err(StoreError::InvalidKey { .. })));
    }

    #[test]
    fn missing_local_file_is_an_io_error() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(root.path(), "b").unwrap();
        let err = store
            .put_file(&root.path().join("absent.parquet"), "k/absent.parquet")
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
