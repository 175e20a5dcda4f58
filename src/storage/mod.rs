//! Remote blob storage.
//!
//! [`BlobStore`] is the seam to a concrete object store; [`LocalBlobStore`] keeps objects on the
//! local filesystem and hands out `gs://<bucket>/<key>` URIs.

mod local;

use std::path::{Component, Path};

use crate::error::{StoreError, StoreResult};

pub use local::LocalBlobStore;

/// URI scheme of published objects.
pub const URI_SCHEME: &str = "gs://";

/// Object storage used by the uploader, the publisher and the warehouse.
pub trait BlobStore: Send + Sync {
    /// Bucket the store writes to.
    fn bucket(&self) -> &str;

    /// Upload `local` as object `key`, overwriting unconditionally. Returns the object URI.
    fn put_file(&self, local: &Path, key: &str) -> StoreResult<String>;

    /// Whether object `key` exists.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// URI of object `key`.
    fn uri(&self, key: &str) -> String {
        format!("{URI_SCHEME}{}/{key}", self.bucket())
    }

    /// Object key of `uri` if it points into this store's bucket.
    fn key_for_uri(&self, uri: &str) -> Option<String> {
        uri.strip_prefix(URI_SCHEME)?
            .strip_prefix(self.bucket())?
            .strip_prefix('/')
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

/// Object key for `relative` below `folder`: `folder` without trailing `/`, then `/`, then the
/// relative path with `/` separators.
pub fn object_key(folder: &str, relative: &Path) -> StoreResult<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(StoreError::InvalidKey {
                    key: relative.to_string_lossy().into_owned(),
                });
            }
        }
    }
    if parts.is_empty() {
        return Err(StoreError::InvalidKey {
            key: relative.to_string_lossy().into_owned(),
        });
    }
    let tail = parts.join("/");
    let folder = folder.trim_end_matches('/');
    Ok(if folder.is_empty() {
        tail
    } else {
        format!("{folder}/{tail}")
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn object_key_joins_folder_and_relative_path() {
        assert_eq!(
            object_key("cbs/v3/83583NED/", Path::new("kwb_2019.parquet")).unwrap(),
            "cbs/v3/83583NED/kwb_2019.parquet"
        );
        assert_eq!(
            object_key("folder", &PathBuf::from("sub").join("a.json")).unwrap(),
            "folder/sub/a.json"
        );
        assert_eq!(object_key("", Path::new("a.parquet")).unwrap(), "a.parquet");
    }

    #[test]
    fn object_key_rejects_escaping_paths() {
        assert!(object_key("f", Path::new("../a.parquet")).is_err());
        assert!(object_key("f", Path::new("")).is_err());
    }
}
