//! # dfs-blobstore
//!
//! The blobstore side of a decomposed filesystem: node metadata only carries
//! a blob ID, the content lives here.
//!
//! ## Layouts
//!
//! ```text
//! ocis (inside the storage tree):
//! <base>/spaces/ab/cdef.../blobs/12/34/56/78/-9abc-...
//!
//! s3ng (bucket mounted or mirrored locally, object key = path):
//! <bucket>/abcdef.../12/34/56/78/-9abc-...
//! ```
//!
//! Both implement [`Blobstore`], the only interface the audit engines see.

pub mod layout;
mod ocis;
mod s3ng;

pub use layout::{blob_shard_path, pathify, pathify_segments};
pub use ocis::OcisBlobstore;
pub use s3ng::S3ngBlobstore;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use dfs_config::log_blobstore_warn;
use thiserror::Error;

/// Errors that can occur during blobstore operations
#[derive(Error, Debug)]
pub enum BlobstoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Blob not found: {blob_id} (space {space_id})")]
    NotFound { blob_id: String, space_id: String },

    #[error("Unsupported blobstore type '{0}' (expected ocis, s3ng or none)")]
    UnsupportedKind(String),

    #[error("s3ng blobstore needs a bucket path")]
    MissingBucketPath,
}

pub type Result<T> = std::result::Result<T, BlobstoreError>;

/// Identifies one blob: its ID plus the space it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobHandle {
    pub blob_id: String,
    pub space_id: String,
}

impl BlobHandle {
    pub fn new(blob_id: impl Into<String>, space_id: impl Into<String>) -> Self {
        Self {
            blob_id: blob_id.into(),
            space_id: space_id.into(),
        }
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.blob_id, self.space_id)
    }
}

/// Blob storage as seen by the consistency checker and the revision purge.
pub trait Blobstore: Send + Sync {
    /// Every blob currently stored
    fn list(&self) -> Result<Vec<BlobHandle>>;

    /// Absolute filesystem location of a blob (whether or not it exists)
    fn path(&self, blob: &BlobHandle) -> PathBuf;

    /// Remove a blob
    fn delete(&self, blob: &BlobHandle) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Blobstore selection as given on the command line or in config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobstoreKind {
    Ocis,
    S3ng,
    None,
}

impl FromStr for BlobstoreKind {
    type Err = BlobstoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ocis" => Ok(BlobstoreKind::Ocis),
            "s3ng" => Ok(BlobstoreKind::S3ng),
            "none" => Ok(BlobstoreKind::None),
            other => Err(BlobstoreError::UnsupportedKind(other.to_string())),
        }
    }
}

impl fmt::Display for BlobstoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobstoreKind::Ocis => write!(f, "ocis"),
            BlobstoreKind::S3ng => write!(f, "s3ng"),
            BlobstoreKind::None => write!(f, "none"),
        }
    }
}

/// Build the blobstore for `kind`.
///
/// Returns `Ok(None)` for [`BlobstoreKind::None`]: callers then skip all blob
/// handling. The store is shared with crawler threads, hence the `Arc`.
pub fn open(
    kind: BlobstoreKind,
    base_path: &Path,
    bucket_path: Option<&Path>,
) -> Result<Option<Arc<dyn Blobstore>>> {
    match kind {
        BlobstoreKind::Ocis => Ok(Some(Arc::new(OcisBlobstore::new(base_path)))),
        BlobstoreKind::S3ng => {
            let bucket = bucket_path.ok_or(BlobstoreError::MissingBucketPath)?;
            if !bucket.is_dir() {
                return Err(BlobstoreError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("bucket path {} is not a directory", bucket.display()),
                )));
            }
            Ok(Some(Arc::new(S3ngBlobstore::new(bucket))))
        }
        BlobstoreKind::None => Ok(None),
    }
}

/// Remove a blob file, mapping a missing file to [`BlobstoreError::NotFound`].
pub(crate) fn remove_blob_file(path: &Path, blob: &BlobHandle) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobstoreError::NotFound {
            blob_id: blob.blob_id.clone(),
            space_id: blob.space_id.clone(),
        }),
        Err(e) => Err(BlobstoreError::Io(e)),
    }
}

/// Directories directly below `dir`.
///
/// Only a failure to open `dir` itself is an error. Entries that cannot be
/// read are logged and skipped.
pub(crate) fn read_subdirs(dir: &Path) -> io::Result<Vec<std::fs::DirEntry>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log_blobstore_warn!(
                    "Skipping unreadable directory entry",
                    path = tracing::field::display(dir.display()),
                    error = tracing::field::display(&e)
                );
                continue;
            }
        };
        match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => dirs.push(entry),
            Ok(_) => {}
            Err(e) => log_blobstore_warn!(
                "Skipping entry of unknown type",
                path = tracing::field::display(entry.path().display()),
                error = tracing::field::display(&e)
            ),
        }
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_parse() {
        assert_eq!("ocis".parse::<BlobstoreKind>().unwrap(), BlobstoreKind::Ocis);
        assert_eq!("S3NG".parse::<BlobstoreKind>().unwrap(), BlobstoreKind::S3ng);
        assert_eq!("none".parse::<BlobstoreKind>().unwrap(), BlobstoreKind::None);
        assert!(matches!(
            "s3".parse::<BlobstoreKind>(),
            Err(BlobstoreError::UnsupportedKind(_))
        ));
    }

    #[test]
    fn test_open_none_has_no_store() {
        let temp = TempDir::new().unwrap();
        assert!(open(BlobstoreKind::None, temp.path(), None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_open_s3ng_requires_bucket() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            open(BlobstoreKind::S3ng, temp.path(), None),
            Err(BlobstoreError::MissingBucketPath)
        ));
        let store = open(BlobstoreKind::S3ng, temp.path(), Some(temp.path()))
            .unwrap()
            .unwrap();
        assert_eq!(store.name(), "s3ng");
    }

    #[test]
    fn test_handle_display() {
        let h = BlobHandle::new("b1", "s1");
        assert_eq!(h.to_string(), "b1@s1");
    }
}
