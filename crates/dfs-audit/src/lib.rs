//! # dfs-audit
//!
//! Offline auditing of a decomposed filesystem tree.
//!
//! Three engines share one on-disk grammar ([`grammar`]) and one shape:
//! crawler threads stream typed events over unbuffered channels to a single
//! consumer that reconciles or purges.
//!
//! - [`consistency`]: report orphaned or missing nodes, symlinks, metadata
//!   and blobs (read-only)
//! - [`revisions`]: delete `.REV.` siblings and the blobs they own
//! - [`trash`]: delete trash links whose trashed node is gone
//! - [`treesize`]: recompute container tree sizes and compare them with the
//!   recorded ones (read-only, single threaded)
//!
//! ```text
//! <base>/spaces/ab/cdef.../
//!   nodes/12/34/56/78/-9abc...            node (file or container dir)
//!   nodes/12/34/56/78/-9abc....mpk        metadata
//!   nodes/12/34/56/78/-9abc....REV.<ts>   revision
//!   nodes/12/34/56/78/-9abc....T.<ts>     trashed node
//!   trash/12/34/56/78/-9abc...            -> ../../../../../nodes/...T.<ts>
//!   blobs/fe/dc/ba/98/-7654...            blob (ocis)
//! ```

pub mod cancel;
pub mod consistency;
pub mod grammar;
pub mod metadata;
pub mod revisions;
pub mod testing;
pub mod trash;
pub mod treesize;

pub use cancel::CancelToken;
pub use consistency::{check, Inconsistency, Report};
pub use metadata::MetadataError;
pub use revisions::{purge_revisions, PurgeStats, RevisionEntry, Strategy};
pub use trash::{purge_orphaned_trash, AbandonedEntry, TrashPurgeStats};
pub use treesize::{check_treesize, TreeSizeMismatch, TreeSizeReport};

use std::io;
use std::path::{Path, PathBuf};

use dfs_blobstore::BlobstoreError;
use thiserror::Error;

/// Errors that abort an audit run.
///
/// Per-entry problems never end up here: they are logged and skipped.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Blobstore error: {0}")]
    Blobstore(#[from] BlobstoreError),

    #[error("no backup found: no spaces under {root}")]
    NoSpacesFound { root: PathBuf },

    #[error("invalid base path {path}: {reason}")]
    InvalidBasePath { path: PathBuf, reason: String },

    #[error("Metadata error in {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },

    #[error("can not find node '{0}'")]
    NodeNotFound(String),

    #[error("{path} is not a container")]
    NotAContainer { path: PathBuf },

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Fail early when `root` cannot be a storage base path.
///
/// Returns `root` lexically cleaned. Crawlers walk the cleaned root so the
/// paths they emit compare equal to resolved link targets.
pub(crate) fn ensure_root(root: &Path) -> Result<PathBuf> {
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(grammar::clean(root)),
        Ok(_) => Err(AuditError::InvalidBasePath {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        }),
        Err(e) => Err(AuditError::InvalidBasePath {
            path: root.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}
