//! Revision purge.
//!
//! A scanner thread finds `.REV.` entries with one of three interchangeable
//! [`Strategy`]s and streams them to the executor, which deletes the owned
//! blob first and the file second.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, Sender};
use dfs_blobstore::{BlobHandle, Blobstore, BlobstoreError};
use dfs_config::{log_revisions_error, log_revisions_info, log_revisions_warn};
use walkdir::WalkDir;

use crate::grammar::{ids_from_path, is_revision, EntryKind, NODES_DIR, SPACES_DIR};
use crate::{metadata, AuditError, CancelToken, Result};

/// Glob matching every entry next to the nodes, relative to the base path
pub const REVISION_GLOB: &str = "spaces/*/*/nodes/*/*/*/*/*";

/// Depth of node entries below `spaces/` (`ab/cdef/nodes/aa/bb/cc/dd/<rest>`)
const ENTRY_DEPTH: usize = 8;
/// Depth of `nodes`, `blobs`, `trash` below `spaces/`
const SPACE_CHILD_DEPTH: usize = 3;

/// How revision candidates are found. All three yield the same set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// One glob expansion of [`REVISION_GLOB`]
    #[default]
    Glob,
    /// `walkdir` over the space tree
    Walk,
    /// Hand-written `read_dir` recursion
    List,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Glob, Strategy::Walk, Strategy::List];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Glob => "glob",
            Strategy::Walk => "walk",
            Strategy::List => "list",
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "glob" => Ok(Strategy::Glob),
            "walk" => Ok(Strategy::Walk),
            "list" => Ok(Strategy::List),
            other => Err(format!(
                "unknown strategy '{}' (expected glob, walk or list)",
                other
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeOptions {
    pub strategy: Strategy,
    /// Count what would be deleted, delete nothing
    pub dry_run: bool,
}

/// One purged (or, in dry-run, purgeable) entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionEntry {
    pub space_id: String,
    pub node_id: String,
    pub path: PathBuf,
    pub blob_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// Revision content files
    pub revisions: u64,
    /// All files: revisions plus their `.mpk`/`.mlock`
    pub files: u64,
    pub blobs: u64,
    pub dry_run: bool,
}

impl PurgeStats {
    pub fn is_empty(&self) -> bool {
        self.revisions == 0 && self.files == 0 && self.blobs == 0
    }

    /// The one-line outcome printed after every run
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no revisions found".to_string();
        }
        let verb = if self.dry_run { "would delete" } else { "deleted" };
        format!(
            "{verb} {} revisions ({} files / {} blobs)",
            self.revisions, self.files, self.blobs
        )
    }
}

impl fmt::Display for PurgeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Stream every revision entry under `root` into `tx`.
///
/// Unreadable branches are logged and skipped. Returns when the tree is
/// exhausted, the receiver hangs up, or `cancel` fires.
pub fn scan(root: &Path, strategy: Strategy, tx: &Sender<PathBuf>, cancel: &CancelToken) {
    match strategy {
        Strategy::Glob => scan_glob(root, tx, cancel),
        Strategy::Walk => scan_walk(root, tx, cancel),
        Strategy::List => {
            list_level(&root.join(SPACES_DIR), 1, tx, cancel);
        }
    }
}

fn scan_glob(root: &Path, tx: &Sender<PathBuf>, cancel: &CancelToken) {
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        REVISION_GLOB
    );
    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            log_revisions_warn!(
                "Invalid revision pattern",
                pattern = pattern.as_str(),
                error = tracing::field::display(&e)
            );
            return;
        }
    };

    for entry in paths {
        if cancel.is_cancelled() {
            return;
        }
        match entry {
            Ok(path) => {
                let is_dir = fs::symlink_metadata(&path)
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if is_candidate(&path, is_dir) && tx.send(path).is_err() {
                    return;
                }
            }
            Err(e) => {
                log_revisions_warn!(
                    "Failed to expand revision pattern",
                    error = tracing::field::display(&e)
                );
            }
        }
    }
}

fn scan_walk(root: &Path, tx: &Sender<PathBuf>, cancel: &CancelToken) {
    let walker = WalkDir::new(root.join(SPACES_DIR))
        .min_depth(ENTRY_DEPTH)
        .max_depth(ENTRY_DEPTH)
        .into_iter()
        .filter_entry(|e| e.depth() != SPACE_CHILD_DEPTH || e.file_name() == NODES_DIR);

    for entry in walker {
        if cancel.is_cancelled() {
            return;
        }
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log_revisions_warn!(
                    "Failed to walk node tree",
                    error = tracing::field::display(&e)
                );
                continue;
            }
        };
        if is_candidate(entry.path(), entry.file_type().is_dir())
            && tx.send(entry.into_path()).is_err()
        {
            return;
        }
    }
}

/// Returns false once the scan should stop.
fn list_level(dir: &Path, depth: usize, tx: &Sender<PathBuf>, cancel: &CancelToken) -> bool {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log_revisions_warn!(
                "Failed to list directory",
                path = tracing::field::display(dir.display()),
                error = tracing::field::display(&e)
            );
            return true;
        }
    };

    for entry in entries.flatten() {
        if cancel.is_cancelled() {
            return false;
        }
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();

        if depth == ENTRY_DEPTH {
            if is_candidate(&path, file_type.is_dir()) && tx.send(path).is_err() {
                return false;
            }
            continue;
        }
        if !file_type.is_dir() {
            continue;
        }
        if depth == SPACE_CHILD_DEPTH && entry.file_name() != NODES_DIR {
            continue;
        }
        if !list_level(&path, depth + 1, tx, cancel) {
            return false;
        }
    }
    true
}

fn is_candidate(path: &Path, is_dir: bool) -> bool {
    !is_dir
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map(is_revision)
            .unwrap_or(false)
}

/// Purge every revision under `root`.
///
/// `blobstore` is `None` when blobs are not to be touched. `on_entry` sees
/// each entry once it has been deleted (or counted, in dry-run).
pub fn purge_revisions<F>(
    root: &Path,
    blobstore: Option<&dyn Blobstore>,
    options: PurgeOptions,
    cancel: &CancelToken,
    mut on_entry: F,
) -> Result<PurgeStats>
where
    F: FnMut(&RevisionEntry),
{
    let root = crate::ensure_root(root)?;
    let root = root.as_path();
    let started = Instant::now();

    let (tx, rx) = bounded(0);
    let scanner = {
        let root = root.to_path_buf();
        let cancel = cancel.clone();
        thread::spawn(move || scan(&root, options.strategy, &tx, &cancel))
    };

    let mut stats = PurgeStats {
        dry_run: options.dry_run,
        ..PurgeStats::default()
    };
    for path in rx {
        purge_entry(&path, blobstore, options.dry_run, &mut stats, &mut on_entry);
    }

    if scanner.join().is_err() {
        return Err(AuditError::Io(std::io::Error::other("revision scanner panicked")));
    }
    if cancel.is_cancelled() {
        return Err(AuditError::Cancelled);
    }

    log_revisions_info!(
        "Revision purge finished",
        strategy = options.strategy.as_str(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        revisions = stats.revisions,
        files = stats.files,
        blobs = stats.blobs,
        dry_run = options.dry_run
    );
    Ok(stats)
}

fn purge_entry<F>(
    path: &Path,
    blobstore: Option<&dyn Blobstore>,
    dry_run: bool,
    stats: &mut PurgeStats,
    on_entry: &mut F,
) where
    F: FnMut(&RevisionEntry),
{
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ids = ids_from_path(path);
    let kind = EntryKind::of(&name);

    let mut blob_id = None;
    let mut blob_deleted = false;
    if kind == EntryKind::Metadata {
        blob_id = match metadata::read_blob_id(path) {
            Ok(id) => id,
            Err(e) if blobstore.is_some() => {
                // Deleting the metadata would lose track of the blob for good.
                log_revisions_error!(
                    "Failed to read revision metadata, skipping",
                    path = tracing::field::display(path.display()),
                    error = tracing::field::display(&e)
                );
                return;
            }
            Err(_) => None,
        };

        if let (Some(store), Some(id)) = (blobstore, blob_id.as_deref()) {
            if dry_run {
                blob_deleted = true;
            } else {
                match store.delete(&BlobHandle::new(id, ids.space_id.as_str())) {
                    Ok(()) => blob_deleted = true,
                    Err(BlobstoreError::NotFound { .. }) => {
                        log_revisions_warn!(
                            "Revision blob already gone",
                            blob_id = id,
                            path = tracing::field::display(path.display())
                        );
                    }
                    Err(e) => {
                        log_revisions_error!(
                            "Failed to delete blob, skipping",
                            blob_id = id,
                            path = tracing::field::display(path.display()),
                            error = tracing::field::display(&e)
                        );
                        return;
                    }
                }
            }
        }
    }

    if !dry_run {
        if let Err(e) = fs::remove_file(path) {
            log_revisions_error!(
                "Failed to remove revision file",
                path = tracing::field::display(path.display()),
                error = tracing::field::display(&e)
            );
            return;
        }
    }

    stats.files += 1;
    if blob_deleted {
        stats.blobs += 1;
    }
    if kind == EntryKind::Content {
        stats.revisions += 1;
    }

    on_entry(&RevisionEntry {
        space_id: ids.space_id,
        node_id: ids.node_id,
        path: path.to_path_buf(),
        blob_id,
    });
}
