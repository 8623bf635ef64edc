use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use dfs_blobstore::{layout::join_segments, BlobHandle, Blobstore};
use dfs_config::{log_check_debug, log_check_warn};
use walkdir::WalkDir;

use super::{BlobData, Inconsistency, LinkData, NodeData};
use crate::grammar::{
    self, is_revision, is_trashed, EntryKind, METADATA_EXT, NODES_DIR, SPACES_DIR, TRASH_DIR,
};
use crate::metadata;
use crate::{AuditError, CancelToken, Result};

/// Depth of a node entry below `nodes/` (`aa/bb/cc/dd/<rest>`)
const NODE_DEPTH: usize = 5;
/// Child links live inside container nodes, one level deeper
const CHILD_LINK_DEPTH: usize = NODE_DEPTH + 1;
/// Depth of a trash link below `trash/`
const TRASH_LINK_DEPTH: usize = 5;

/// One `spaces/<ab>/<cdef...>` directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceDir {
    pub id: String,
    pub path: PathBuf,
}

/// List the spaces under `root`.
///
/// An empty result is fatal: it almost always means the wrong base path.
pub fn discover_spaces(root: &Path) -> Result<Vec<SpaceDir>> {
    let spaces_root = root.join(SPACES_DIR);
    let no_spaces = || AuditError::NoSpacesFound {
        root: root.to_path_buf(),
    };

    let shards = match fs::read_dir(&spaces_root) {
        Ok(it) => it,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(no_spaces()),
        Err(e) => return Err(e.into()),
    };

    let mut spaces = Vec::new();
    for shard in shards.flatten() {
        if !shard.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let entries = match fs::read_dir(shard.path()) {
            Ok(it) => it,
            Err(e) => {
                log_check_warn!(
                    "Failed to read space shard",
                    path = tracing::field::display(shard.path().display()),
                    error = tracing::field::display(&e)
                );
                continue;
            }
        };
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            spaces.push(SpaceDir {
                id: format!(
                    "{}{}",
                    shard.file_name().to_string_lossy(),
                    entry.file_name().to_string_lossy()
                ),
                path: entry.path(),
            });
        }
    }

    if spaces.is_empty() {
        return Err(no_spaces());
    }
    spaces.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(spaces)
}

/// The three producers of the consistency check.
#[derive(Clone)]
pub struct Crawler {
    spaces: Arc<Vec<SpaceDir>>,
    blobstore: Arc<dyn Blobstore>,
    cancel: CancelToken,
}

impl Crawler {
    pub fn new(spaces: Vec<SpaceDir>, blobstore: Arc<dyn Blobstore>, cancel: CancelToken) -> Self {
        Self {
            spaces: Arc::new(spaces),
            blobstore,
            cancel,
        }
    }

    /// Start the producers behind a coordinator thread.
    ///
    /// The coordinator waits for all three and only then drops the senders,
    /// so the receivers disconnect exactly once everything has been sent.
    pub fn spawn(
        self,
        nodes: Sender<NodeData>,
        links: Sender<LinkData>,
        blobs: Sender<BlobData>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let producers = [
                {
                    let crawler = self.clone();
                    let tx = nodes.clone();
                    thread::spawn(move || crawler.crawl_nodes(&tx))
                },
                {
                    let crawler = self.clone();
                    let tx = links.clone();
                    thread::spawn(move || crawler.crawl_links(&tx))
                },
                {
                    let crawler = self.clone();
                    let tx = blobs.clone();
                    thread::spawn(move || crawler.crawl_blobs(&tx))
                },
            ];

            for producer in producers {
                if producer.join().is_err() {
                    log_check_warn!("Crawler thread panicked");
                }
            }

            drop(nodes);
            drop(links);
            drop(blobs);
        })
    }

    /// Emit one [`NodeData`] per node, revision and trashed node, plus one
    /// per metadata file whose node is gone.
    pub fn crawl_nodes(&self, tx: &Sender<NodeData>) {
        for space in self.spaces.iter() {
            let nodes_dir = space.path.join(NODES_DIR);
            if !nodes_dir.is_dir() {
                log_check_debug!(
                    "Space has no nodes directory",
                    space = space.id.as_str()
                );
                continue;
            }

            for entry in WalkDir::new(&nodes_dir)
                .min_depth(NODE_DEPTH)
                .max_depth(NODE_DEPTH)
            {
                if self.cancel.is_cancelled() {
                    return;
                }
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        log_check_warn!(
                            "Failed to read node directory",
                            error = tracing::field::display(&e)
                        );
                        continue;
                    }
                };

                let name = entry.file_name().to_string_lossy();
                let data = match EntryKind::of(&name) {
                    EntryKind::Lock => continue,
                    EntryKind::Metadata => match orphaned_metadata(entry.path(), &name) {
                        Some(data) => data,
                        None => continue,
                    },
                    EntryKind::Content => {
                        let file_type = entry.file_type();
                        if !file_type.is_file() && !file_type.is_dir() {
                            log_check_debug!(
                                "Skipping unexpected entry in node tree",
                                path = tracing::field::display(entry.path().display())
                            );
                            continue;
                        }
                        self.node_data(space, &nodes_dir, entry.path(), &name)
                    }
                };

                if tx.send(data).is_err() {
                    return;
                }
            }
        }
    }

    fn node_data(&self, space: &SpaceDir, nodes_dir: &Path, path: &Path, name: &str) -> NodeData {
        let mut inconsistencies = Vec::new();

        let blob_id = match metadata::read(&grammar::metadata_path(path)) {
            Ok(attrs) => metadata::blob_id(&attrs),
            Err(e) if e.is_missing() => {
                inconsistencies.push(Inconsistency::MetadataMissing);
                None
            }
            Err(e) => {
                log_check_debug!(
                    "Unreadable node metadata",
                    path = tracing::field::display(path.display()),
                    error = tracing::field::display(&e)
                );
                inconsistencies.push(Inconsistency::MalformedFile);
                None
            }
        };

        let node_id = path
            .strip_prefix(nodes_dir)
            .map(|rel| join_segments(rel.iter().filter_map(|c| c.to_str())))
            .unwrap_or_default();
        let requires_symlink = !is_revision(name) && !is_trashed(name) && node_id != space.id;

        NodeData {
            node_path: path.to_path_buf(),
            blob_path: blob_id
                .map(|id| self.blobstore.path(&BlobHandle::new(id, space.id.as_str()))),
            requires_symlink,
            inconsistencies,
        }
    }

    /// Emit one [`LinkData`] per child link and per trash link.
    pub fn crawl_links(&self, tx: &Sender<LinkData>) {
        for space in self.spaces.iter() {
            let sources = [
                (space.path.join(NODES_DIR), CHILD_LINK_DEPTH),
                (space.path.join(TRASH_DIR), TRASH_LINK_DEPTH),
            ];
            for (dir, depth) in sources {
                if !dir.is_dir() {
                    continue;
                }
                if !self.crawl_links_in(&dir, depth, tx) {
                    return;
                }
            }
        }
    }

    /// Returns false once the run should stop.
    fn crawl_links_in(&self, dir: &Path, depth: usize, tx: &Sender<LinkData>) -> bool {
        for entry in WalkDir::new(dir).min_depth(depth).max_depth(depth) {
            if self.cancel.is_cancelled() {
                return false;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log_check_warn!(
                        "Failed to read link directory",
                        error = tracing::field::display(&e)
                    );
                    continue;
                }
            };
            if !entry.path_is_symlink() {
                continue;
            }

            let target = match fs::read_link(entry.path()) {
                Ok(t) => t,
                Err(e) => {
                    log_check_warn!(
                        "Failed to read symlink",
                        path = tracing::field::display(entry.path().display()),
                        error = tracing::field::display(&e)
                    );
                    continue;
                }
            };

            let data = LinkData {
                link_path: entry.path().to_path_buf(),
                node_path: grammar::resolve_link(entry.path(), &target),
            };
            if tx.send(data).is_err() {
                return false;
            }
        }
        true
    }

    /// Emit one [`BlobData`] per blob the blobstore lists.
    pub fn crawl_blobs(&self, tx: &Sender<BlobData>) {
        let blobs = match self.blobstore.list() {
            Ok(blobs) => blobs,
            Err(e) => {
                log_check_warn!(
                    "Failed to list blobs",
                    blobstore = self.blobstore.name(),
                    error = tracing::field::display(&e)
                );
                return;
            }
        };

        for blob in blobs {
            if self.cancel.is_cancelled() {
                return;
            }
            let data = BlobData {
                blob_path: self.blobstore.path(&blob),
            };
            if tx.send(data).is_err() {
                return;
            }
        }
    }
}

/// A `.mpk` whose node entry does not exist.
fn orphaned_metadata(path: &Path, name: &str) -> Option<NodeData> {
    let node_name = name.strip_suffix(METADATA_EXT)?;
    let node_path = path.with_file_name(node_name);
    if fs::symlink_metadata(&node_path).is_ok() {
        return None;
    }
    Some(NodeData {
        node_path,
        blob_path: None,
        requires_symlink: false,
        inconsistencies: vec![Inconsistency::FilesMissing],
    })
}
