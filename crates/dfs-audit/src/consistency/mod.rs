//! Consistency checker.
//!
//! ```text
//!  nodes producer ──NodeData──┐
//!  links producer ──LinkData──┼─ fan_in ─> Reconciler ─> Report
//!  blobs producer ──BlobData──┘
//! ```
//!
//! Each producer runs on its own thread and talks to the reconciler over an
//! unbuffered channel. A coordinator thread joins the producers and then
//! drops the senders, which ends the fan-in loop.

mod crawler;
mod reconciler;
mod report;

pub use crawler::{discover_spaces, Crawler, SpaceDir};
pub use reconciler::Reconciler;
pub use report::{InconsistencyMap, Report};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{bounded, never, select, Receiver};
use dfs_blobstore::Blobstore;
use dfs_config::log_check_info;

use crate::{AuditError, CancelToken, Result};

/// A defect attached to a path in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Inconsistency {
    BlobMissing,
    BlobOrphaned,
    NodeMissing,
    MetadataMissing,
    SymlinkMissing,
    FilesMissing,
    MalformedFile,
}

impl Inconsistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Inconsistency::BlobMissing => "blob missing",
            Inconsistency::BlobOrphaned => "blob orphaned",
            Inconsistency::NodeMissing => "node missing",
            Inconsistency::MetadataMissing => "metadata missing",
            Inconsistency::SymlinkMissing => "symlink missing",
            Inconsistency::FilesMissing => "files missing",
            Inconsistency::MalformedFile => "malformed file",
        }
    }
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node, revision or trashed node found in the node tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    pub node_path: PathBuf,
    /// Where the node's blob should be, if it owns one
    pub blob_path: Option<PathBuf>,
    /// Live nodes other than a space root must be linked
    pub requires_symlink: bool,
    /// Problems found while reading the node's own files
    pub inconsistencies: Vec<Inconsistency>,
}

/// A symlink and the node path it resolves to (existing or not)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkData {
    pub link_path: PathBuf,
    pub node_path: PathBuf,
}

/// A blob listed by the blobstore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobData {
    pub blob_path: PathBuf,
}

/// Everything the reconciler consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    Node(NodeData),
    Link(LinkData),
    Blob(BlobData),
}

impl From<NodeData> for CrawlEvent {
    fn from(data: NodeData) -> Self {
        CrawlEvent::Node(data)
    }
}

impl From<LinkData> for CrawlEvent {
    fn from(data: LinkData) -> Self {
        CrawlEvent::Link(data)
    }
}

impl From<BlobData> for CrawlEvent {
    fn from(data: BlobData) -> Self {
        CrawlEvent::Blob(data)
    }
}

/// Merge the three typed streams into `sink` until every sender is gone.
pub fn fan_in<F>(
    nodes: Receiver<NodeData>,
    links: Receiver<LinkData>,
    blobs: Receiver<BlobData>,
    mut sink: F,
) where
    F: FnMut(CrawlEvent),
{
    let (mut nodes, mut links, mut blobs) = (nodes, links, blobs);
    let mut open = 3;

    while open > 0 {
        let mut closed = (false, false, false);
        select! {
            recv(nodes) -> msg => match msg {
                Ok(data) => sink(data.into()),
                Err(_) => closed.0 = true,
            },
            recv(links) -> msg => match msg {
                Ok(data) => sink(data.into()),
                Err(_) => closed.1 = true,
            },
            recv(blobs) -> msg => match msg {
                Ok(data) => sink(data.into()),
                Err(_) => closed.2 = true,
            },
        }

        // A disconnected receiver is always ready; park it on `never()`.
        if closed.0 {
            nodes = never();
            open -= 1;
        }
        if closed.1 {
            links = never();
            open -= 1;
        }
        if closed.2 {
            blobs = never();
            open -= 1;
        }
    }
}

/// Crawl the tree under `root` and reconcile it against `blobstore`.
///
/// Fails only when `root` is unusable, holds no spaces at all, or `cancel`
/// fires before the crawl completes.
pub fn check(root: &Path, blobstore: Arc<dyn Blobstore>, cancel: &CancelToken) -> Result<Report> {
    let root = crate::ensure_root(root)?;
    let root = root.as_path();
    let spaces = discover_spaces(root)?;
    log_check_info!(
        "Checking storage",
        root = tracing::field::display(root.display()),
        spaces = spaces.len(),
        blobstore = blobstore.name()
    );

    let (node_tx, node_rx) = bounded(0);
    let (link_tx, link_rx) = bounded(0);
    let (blob_tx, blob_rx) = bounded(0);

    let crawler = Crawler::new(spaces, blobstore, cancel.clone());
    let coordinator = crawler.spawn(node_tx, link_tx, blob_tx);

    let mut reconciler = Reconciler::new();
    fan_in(node_rx, link_rx, blob_rx, |event| reconciler.handle(event));

    if coordinator.join().is_err() {
        return Err(AuditError::Io(std::io::Error::other("crawler thread panicked")));
    }
    if cancel.is_cancelled() {
        return Err(AuditError::Cancelled);
    }

    let report = reconciler.finish();
    log_check_info!("Check finished", inconsistencies = report.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_inconsistency_labels() {
        assert_eq!(Inconsistency::SymlinkMissing.to_string(), "symlink missing");
        assert_eq!(Inconsistency::FilesMissing.to_string(), "files missing");
        assert_eq!(Inconsistency::MalformedFile.to_string(), "malformed file");
    }

    #[test]
    fn test_fan_in_drains_all_sources() {
        let (node_tx, node_rx) = bounded(0);
        let (link_tx, link_rx) = bounded(0);
        let (blob_tx, blob_rx) = bounded::<BlobData>(0);

        let producer = thread::spawn(move || {
            for i in 0..3 {
                node_tx
                    .send(NodeData {
                        node_path: PathBuf::from(format!("n{i}")),
                        blob_path: None,
                        requires_symlink: false,
                        inconsistencies: vec![],
                    })
                    .unwrap();
            }
            link_tx
                .send(LinkData {
                    link_path: "l".into(),
                    node_path: "n0".into(),
                })
                .unwrap();
            drop(blob_tx);
        });

        let mut events = Vec::new();
        fan_in(node_rx, link_rx, blob_rx, |e| events.push(e));
        producer.join().unwrap();

        assert_eq!(events.len(), 4);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, CrawlEvent::Link(_)))
                .count(),
            1
        );
    }
}
