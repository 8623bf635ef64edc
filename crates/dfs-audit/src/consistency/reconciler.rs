//! Cancel-on-match reconciliation.
//!
//! Every pending set holds the half of a pair (node/link, blob/reference)
//! that arrived first; the second half removes it. What is left at the end
//! is the report. Resolved paths are remembered so a second link to the same
//! node, or a second reference to the same blob, still finds its partner.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::report::Report;
use super::{BlobData, CrawlEvent, Inconsistency, LinkData, NodeData};

#[derive(Debug, Default)]
struct PendingNode {
    inconsistencies: Vec<Inconsistency>,
    requires_symlink: bool,
    linked: bool,
}

impl PendingNode {
    fn is_resolved(&self) -> bool {
        self.inconsistencies.is_empty() && (self.linked || !self.requires_symlink)
    }
}

/// Single consumer of the crawl events. Owns all state, so no locking.
#[derive(Debug, Default)]
pub struct Reconciler {
    nodes: HashMap<PathBuf, PendingNode>,
    /// node path -> link path
    linked_nodes: HashMap<PathBuf, PathBuf>,
    blobs: HashSet<PathBuf>,
    /// blob path -> node path
    blob_references: HashMap<PathBuf, PathBuf>,
    resolved_nodes: HashSet<PathBuf>,
    resolved_blobs: HashSet<PathBuf>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: CrawlEvent) {
        match event {
            CrawlEvent::Node(data) => self.on_node(data),
            CrawlEvent::Link(data) => self.on_link(data),
            CrawlEvent::Blob(data) => self.on_blob(data),
        }
    }

    fn on_node(&mut self, data: NodeData) {
        let NodeData {
            node_path,
            blob_path,
            requires_symlink,
            inconsistencies,
        } = data;

        if let Some(blob_path) = blob_path {
            self.on_blob_reference(blob_path, &node_path);
        }

        if self.resolved_nodes.contains(&node_path) {
            return;
        }

        let linked = self.linked_nodes.remove(&node_path).is_some();
        let entry = self.nodes.entry(node_path.clone()).or_default();
        entry.inconsistencies.extend(inconsistencies);
        entry.requires_symlink |= requires_symlink;
        entry.linked |= linked;

        if entry.is_resolved() {
            self.nodes.remove(&node_path);
            self.resolved_nodes.insert(node_path);
        }
    }

    fn on_link(&mut self, data: LinkData) {
        let LinkData {
            link_path,
            node_path,
        } = data;

        if self.resolved_nodes.contains(&node_path) {
            return;
        }

        if let Some(entry) = self.nodes.get_mut(&node_path) {
            entry.linked = true;
            if entry.is_resolved() {
                self.nodes.remove(&node_path);
                self.resolved_nodes.insert(node_path);
            }
            return;
        }

        remember_min(&mut self.linked_nodes, node_path, link_path);
    }

    fn on_blob_reference(&mut self, blob_path: PathBuf, node_path: &Path) {
        if self.resolved_blobs.contains(&blob_path) {
            return;
        }
        if self.blobs.remove(&blob_path) {
            self.resolved_blobs.insert(blob_path);
            return;
        }
        remember_min(&mut self.blob_references, blob_path, node_path.to_path_buf());
    }

    fn on_blob(&mut self, data: BlobData) {
        let blob_path = data.blob_path;
        if self.blob_references.remove(&blob_path).is_some() {
            self.resolved_blobs.insert(blob_path);
            return;
        }
        if !self.resolved_blobs.contains(&blob_path) {
            self.blobs.insert(blob_path);
        }
    }

    /// Tag whatever is still pending and hand out the report.
    pub fn finish(self) -> Report {
        let mut report = Report::default();

        for (path, node) in self.nodes {
            if !node.inconsistencies.is_empty() {
                report.nodes.insert(path, node.inconsistencies);
            } else if node.requires_symlink && !node.linked {
                report.nodes.insert(path, vec![Inconsistency::SymlinkMissing]);
            }
        }

        for (node, link) in self.linked_nodes {
            report
                .linked_nodes
                .insert(node.clone(), vec![Inconsistency::NodeMissing]);
            report.owning_links.insert(node, link);
        }

        for blob in self.blobs {
            report.blobs.insert(blob, vec![Inconsistency::BlobOrphaned]);
        }

        for (blob, node) in self.blob_references {
            report
                .blob_references
                .insert(blob.clone(), vec![Inconsistency::BlobMissing]);
            report.referencing_nodes.insert(blob, node);
        }

        report
    }
}

/// Keep the smallest value per key so the report does not depend on arrival
/// order when several links (or nodes) share a target.
fn remember_min(map: &mut HashMap<PathBuf, PathBuf>, key: PathBuf, value: PathBuf) {
    map.entry(key)
        .and_modify(|current| {
            if value < *current {
                *current = value.clone();
            }
        })
        .or_insert(value);
}
