use std::collections::BTreeMap;
use std::path::PathBuf;

use super::Inconsistency;

pub type InconsistencyMap = BTreeMap<PathBuf, Vec<Inconsistency>>;

/// Outcome of a consistency check. Built fresh per run and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Node paths: `symlink missing`, `metadata missing`, `files missing`,
    /// `malformed file`
    pub nodes: InconsistencyMap,
    /// Link targets that do not exist: `node missing`
    pub linked_nodes: InconsistencyMap,
    /// Blobs nobody references: `blob orphaned`
    pub blobs: InconsistencyMap,
    /// Referenced blobs that do not exist: `blob missing`
    pub blob_references: InconsistencyMap,
    /// node path -> link pointing at it, for `linked_nodes`
    pub owning_links: BTreeMap<PathBuf, PathBuf>,
    /// blob path -> node referencing it, for `blob_references`
    pub referencing_nodes: BTreeMap<PathBuf, PathBuf>,
}

impl Report {
    /// True when no map has an entry
    pub fn is_consistent(&self) -> bool {
        self.len() == 0
    }

    /// Number of reported paths over all four maps
    pub fn len(&self) -> usize {
        self.nodes.len() + self.linked_nodes.len() + self.blobs.len() + self.blob_references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_consistent()
    }
}
