//! Tree size check.
//!
//! Every container records the accumulated blob size of its subtree in
//! `user.ocis.treesize`. This walks a space from its root node, recomputes
//! those sums from the files' `user.ocis.blobsize` and reports each container
//! whose recorded value differs. Nothing is written back.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dfs_config::{log_check_debug, log_check_info, log_check_warn};

use crate::grammar::{self, BLOB_SIZE_ATTR, NAME_ATTR, TREE_SIZE_ATTR, TYPE_ATTR};
use crate::metadata::{self, Attributes, MetadataError};
use crate::{AuditError, CancelToken, Result};

const TYPE_FILE: &[u8] = b"1";
const TYPE_CONTAINER: &[u8] = b"2";

/// A container whose recorded tree size is wrong
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSizeMismatch {
    /// Path of the container inside the space, `/` for the space root
    pub origin: String,
    pub node_id: String,
    /// Node path on disk
    pub internal_path: PathBuf,
    pub calculated: u64,
    pub recorded: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSizeReport {
    pub space_id: String,
    pub space_name: String,
    /// Containers compared, the space root included
    pub containers: u64,
    /// Mismatches in walk order; the space root comes last
    pub mismatches: Vec<TreeSizeMismatch>,
}

impl TreeSizeReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Check every container tree size of space `space_id` under `root`.
///
/// Unreadable sizes abort the walk. A space root without a recorded tree
/// size is compared as 0.
pub fn check_treesize(root: &Path, space_id: &str, cancel: &CancelToken) -> Result<TreeSizeReport> {
    let root = crate::ensure_root(root)?;
    let space_root = grammar::node_path(&root, space_id, space_id);
    let attributes = match metadata::read(&grammar::metadata_path(&space_root)) {
        Ok(attributes) => attributes,
        Err(e) if e.is_missing() => return Err(AuditError::NodeNotFound(space_id.to_string())),
        Err(source) => {
            return Err(AuditError::Metadata {
                path: space_root,
                source,
            })
        }
    };
    if attributes.get(TYPE_ATTR).map(|t| t.as_slice()) != Some(TYPE_CONTAINER) {
        return Err(AuditError::NotAContainer { path: space_root });
    }

    let mut walker = Walker {
        cancel,
        visited: HashSet::new(),
        report: TreeSizeReport {
            space_id: space_id.to_string(),
            space_name: text(&attributes, NAME_ATTR),
            ..TreeSizeReport::default()
        },
    };
    log_check_info!(
        "Checking tree sizes",
        space = space_id,
        path = tracing::field::display(space_root.display())
    );

    let calculated = walker.walk(&space_root, "")?;
    let recorded = match metadata::number(&attributes, TREE_SIZE_ATTR) {
        Ok(size) => size.unwrap_or_default(),
        Err(source) => {
            return Err(AuditError::Metadata {
                path: space_root,
                source,
            })
        }
    };
    walker.compare("/".to_string(), space_id, &space_root, calculated, recorded);

    Ok(walker.report)
}

struct Walker<'a> {
    cancel: &'a CancelToken,
    /// Containers already entered, so a link cycle cannot recurse forever
    visited: HashSet<PathBuf>,
    report: TreeSizeReport,
}

impl Walker<'_> {
    /// Sum of the blob sizes below `container`, comparing every
    /// sub-container on the way.
    fn walk(&mut self, container: &Path, origin: &str) -> Result<u64> {
        if self.cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }
        self.visited.insert(container.to_path_buf());

        let mut tree_size = 0u64;
        for (name, child) in children(container)? {
            let attributes = read_attributes(&child)?;
            let child_origin = format!("{origin}/{name}");
            match attributes.get(TYPE_ATTR).map(|t| t.as_slice()) {
                Some(TYPE_CONTAINER) if self.visited.contains(&child) => {
                    log_check_warn!(
                        "Container linked twice, not counting it again",
                        link = tracing::field::display(container.join(&name).display()),
                        path = tracing::field::display(child.display())
                    );
                }
                Some(TYPE_CONTAINER) => {
                    let calculated = self.walk(&child, &child_origin)?;
                    let recorded = required_number(&child, &attributes, TREE_SIZE_ATTR)?;
                    let node_id = grammar::ids_from_path(&child).node_id;
                    self.compare(child_origin, &node_id, &child, calculated, recorded);
                    tree_size += calculated;
                }
                Some(TYPE_FILE) => {
                    tree_size += required_number(&child, &attributes, BLOB_SIZE_ATTR)?;
                }
                other => {
                    log_check_debug!(
                        "Ignoring node type",
                        node_type = tracing::field::display(
                            String::from_utf8_lossy(other.unwrap_or_default())
                        ),
                        path = tracing::field::display(child.display())
                    );
                }
            }
        }
        Ok(tree_size)
    }

    fn compare(&mut self, origin: String, node_id: &str, path: &Path, calculated: u64, recorded: u64) {
        self.report.containers += 1;
        if calculated == recorded {
            return;
        }
        log_check_warn!(
            "Tree size mismatch",
            path = tracing::field::display(path.display()),
            calculated = calculated,
            recorded = recorded
        );
        self.report.mismatches.push(TreeSizeMismatch {
            origin,
            node_id: node_id.to_string(),
            internal_path: path.to_path_buf(),
            calculated,
            recorded,
        });
    }
}

/// Child links of a container, resolved to node paths and sorted by name.
fn children(container: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(container)? {
        let entry = entry?;
        let link = entry.path();
        let target = match fs::read_link(&link) {
            Ok(target) => target,
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                log_check_debug!(
                    "Skipping non-link entry in container",
                    path = tracing::field::display(link.display())
                );
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        children.push((name, grammar::resolve_link(&link, &target)));
    }
    children.sort();
    Ok(children)
}

fn read_attributes(node: &Path) -> Result<Attributes> {
    metadata::read(&grammar::metadata_path(node)).map_err(|source| AuditError::Metadata {
        path: node.to_path_buf(),
        source,
    })
}

fn required_number(node: &Path, attributes: &Attributes, name: &str) -> Result<u64> {
    let source = match metadata::number(attributes, name) {
        Ok(Some(n)) => return Ok(n),
        Ok(None) => MetadataError::MissingAttribute(name.to_string()),
        Err(e) => e,
    };
    Err(AuditError::Metadata {
        path: node.to_path_buf(),
        source,
    })
}

fn text(attributes: &Attributes, name: &str) -> String {
    attributes
        .get(name)
        .map(|v| String::from_utf8_lossy(v).into_owned())
        .unwrap_or_default()
}
