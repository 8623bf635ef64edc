//! Names and paths of the decomposed filesystem.
//!
//! Everything here is pure: no filesystem access.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

pub use dfs_blobstore::layout::{blob_shard_path, pathify, pathify_segments};

pub const SPACES_DIR: &str = "spaces";
pub const NODES_DIR: &str = "nodes";
pub const TRASH_DIR: &str = "trash";

/// Extension of the node metadata file
pub const METADATA_EXT: &str = ".mpk";
/// Extension of the node lock marker
pub const LOCK_EXT: &str = ".mlock";

pub const REVISION_DELIMITER: &str = ".REV.";
pub const TRASH_DELIMITER: &str = ".T.";

/// Metadata attribute carrying the blob ID of a file node
pub const BLOB_ID_ATTR: &str = "user.ocis.blobid";
/// Content length of a file node, decimal
pub const BLOB_SIZE_ATTR: &str = "user.ocis.blobsize";
/// Accumulated blob size below a container node, decimal
pub const TREE_SIZE_ATTR: &str = "user.ocis.treesize";
pub const NAME_ATTR: &str = "user.ocis.name";
/// Resource type: `1` file, `2` container
pub const TYPE_ATTR: &str = "user.ocis.type";

static REVISION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.REV\.[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}\.[0-9]*Z")
        .expect("revision pattern compiles")
});

static TRASHED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.T\.[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}\.[0-9]*Z")
        .expect("trash pattern compiles")
});

/// True if `name` carries a revision suffix, with or without a trailing
/// `.mpk`/`.mlock`.
pub fn is_revision(name: &str) -> bool {
    REVISION_RE.is_match(name)
}

/// True if `name` carries a trash suffix.
pub fn is_trashed(name: &str) -> bool {
    TRASHED_RE.is_match(name)
}

/// What a directory entry next to the nodes is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// The node itself (or a revision/trashed copy of it)
    Content,
    /// `<node>.mpk`
    Metadata,
    /// `<node>.mlock`
    Lock,
}

impl EntryKind {
    pub fn of(name: &str) -> Self {
        // Timestamps contain dots, so Path::extension is no use here.
        if name.ends_with(METADATA_EXT) {
            EntryKind::Metadata
        } else if name.ends_with(LOCK_EXT) {
            EntryKind::Lock
        } else {
            EntryKind::Content
        }
    }
}

/// Space and node ID derived from a node path. Empty when the path does not
/// look like a node path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeIds {
    pub space_id: String,
    pub node_id: String,
}

impl NodeIds {
    /// Parse a resource reference `[<storage>$]<space>[!<node>]`. Without a
    /// node part the reference names the space root.
    pub fn parse_reference(reference: &str) -> Option<Self> {
        let rest = reference.split_once('$').map_or(reference, |(_, rest)| rest);
        let (space, node) = rest.split_once('!').unwrap_or((rest, ""));
        if space.is_empty() {
            return None;
        }
        let node = if node.is_empty() { space } else { node };
        Some(Self {
            space_id: space.to_string(),
            node_id: node.to_string(),
        })
    }
}

/// Recover the IDs from `<...>/spaces/<space>/nodes/<node>[.REV.<ts>|.T.<ts>][.mpk|.mlock]`.
///
/// Exactly one `/spaces/` and one `/nodes/` segment are expected; anything
/// else yields empty IDs.
pub fn ids_from_path(path: &Path) -> NodeIds {
    let path = path.to_string_lossy();

    let mut by_nodes = path.split("/nodes/");
    let (Some(head), Some(tail), None) = (by_nodes.next(), by_nodes.next(), by_nodes.next())
    else {
        return NodeIds::default();
    };

    let mut by_spaces = head.split("/spaces/");
    let (Some(_), Some(space), None) = (by_spaces.next(), by_spaces.next(), by_spaces.next())
    else {
        return NodeIds::default();
    };

    let mut node_id: String = tail.split('/').collect();
    for delimiter in [REVISION_DELIMITER, TRASH_DELIMITER] {
        if let Some(pos) = node_id.find(delimiter) {
            node_id.truncate(pos);
        }
    }
    for ext in [METADATA_EXT, LOCK_EXT] {
        if let Some(stripped) = node_id.strip_suffix(ext) {
            node_id = stripped.to_string();
        }
    }

    NodeIds {
        space_id: space.split('/').collect(),
        node_id,
    }
}

/// Directory of a space: `<root>/spaces/<pathify(space,1,2)>`
pub fn space_dir(root: &Path, space_id: &str) -> PathBuf {
    let mut dir = root.join(SPACES_DIR);
    dir.extend(pathify_segments(space_id, 1, 2));
    dir
}

/// Path of a live node: `<space dir>/nodes/<pathify(node,4,2)>`
pub fn node_path(root: &Path, space_id: &str, node_id: &str) -> PathBuf {
    let mut path = space_dir(root, space_id).join(NODES_DIR);
    path.extend(pathify_segments(node_id, 4, 2));
    path
}

/// `<path><suffix>` without going through a lossy string.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// Metadata file of a node (or revision, or trashed node)
pub fn metadata_path(node: &Path) -> PathBuf {
    with_suffix(node, METADATA_EXT)
}

/// Lock marker of a node
pub fn lock_path(node: &Path) -> PathBuf {
    with_suffix(node, LOCK_EXT)
}

/// Normalize `.` and `..` without touching the filesystem.
///
/// `..` directly under the root is dropped. Leading `..` of a relative path
/// is kept, so a relative base path and the links resolved under it clean to
/// the same prefix. An empty result is `.`.
pub fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Resolve a symlink target relative to the directory holding the link.
///
/// The target need not exist.
pub fn resolve_link(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        return clean(target);
    }
    let dir = link.parent().unwrap_or_else(|| Path::new(""));
    clean(&dir.join(target))
}
