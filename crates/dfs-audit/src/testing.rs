//! Synthetic decomposed filesystem trees for tests.
//!
//! # Usage
//!
//! ```ignore
//! use dfs_audit::testing::StorageFixture;
//!
//! let fixture = StorageFixture::new()?;
//! let space = fixture.add_space()?;
//! let file = fixture.add_file(&space, &space.root, "report.pdf", b"%PDF")?;
//! fixture.add_revision(&file)?;
//! ```
//!
//! Everything lives in a temp dir that is removed when the fixture drops.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use dfs_blobstore::{BlobHandle, Blobstore, OcisBlobstore};
use tempfile::TempDir;
use uuid::Uuid;

use crate::grammar::{self, pathify, BLOB_ID_ATTR, BLOB_SIZE_ATTR, REVISION_DELIMITER, TRASH_DELIMITER, TRASH_DIR};
use crate::metadata::{self, Attributes, MetadataError};

/// Up-level count from a child link (or trash link) to the `nodes/` (or
/// space) directory
const LINK_PREFIX: &str = "../../../../../";

/// Keeps generated timestamps unique within a process
static TICK: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct TestNode {
    pub id: String,
    pub space_id: String,
    pub path: PathBuf,
    /// Child link pointing at this node, if any
    pub link: Option<PathBuf>,
    pub blob_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TestSpace {
    pub id: String,
    pub dir: PathBuf,
    /// Space root node (node ID == space ID)
    pub root: TestNode,
}

#[derive(Debug, Clone)]
pub struct TestRevision {
    pub path: PathBuf,
    pub blob_id: String,
}

/// A storage base path in a temp dir, with ocis blobs.
pub struct StorageFixture {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl StorageFixture {
    pub fn new() -> io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();
        Ok(Self {
            _temp_dir: temp_dir,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The root spelled relative to the current directory, starting with
    /// `./..`, the way an operator might pass `--basepath`.
    pub fn relative_root(&self) -> io::Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        let mut path = PathBuf::from(".");
        for component in cwd.components() {
            if let Component::Normal(_) = component {
                path.push("..");
            }
        }
        for component in self.root.components() {
            if let Component::Normal(name) = component {
                path.push(name);
            }
        }
        Ok(path)
    }

    pub fn blobstore(&self) -> Arc<dyn Blobstore> {
        Arc::new(OcisBlobstore::new(&self.root))
    }

    pub fn blob_path(&self, space: &TestSpace, blob_id: &str) -> PathBuf {
        OcisBlobstore::new(&self.root).path(&BlobHandle::new(blob_id, space.id.as_str()))
    }

    /// Create a space with its root container node.
    pub fn add_space(&self) -> io::Result<TestSpace> {
        let id = Uuid::new_v4().to_string();
        let dir = grammar::space_dir(&self.root, &id);
        let path = grammar::node_path(&self.root, &id, &id);
        fs::create_dir_all(&path)?;
        write_metadata(
            &path,
            &metadata::attributes([
                ("user.ocis.name", id.as_bytes()),
                ("user.ocis.type", b"2".as_slice()),
            ]),
        )?;

        Ok(TestSpace {
            root: TestNode {
                id: id.clone(),
                space_id: id.clone(),
                path,
                link: None,
                blob_id: None,
            },
            id,
            dir,
        })
    }

    /// Create a file node with content in the blobstore, linked from `parent`.
    pub fn add_file(
        &self,
        space: &TestSpace,
        parent: &TestNode,
        name: &str,
        content: &[u8],
    ) -> io::Result<TestNode> {
        let id = Uuid::new_v4().to_string();
        let blob_id = Uuid::new_v4().to_string();
        let path = grammar::node_path(&self.root, &space.id, &id);
        create_parent(&path)?;
        fs::write(&path, b"")?;
        write_metadata(
            &path,
            &metadata::attributes([
                (BLOB_ID_ATTR, blob_id.as_bytes()),
                (BLOB_SIZE_ATTR, content.len().to_string().as_bytes()),
                ("user.ocis.name", name.as_bytes()),
                ("user.ocis.parentid", parent.id.as_bytes()),
                ("user.ocis.type", b"1".as_slice()),
            ]),
        )?;
        fs::write(grammar::lock_path(&path), b"")?;
        self.write_blob(space, &blob_id, content)?;
        let link = link_child(parent, name, &id)?;

        Ok(TestNode {
            id,
            space_id: space.id.clone(),
            path,
            link: Some(link),
            blob_id: Some(blob_id),
        })
    }

    /// Create a container node linked from `parent`.
    pub fn add_dir(&self, space: &TestSpace, parent: &TestNode, name: &str) -> io::Result<TestNode> {
        let id = Uuid::new_v4().to_string();
        let path = grammar::node_path(&self.root, &space.id, &id);
        fs::create_dir_all(&path)?;
        write_metadata(
            &path,
            &metadata::attributes([
                ("user.ocis.name", name.as_bytes()),
                ("user.ocis.parentid", parent.id.as_bytes()),
                ("user.ocis.type", b"2".as_slice()),
            ]),
        )?;
        let link = link_child(parent, name, &id)?;

        Ok(TestNode {
            id,
            space_id: space.id.clone(),
            path,
            link: Some(link),
            blob_id: None,
        })
    }

    /// Add a revision of a file node: content, metadata with its own blob,
    /// lock marker.
    pub fn add_revision(&self, node: &TestNode) -> io::Result<TestRevision> {
        let blob_id = Uuid::new_v4().to_string();
        let path = grammar::with_suffix(
            &node.path,
            &format!("{REVISION_DELIMITER}{}", timestamp()),
        );
        fs::write(&path, b"")?;
        write_metadata(
            &path,
            &metadata::attributes([(BLOB_ID_ATTR, blob_id.as_bytes())]),
        )?;
        fs::write(grammar::lock_path(&path), b"")?;

        let blob = OcisBlobstore::new(&self.root)
            .path(&BlobHandle::new(blob_id.as_str(), node.space_id.as_str()));
        create_parent(&blob)?;
        fs::write(&blob, b"previous content")?;

        Ok(TestRevision { path, blob_id })
    }

    /// Move a node to the trash: rename it (and its metadata) to
    /// `<node>.T.<ts>`, drop its child link, create the trash link.
    ///
    /// Returns the trashed node path.
    pub fn trash(&self, node: &TestNode) -> io::Result<PathBuf> {
        let suffix = format!("{TRASH_DELIMITER}{}", timestamp());
        let trashed = grammar::with_suffix(&node.path, &suffix);
        fs::rename(&node.path, &trashed)?;
        fs::rename(
            grammar::metadata_path(&node.path),
            grammar::metadata_path(&trashed),
        )?;
        let lock = grammar::lock_path(&node.path);
        if lock.exists() {
            fs::rename(&lock, grammar::lock_path(&trashed))?;
        }
        if let Some(link) = &node.link {
            fs::remove_file(link)?;
        }

        let mut trash_link = grammar::space_dir(&self.root, &node.space_id).join(TRASH_DIR);
        trash_link.extend(grammar::pathify_segments(&node.id, 4, 2));
        create_parent(&trash_link)?;
        symlink(
            format!("{LINK_PREFIX}nodes/{}{suffix}", pathify(&node.id, 4, 2)),
            &trash_link,
        )?;
        Ok(trashed)
    }

    /// Set one metadata attribute of an existing node.
    pub fn set_attribute(&self, node: &TestNode, name: &str, value: &[u8]) -> io::Result<()> {
        let path = grammar::metadata_path(&node.path);
        let mut attributes = metadata::read(&path).map_err(io::Error::other)?;
        attributes.insert(name.to_string(), value.to_vec().into());
        write_metadata(&node.path, &attributes)
    }

    fn write_blob(&self, space: &TestSpace, blob_id: &str, content: &[u8]) -> io::Result<()> {
        let path = self.blob_path(space, blob_id);
        create_parent(&path)?;
        fs::write(path, content)
    }
}

/// RFC 3339 with nanoseconds, always `Z`, unique per call
pub fn timestamp() -> String {
    let tick = TICK.fetch_add(1, Ordering::SeqCst) as i64;
    (Utc::now() + Duration::nanoseconds(tick)).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn link_child(parent: &TestNode, name: &str, child_id: &str) -> io::Result<PathBuf> {
    let link = parent.path.join(name);
    symlink(format!("{LINK_PREFIX}{}", pathify(child_id, 4, 2)), &link)?;
    Ok(link)
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

fn write_metadata(node: &Path, attributes: &Attributes) -> io::Result<()> {
    metadata::write(&grammar::metadata_path(node), attributes).map_err(|e| match e {
        MetadataError::Io(e) => e,
        other => io::Error::other(other),
    })
}

#[cfg(unix)]
fn symlink(target: String, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: String, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "storage fixtures need symlink support",
    ))
}
