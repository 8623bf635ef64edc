//! Local ocis blobstore: blobs live next to the nodes of their space.

use std::path::{Path, PathBuf};

use dfs_config::{log_blobstore_debug, log_blobstore_warn};
use tracing::instrument;
use walkdir::WalkDir;

use crate::layout::{blob_shard_path, join_segments, pathify_segments, BLOBS_DIR};
use crate::{read_subdirs, remove_blob_file, BlobHandle, Blobstore, Result};

/// Blobstore rooted at the decomposed filesystem base path.
///
/// ```text
/// <root>/spaces/<pathify(space,1,2)>/blobs/<pathify(blob,4,2)>
/// ```
#[derive(Debug, Clone)]
pub struct OcisBlobstore {
    root: PathBuf,
}

impl OcisBlobstore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a space inside the storage tree
    fn space_dir(&self, space_id: &str) -> PathBuf {
        let mut dir = self.root.join("spaces");
        dir.extend(pathify_segments(space_id, 1, 2));
        dir
    }

    /// Blobs of one space. `space_dir` is `spaces/<l1>/<l2>`.
    fn list_space(&self, space_id: &str, space_dir: &Path, out: &mut Vec<BlobHandle>) {
        let blobs_dir = space_dir.join(BLOBS_DIR);
        if !blobs_dir.is_dir() {
            return;
        }

        for entry in WalkDir::new(&blobs_dir).min_depth(5).max_depth(5) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log_blobstore_warn!(
                        "Failed to read blob directory",
                        error = tracing::field::display(&e)
                    );
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&blobs_dir) else {
                continue;
            };
            let blob_id = join_segments(relative.iter().filter_map(|c| c.to_str()));
            out.push(BlobHandle::new(blob_id, space_id));
        }
    }
}

impl Blobstore for OcisBlobstore {
    #[instrument(skip(self), level = "debug")]
    fn list(&self) -> Result<Vec<BlobHandle>> {
        let spaces = self.root.join("spaces");
        let mut blobs = Vec::new();
        if !spaces.is_dir() {
            return Ok(blobs);
        }

        // Level 1: spaces/ab
        for l1 in read_subdirs(&spaces)? {
            // Level 2: spaces/ab/cdef...
            let l2_dirs = match read_subdirs(&l1.path()) {
                Ok(dirs) => dirs,
                Err(e) => {
                    log_blobstore_warn!(
                        "Failed to read space shard",
                        path = tracing::field::display(l1.path().display()),
                        error = tracing::field::display(&e)
                    );
                    continue;
                }
            };
            for l2 in l2_dirs {
                let space_id = format!(
                    "{}{}",
                    l1.file_name().to_string_lossy(),
                    l2.file_name().to_string_lossy()
                );
                self.list_space(&space_id, &l2.path(), &mut blobs);
            }
        }

        log_blobstore_debug!("Listed ocis blobs", count = blobs.len());
        Ok(blobs)
    }

    fn path(&self, blob: &BlobHandle) -> PathBuf {
        self.space_dir(&blob.space_id)
            .join(blob_shard_path(&blob.blob_id))
    }

    fn delete(&self, blob: &BlobHandle) -> Result<()> {
        remove_blob_file(&self.path(blob), blob)
    }

    fn name(&self) -> &'static str {
        "ocis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlobstoreError;
    use std::fs;
    use tempfile::TempDir;

    fn put(store: &OcisBlobstore, blob: &BlobHandle, data: &[u8]) -> PathBuf {
        let path = store.path(blob);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_path_layout() {
        let store = OcisBlobstore::new("/var/lib/storage");
        let blob = BlobHandle::new(
            "12345678-9abc-def0-1234-56789abcdef0",
            "aabbccdd-0000-4000-8000-000000000001",
        );
        assert_eq!(
            store.path(&blob),
            PathBuf::from(
                "/var/lib/storage/spaces/aa/bbccdd-0000-4000-8000-000000000001/blobs/12/34/56/78/-9abc-def0-1234-56789abcdef0"
            )
        );
    }

    #[test]
    fn test_list_finds_blobs_across_spaces() {
        let temp = TempDir::new().unwrap();
        let store = OcisBlobstore::new(temp.path());

        let mut expected = Vec::new();
        for _ in 0..2 {
            let space = uuid::Uuid::new_v4().to_string();
            for _ in 0..3 {
                let blob = BlobHandle::new(uuid::Uuid::new_v4().to_string(), space.clone());
                put(&store, &blob, b"content");
                expected.push(blob);
            }
        }

        let mut listed = store.list().unwrap();
        listed.sort();
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_list_skips_stray_entries() {
        let temp = TempDir::new().unwrap();
        let store = OcisBlobstore::new(temp.path());
        let blob = BlobHandle::new(uuid::Uuid::new_v4().to_string(), "aabbccdd-space");
        put(&store, &blob, b"content");

        let spaces = temp.path().join("spaces");
        fs::write(spaces.join("stray"), b"").unwrap();
        fs::write(spaces.join("aa/stray"), b"").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::{symlink, PermissionsExt};
            symlink("missing", spaces.join("dangling")).unwrap();
            let locked = spaces.join("zz");
            fs::create_dir_all(locked.join("locked-space")).unwrap();
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
            let listed = store.list();
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            assert_eq!(listed.unwrap(), vec![blob]);
        }
        #[cfg(not(unix))]
        assert_eq!(store.list().unwrap(), vec![blob]);
    }

    #[test]
    fn test_list_without_spaces_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = OcisBlobstore::new(temp.path());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_delete() {
        let temp = TempDir::new().unwrap();
        let store = OcisBlobstore::new(temp.path());
        let blob = BlobHandle::new(uuid::Uuid::new_v4().to_string(), "space-one");
        let path = put(&store, &blob, b"x");

        store.delete(&blob).unwrap();
        assert!(!path.exists());
        assert!(matches!(
            store.delete(&blob),
            Err(BlobstoreError::NotFound { .. })
        ));
    }
}
