//! s3ng blobstore read through a local mount (or mirror) of its bucket.
//!
//! Object keys are `<spaceID>/<pathify(blobID,4,2)>`, so the mounted bucket
//! is an ordinary directory tree.

use std::path::{Path, PathBuf};

use dfs_config::{log_blobstore_debug, log_blobstore_warn};
use walkdir::WalkDir;

use crate::layout::{join_segments, pathify_segments};
use crate::{read_subdirs, remove_blob_file, BlobHandle, Blobstore, Result};

#[derive(Debug, Clone)]
pub struct S3ngBlobstore {
    bucket: PathBuf,
}

impl S3ngBlobstore {
    pub fn new<P: AsRef<Path>>(bucket: P) -> Self {
        Self {
            bucket: bucket.as_ref().to_path_buf(),
        }
    }
}

impl Blobstore for S3ngBlobstore {
    fn list(&self) -> Result<Vec<BlobHandle>> {
        let mut blobs = Vec::new();
        for space in read_subdirs(&self.bucket)? {
            let space_id = space.file_name().to_string_lossy().into_owned();
            let space_dir = space.path();

            for entry in WalkDir::new(&space_dir).min_depth(5).max_depth(5) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        log_blobstore_warn!(
                            "Failed to read bucket prefix",
                            error = tracing::field::display(&e)
                        );
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&space_dir) else {
                    continue;
                };
                let blob_id = join_segments(relative.iter().filter_map(|c| c.to_str()));
                blobs.push(BlobHandle::new(blob_id, space_id.clone()));
            }
        }
        log_blobstore_debug!("Listed s3ng blobs", count = blobs.len());
        Ok(blobs)
    }

    fn path(&self, blob: &BlobHandle) -> PathBuf {
        let mut path = self.bucket.join(&blob.space_id);
        path.extend(pathify_segments(&blob.blob_id, 4, 2));
        path
    }

    fn delete(&self, blob: &BlobHandle) -> Result<()> {
        remove_blob_file(&self.path(blob), blob)
    }

    fn name(&self) -> &'static str {
        "s3ng"
    }
}
