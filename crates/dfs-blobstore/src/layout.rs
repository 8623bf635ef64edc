//! ID sharding used by both the node tree and the blobstores.
//!
//! ```text
//! pathify("aabbccdd-1234", 4, 2)   => "aa/bb/cc/dd/-1234"
//! blob_shard_path("aabbccdd-1234") => "blobs/aa/bb/cc/dd/-1234"
//! ```

use std::path::PathBuf;

/// Name of the per-space directory holding ocis blobs
pub const BLOBS_DIR: &str = "blobs";

/// Split the first `depth` segments of `width` bytes off `id`.
///
/// The remainder, possibly empty, is the last element. Short IDs stop early
/// rather than fail, so every input yields at least one segment.
pub fn pathify_segments(id: &str, depth: usize, width: usize) -> Vec<&str> {
    let mut segments = Vec::with_capacity(depth + 1);
    let mut i = 0;
    while i < depth {
        let start = i * width;
        let end = start + width;
        if id.len() <= end || !id.is_char_boundary(start) || !id.is_char_boundary(end) {
            break;
        }
        segments.push(&id[start..end]);
        i += 1;
    }
    segments.push(&id[i * width..]);
    segments
}

/// Segment the beginning of an ID into `depth` directories of `width` chars.
pub fn pathify(id: &str, depth: usize, width: usize) -> String {
    pathify_segments(id, depth, width).join("/")
}

/// Relative on-disk location of a blob inside a space: `blobs/ab/cd/ef/12/-rest`
pub fn blob_shard_path(blob_id: &str) -> PathBuf {
    let mut path = PathBuf::from(BLOBS_DIR);
    path.extend(pathify_segments(blob_id, 4, 2));
    path
}

/// Undo [`pathify`]: concatenate sharded path components back into an ID.
pub fn join_segments<'a, I>(segments: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    segments.into_iter().collect()
}
