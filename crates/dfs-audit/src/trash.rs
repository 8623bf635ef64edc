//! Trash purge: drop trash links whose trashed node no longer exists.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{bounded, Sender};
use dfs_config::{log_trash_info, log_trash_warn};

use crate::grammar::{self, TRASH_DIR};
use crate::{AuditError, CancelToken, Result};

/// Glob matching every trash link, relative to the base path
pub const TRASH_GLOB: &str = "spaces/*/*/trash/*/*/*/*/*";

/// A trash link pointing at nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedEntry {
    pub link: PathBuf,
    /// Where the link points (does not exist)
    pub target: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrashPurgeStats {
    /// Abandoned entries found
    pub found: u64,
    /// Entries removed (zero in dry-run)
    pub removed: u64,
    pub dry_run: bool,
}

impl TrashPurgeStats {
    pub fn summary(&self) -> String {
        if self.found == 0 {
            "no abandoned trash entries found".to_string()
        } else if self.dry_run {
            format!("would remove {} abandoned trash entries", self.found)
        } else {
            format!(
                "removed {} of {} abandoned trash entries",
                self.removed, self.found
            )
        }
    }
}

/// Stream every abandoned trash link under `root` into `tx`.
pub fn scan(root: &Path, tx: &Sender<AbandonedEntry>, cancel: &CancelToken) {
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        TRASH_GLOB
    );
    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            log_trash_warn!(
                "Invalid trash pattern",
                pattern = pattern.as_str(),
                error = tracing::field::display(&e)
            );
            return;
        }
    };

    for entry in paths {
        if cancel.is_cancelled() {
            return;
        }
        let link = match entry {
            Ok(link) => link,
            Err(e) => {
                log_trash_warn!(
                    "Failed to expand trash pattern",
                    error = tracing::field::display(&e)
                );
                continue;
            }
        };

        let target = match fs::read_link(&link) {
            Ok(target) => target,
            Err(e) => {
                log_trash_warn!(
                    "Skipping unreadable trash link",
                    path = tracing::field::display(link.display()),
                    error = tracing::field::display(&e)
                );
                continue;
            }
        };

        let target = grammar::resolve_link(&link, &target);
        match fs::symlink_metadata(&target) {
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                log_trash_warn!(
                    "Cannot stat trash target",
                    path = tracing::field::display(target.display()),
                    error = tracing::field::display(&e)
                );
                continue;
            }
        }

        if tx.send(AbandonedEntry { link, target }).is_err() {
            return;
        }
    }
}

/// Remove abandoned trash links under `root`, then any shard directories
/// that become empty, stopping at the space's `trash/` directory.
///
/// Only the link itself is deleted, never its shard directory as a whole:
/// trash links of other nodes sharing the same ID prefix live next to it.
///
/// `on_entry` sees each abandoned entry and whether it was removed.
pub fn purge_orphaned_trash<F>(
    root: &Path,
    dry_run: bool,
    cancel: &CancelToken,
    mut on_entry: F,
) -> Result<TrashPurgeStats>
where
    F: FnMut(&AbandonedEntry, bool),
{
    let root = crate::ensure_root(root)?;
    let root = root.as_path();

    let (tx, rx) = bounded(0);
    let scanner = {
        let root = root.to_path_buf();
        let cancel = cancel.clone();
        thread::spawn(move || scan(&root, &tx, &cancel))
    };

    let mut stats = TrashPurgeStats {
        dry_run,
        ..TrashPurgeStats::default()
    };
    for entry in rx {
        stats.found += 1;
        let removed = !dry_run && remove_entry(&entry);
        if removed {
            stats.removed += 1;
        }
        on_entry(&entry, removed);
    }

    if scanner.join().is_err() {
        return Err(AuditError::Io(io::Error::other("trash scanner panicked")));
    }
    if cancel.is_cancelled() {
        return Err(AuditError::Cancelled);
    }
    Ok(stats)
}

fn remove_entry(entry: &AbandonedEntry) -> bool {
    if let Err(e) = fs::remove_file(&entry.link) {
        log_trash_warn!(
            "Failed to remove trash link",
            path = tracing::field::display(entry.link.display()),
            error = tracing::field::display(&e)
        );
        return false;
    }
    log_trash_info!(
        "Removed abandoned trash link",
        path = tracing::field::display(entry.link.display())
    );

    prune_empty_parents(&entry.link);
    true
}

/// Remove now-empty shard directories above `link` up to `trash/`.
fn prune_empty_parents(link: &Path) {
    let mut dir = link.parent();
    while let Some(current) = dir {
        if current.file_name().map(|n| n == TRASH_DIR).unwrap_or(true) {
            break;
        }
        // Fails on the first non-empty directory, which ends the walk.
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StorageFixture;

    #[test]
    fn test_summary() {
        assert_eq!(
            TrashPurgeStats::default().summary(),
            "no abandoned trash entries found"
        );
        let stats = TrashPurgeStats {
            found: 2,
            removed: 0,
            dry_run: true,
        };
        assert_eq!(stats.summary(), "would remove 2 abandoned trash entries");
    }

    #[test]
    fn test_prune_stops_at_trash_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let trash = temp.path().join("trash");
        let shard = trash.join("aa/bb/cc/dd");
        fs::create_dir_all(&shard).unwrap();
        fs::create_dir_all(trash.join("aa/keep")).unwrap();

        prune_empty_parents(&shard.join("-link"));

        assert!(!trash.join("aa/bb").exists());
        assert!(trash.join("aa/keep").exists());
        assert!(trash.exists());
    }

    #[test]
    fn test_live_trash_entries_are_kept() {
        let fixture = StorageFixture::new().unwrap();
        let space = fixture.add_space().unwrap();
        let file = fixture.add_file(&space, &space.root, "a", b"a").unwrap();
        fixture.trash(&file).unwrap();

        let stats =
            purge_orphaned_trash(fixture.root(), false, &CancelToken::new(), |_, _| {}).unwrap();
        assert_eq!(stats.found, 0);
    }
}
