use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dfs_audit::consistency::{BlobData, CrawlEvent, LinkData, NodeData, Reconciler};
use dfs_audit::grammar;
use dfs_audit::testing::StorageFixture;
use dfs_audit::{check, AuditError, CancelToken, Inconsistency, Report};
use dfs_blobstore::{Blobstore, OcisBlobstore};

fn reconcile(events: &[CrawlEvent]) -> Report {
    let mut reconciler = Reconciler::new();
    for event in events {
        reconciler.handle(event.clone());
    }
    reconciler.finish()
}

/// Heap's algorithm
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    fn generate<T: Clone>(k: usize, items: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
        if k <= 1 {
            out.push(items.clone());
            return;
        }
        generate(k - 1, items, out);
        for i in 0..k - 1 {
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
            generate(k - 1, items, out);
        }
    }

    let mut items = items.to_vec();
    let mut out = Vec::new();
    let k = items.len();
    generate(k, &mut items, &mut out);
    out
}

fn node(path: &str, blob: Option<&str>, requires_symlink: bool) -> CrawlEvent {
    CrawlEvent::Node(NodeData {
        node_path: path.into(),
        blob_path: blob.map(PathBuf::from),
        requires_symlink,
        inconsistencies: vec![],
    })
}

fn link(link: &str, node: &str) -> CrawlEvent {
    CrawlEvent::Link(LinkData {
        link_path: link.into(),
        node_path: node.into(),
    })
}

fn blob(path: &str) -> CrawlEvent {
    CrawlEvent::Blob(BlobData {
        blob_path: path.into(),
    })
}

#[test]
fn test_worked_example_in_any_order() {
    let events = [node("n", Some("b"), true), link("l", "n"), blob("b")];
    for order in permutations(&events) {
        let report = reconcile(&order);
        assert!(report.is_consistent(), "order {order:?} left {report:?}");
    }
}

#[test]
fn test_report_is_order_independent() {
    let events = [
        node("n1", Some("b1"), true),
        node("n2", Some("b2"), true),
        node("rev", Some("b3"), false),
        link("l1", "n1"),
        link("l3", "gone"),
        blob("b1"),
        blob("orphan"),
    ];

    let expected = reconcile(&events);
    assert_eq!(
        expected.nodes.get(Path::new("n2")),
        Some(&vec![Inconsistency::SymlinkMissing])
    );
    assert_eq!(
        expected.linked_nodes.get(Path::new("gone")),
        Some(&vec![Inconsistency::NodeMissing])
    );
    assert_eq!(
        expected.blobs.get(Path::new("orphan")),
        Some(&vec![Inconsistency::BlobOrphaned])
    );
    assert_eq!(expected.blob_references.len(), 2);
    assert_eq!(expected.len(), 5);

    let orders = permutations(&events);
    assert_eq!(orders.len(), 5040);
    for order in orders {
        assert_eq!(reconcile(&order), expected);
    }
}

#[test]
fn test_clean_tree_is_consistent() {
    let fixture = StorageFixture::new().unwrap();
    let space = fixture.add_space().unwrap();
    let dir = fixture.add_dir(&space, &space.root, "docs").unwrap();
    let file = fixture.add_file(&space, &dir, "a.txt", b"hello").unwrap();
    fixture.add_revision(&file).unwrap();
    let old = fixture.add_file(&space, &space.root, "old.txt", b"bye").unwrap();
    fixture.trash(&old).unwrap();

    let report = check(fixture.root(), fixture.blobstore(), &CancelToken::new()).unwrap();
    assert!(report.is_consistent(), "unexpected findings: {report:?}");
}

#[test]
fn test_relative_base_path_is_consistent() {
    let fixture = StorageFixture::new().unwrap();
    let space = fixture.add_space().unwrap();
    let dir = fixture.add_dir(&space, &space.root, "docs").unwrap();
    fixture.add_file(&space, &dir, "a.txt", b"hello").unwrap();
    let old = fixture.add_file(&space, &space.root, "old.txt", b"bye").unwrap();
    fixture.trash(&old).unwrap();

    let relative = fixture.relative_root().unwrap();
    assert!(relative.starts_with("./.."));
    let blobstore: Arc<dyn Blobstore> = Arc::new(OcisBlobstore::new(&relative));

    let report = check(&relative, blobstore, &CancelToken::new()).unwrap();
    assert!(report.is_consistent(), "unexpected findings: {report:?}");
}

#[test]
fn test_corrupted_tree_reports_every_class() {
    let fixture = StorageFixture::new().unwrap();
    let space = fixture.add_space().unwrap();
    let root = &space.root;

    let blobless = fixture.add_file(&space, root, "blobless", b"1").unwrap();
    let unlinked = fixture.add_file(&space, root, "unlinked", b"2").unwrap();
    let vanished = fixture.add_file(&space, root, "vanished", b"3").unwrap();
    let no_meta = fixture.add_file(&space, root, "no-meta", b"4").unwrap();
    let bare_meta = fixture.add_file(&space, root, "bare-meta", b"5").unwrap();

    let missing_blob = fixture.blob_path(&space, blobless.blob_id.as_deref().unwrap());
    fs::remove_file(&missing_blob).unwrap();

    let orphan_blob = fixture.blob_path(&space, "ffffffff-0000-4000-8000-00000000dead");
    fs::create_dir_all(orphan_blob.parent().unwrap()).unwrap();
    fs::write(&orphan_blob, b"orphan").unwrap();

    fs::remove_file(unlinked.link.as_ref().unwrap()).unwrap();

    fs::remove_file(&vanished.path).unwrap();
    fs::remove_file(grammar::metadata_path(&vanished.path)).unwrap();
    fs::remove_file(grammar::lock_path(&vanished.path)).unwrap();

    fs::remove_file(grammar::metadata_path(&no_meta.path)).unwrap();
    fs::remove_file(&bare_meta.path).unwrap();

    let report = check(fixture.root(), fixture.blobstore(), &CancelToken::new()).unwrap();

    assert_eq!(
        report.blob_references.get(&missing_blob),
        Some(&vec![Inconsistency::BlobMissing])
    );
    assert_eq!(report.referencing_nodes.get(&missing_blob), Some(&blobless.path));
    assert_eq!(
        report.blobs.get(&orphan_blob),
        Some(&vec![Inconsistency::BlobOrphaned])
    );
    assert_eq!(
        report.nodes.get(&unlinked.path),
        Some(&vec![Inconsistency::SymlinkMissing])
    );
    assert_eq!(
        report.linked_nodes.get(&vanished.path),
        Some(&vec![Inconsistency::NodeMissing])
    );
    assert_eq!(report.owning_links.get(&vanished.path), vanished.link.as_ref());
    assert_eq!(
        report.nodes.get(&no_meta.path),
        Some(&vec![Inconsistency::MetadataMissing])
    );
    assert_eq!(
        report.nodes.get(&bare_meta.path),
        Some(&vec![Inconsistency::FilesMissing])
    );

    // The vanished node's blob, the metadata-less node's blob and the
    // bare-metadata node's blob are now unreferenced too.
    assert_eq!(report.blobs.len(), 4);
    assert_eq!(report.len(), 9);
}

#[test]
fn test_empty_base_path_is_fatal() {
    let temp = tempfile::TempDir::new().unwrap();
    let fixture = StorageFixture::new().unwrap();
    let result = check(temp.path(), fixture.blobstore(), &CancelToken::new());
    assert!(matches!(result, Err(AuditError::NoSpacesFound { .. })));
}

#[test]
fn test_cancelled_check() {
    let fixture = StorageFixture::new().unwrap();
    let space = fixture.add_space().unwrap();
    fixture.add_file(&space, &space.root, "a", b"a").unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let result = check(fixture.root(), fixture.blobstore(), &cancel);
    assert!(matches!(result, Err(AuditError::Cancelled)));
}
