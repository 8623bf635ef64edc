use std::fs;

use dfs_audit::grammar::{self, BLOB_SIZE_ATTR, TREE_SIZE_ATTR};
use dfs_audit::testing::{StorageFixture, TestNode, TestSpace};
use dfs_audit::{check_treesize, AuditError, CancelToken};

/// `/docs/a.txt` (3), `/docs/sub/b.txt` (5), `/c.txt` (2), all tree sizes
/// recorded correctly.
struct Tree {
    fixture: StorageFixture,
    space: TestSpace,
    docs: TestNode,
    sub: TestNode,
}

fn tree() -> Tree {
    let fixture = StorageFixture::new().unwrap();
    let space = fixture.add_space().unwrap();
    let docs = fixture.add_dir(&space, &space.root, "docs").unwrap();
    let sub = fixture.add_dir(&space, &docs, "sub").unwrap();
    fixture.add_file(&space, &docs, "a.txt", b"aaa").unwrap();
    fixture.add_file(&space, &sub, "b.txt", b"bbbbb").unwrap();
    fixture.add_file(&space, &space.root, "c.txt", b"cc").unwrap();

    fixture.set_attribute(&sub, TREE_SIZE_ATTR, b"5").unwrap();
    fixture.set_attribute(&docs, TREE_SIZE_ATTR, b"8").unwrap();
    fixture.set_attribute(&space.root, TREE_SIZE_ATTR, b"10").unwrap();

    Tree {
        fixture,
        space,
        docs,
        sub,
    }
}

#[test]
fn test_correct_tree_sizes() {
    let tree = tree();
    let report = check_treesize(tree.fixture.root(), &tree.space.id, &CancelToken::new()).unwrap();

    assert!(report.is_consistent(), "{:?}", report.mismatches);
    assert_eq!(report.containers, 3);
    assert_eq!(report.space_id, tree.space.id);
    assert_eq!(report.space_name, tree.space.id);
}

#[test]
fn test_wrong_tree_size_is_reported() {
    let tree = tree();
    tree.fixture
        .set_attribute(&tree.docs, TREE_SIZE_ATTR, b"7")
        .unwrap();

    let report = check_treesize(tree.fixture.root(), &tree.space.id, &CancelToken::new()).unwrap();

    assert_eq!(report.mismatches.len(), 1);
    let mismatch = &report.mismatches[0];
    assert_eq!(mismatch.origin, "/docs");
    assert_eq!(mismatch.node_id, tree.docs.id);
    assert_eq!(mismatch.internal_path, tree.docs.path);
    assert_eq!(mismatch.calculated, 8);
    assert_eq!(mismatch.recorded, 7);
}

#[test]
fn test_nested_and_root_mismatches_in_walk_order() {
    let tree = tree();
    tree.fixture
        .set_attribute(&tree.sub, TREE_SIZE_ATTR, b"0")
        .unwrap();
    tree.fixture
        .set_attribute(&tree.space.root, TREE_SIZE_ATTR, b"11")
        .unwrap();

    let report = check_treesize(tree.fixture.root(), &tree.space.id, &CancelToken::new()).unwrap();

    let origins: Vec<&str> = report.mismatches.iter().map(|m| m.origin.as_str()).collect();
    assert_eq!(origins, vec!["/docs/sub", "/"]);
    assert_eq!(report.mismatches[1].node_id, tree.space.id);
    assert_eq!(report.mismatches[1].calculated, 10);
}

#[test]
fn test_missing_root_tree_size_counts_as_zero() {
    let fixture = StorageFixture::new().unwrap();
    let space = fixture.add_space().unwrap();
    fixture.add_file(&space, &space.root, "c.txt", b"cc").unwrap();

    let report = check_treesize(fixture.root(), &space.id, &CancelToken::new()).unwrap();
    assert_eq!(report.mismatches.len(), 1);
    assert_eq!(report.mismatches[0].recorded, 0);
    assert_eq!(report.mismatches[0].calculated, 2);
}

#[test]
fn test_unreadable_sizes_abort() {
    let tree = tree();
    let bad = tree
        .fixture
        .add_file(&tree.space, &tree.sub, "bad", b"x")
        .unwrap();
    tree.fixture
        .set_attribute(&bad, BLOB_SIZE_ATTR, b"lots")
        .unwrap();

    let err = check_treesize(tree.fixture.root(), &tree.space.id, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, AuditError::Metadata { ref path, .. } if *path == bad.path));

    let other = tree_without_docs_size();
    let err = check_treesize(other.fixture.root(), &other.space.id, &CancelToken::new()).unwrap_err();
    assert!(err.to_string().contains(TREE_SIZE_ATTR));
}

fn tree_without_docs_size() -> Tree {
    let tree = tree();
    let path = grammar::metadata_path(&tree.docs.path);
    let mut attributes = dfs_audit::metadata::read(&path).unwrap();
    attributes.remove(TREE_SIZE_ATTR);
    dfs_audit::metadata::write(&path, &attributes).unwrap();
    tree
}

#[test]
fn test_unknown_space_and_cancellation() {
    let tree = tree();
    let err = check_treesize(
        tree.fixture.root(),
        "00000000-0000-4000-8000-000000000000",
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, AuditError::NodeNotFound(_)));

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = check_treesize(tree.fixture.root(), &tree.space.id, &cancel).unwrap_err();
    assert!(matches!(err, AuditError::Cancelled));
}

#[cfg(unix)]
#[test]
fn test_link_cycle_is_counted_once() {
    let tree = tree();
    // sub links back to docs
    std::os::unix::fs::symlink(
        format!("../../../../../{}", grammar::pathify(&tree.docs.id, 4, 2)),
        tree.sub.path.join("loop"),
    )
    .unwrap();

    let report = check_treesize(tree.fixture.root(), &tree.space.id, &CancelToken::new()).unwrap();
    assert!(report.is_consistent(), "{:?}", report.mismatches);
    assert!(fs::symlink_metadata(tree.sub.path.join("loop")).is_ok());
}
