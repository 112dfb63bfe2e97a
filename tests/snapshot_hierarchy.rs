mod common;

use std::path::PathBuf;

use common::{invalidate, p, store};
use vfswatch::fs::mock::MockFileSystem;
use vfswatch::snapshot::{AccessType, SnapshotHierarchy, snapshot_location};
use vfswatch_test_utils::{dir, file, missing};

fn root_paths(root: &SnapshotHierarchy) -> Vec<PathBuf> {
    root.root_snapshots().map(|s| s.path().to_path_buf()).collect()
}

#[test]
fn store_makes_nested_locations_findable() {
    let (root, diff) = store(
        &SnapshotHierarchy::empty(),
        dir("/proj", vec![dir("/proj/src", vec![file("/proj/src/main.rs")])]),
    );

    assert!(root.find(&p("/proj/src/main.rs")).unwrap().is_regular_file());
    assert!(root.find(&p("/proj/other")).is_none());
    assert!(diff.removed().is_empty());
    assert_eq!(diff.added().len(), 1);
}

#[test]
fn storing_a_parent_replaces_cached_children() {
    let (root, _) = store(&SnapshotHierarchy::empty(), file("/proj/a"));
    let (root, _) = store(&root, missing("/proj/b"));
    let (root, diff) = store(&root, dir("/proj", vec![file("/proj/a")]));

    assert_eq!(root_paths(&root), vec![p("/proj")]);
    let removed: Vec<_> = diff.removed().iter().map(|s| s.path().to_path_buf()).collect();
    assert_eq!(removed, vec![p("/proj/a"), p("/proj/b")]);
}

#[test]
fn storing_inside_a_cached_directory_updates_it_in_place() {
    let (root, _) = store(
        &SnapshotHierarchy::empty(),
        dir("/proj", vec![dir("/proj/src", vec![])]),
    );
    let (root, diff) = store(&root, file("/proj/src/lib.rs"));

    assert_eq!(root_paths(&root), vec![p("/proj")]);
    assert!(root.find(&p("/proj/src/lib.rs")).is_some());
    assert_eq!(diff.removed().len(), 1);
    assert_eq!(diff.added().len(), 1);
}

#[test]
fn invalidating_inside_a_directory_keeps_the_siblings() {
    let (root, _) = store(
        &SnapshotHierarchy::empty(),
        dir(
            "/proj",
            vec![
                dir("/proj/a", vec![file("/proj/a/x"), file("/proj/a/y")]),
                file("/proj/b"),
            ],
        ),
    );

    let (root, diff) = invalidate(&root, &p("/proj/a/x"));

    assert_eq!(root_paths(&root), vec![p("/proj/a/y"), p("/proj/b")]);
    assert!(root.find(&p("/proj/a/x")).is_none());
    assert_eq!(diff.removed()[0].path(), p("/proj"));
}

#[test]
fn root_snapshots_under_lists_outermost_snapshots() {
    let (root, _) = store(&SnapshotHierarchy::empty(), file("/proj/a"));
    let (root, _) = store(&root, dir("/proj/b", vec![file("/proj/b/c")]));
    let (root, _) = store(&root, file("/other/d"));

    let under: Vec<PathBuf> = root
        .root_snapshots_under(&p("/proj"))
        .into_iter()
        .map(|s| s.path().to_path_buf())
        .collect();
    assert_eq!(under, vec![p("/proj/a"), p("/proj/b")]);

    let inside: Vec<PathBuf> = root
        .root_snapshots_under(&p("/proj/b/c"))
        .into_iter()
        .map(|s| s.path().to_path_buf())
        .collect();
    assert_eq!(inside, vec![p("/proj/b/c")]);
    assert!(root.root_snapshots_under(&p("/nothing")).is_empty());
}

#[test]
fn invalidating_an_unknown_location_keeps_the_hierarchy() {
    let (root, _) = store(&SnapshotHierarchy::empty(), file("/proj/a"));
    let (after, diff) = invalidate(&root, &p("/elsewhere"));

    assert!(after.ptr_eq(&root));
    assert!(diff.is_empty());
}

#[test]
fn invalidate_all_reports_every_root() {
    let (root, _) = store(&SnapshotHierarchy::empty(), file("/a/f"));
    let (root, _) = store(&root, file("/b/f"));

    let mut diff = vfswatch::snapshot::SnapshotCollectingDiffListener::new();
    let root = root.invalidate_all(&mut diff);

    assert!(root.is_empty());
    assert_eq!(diff.removed().len(), 2);
}

#[test]
fn retained_statistics_count_by_kind() {
    let (root, _) = store(
        &SnapshotHierarchy::empty(),
        dir("/proj", vec![file("/proj/a"), file("/proj/b"), dir("/proj/c", vec![])]),
    );
    let (root, _) = store(&root, missing("/gone"));

    let stats = root.retained_statistics();
    assert_eq!(stats.regular_files, 2);
    assert_eq!(stats.directories, 2);
    assert_eq!(stats.missing_files, 1);
}

#[test]
fn capture_marks_content_reached_through_symlinks() {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/main.rs", "fn main() {}");
    fs.add_file("/other/lib.rs", "pub fn lib() {}");
    fs.add_symlink("/proj/link", "/other");

    let snapshot = snapshot_location(&fs, &p("/proj")).unwrap();

    let main = snapshot.find(&p("/proj/src/main.rs")).unwrap();
    assert_eq!(main.access(), AccessType::Direct);
    assert!(main.is_regular_file());

    let linked = snapshot.find(&p("/proj/link/lib.rs")).unwrap();
    assert_eq!(linked.access(), AccessType::ViaSymlink);
}

#[test]
fn capture_of_a_missing_location_is_missing() {
    let fs = MockFileSystem::new();
    let snapshot = snapshot_location(&fs, &p("/nothing/here")).unwrap();
    assert!(snapshot.is_missing());
}
