mod common;

use std::path::{Path, PathBuf};

use common::{p, probes, store};
use vfswatch::errors::WatchError;
use vfswatch::fs::mock::MockFileSystem;
use vfswatch::snapshot::{NoopDiffListener, SnapshotHierarchy};
use vfswatch::watch::{ProbeState, WatchFilter, WatchableHierarchies, WatchedHierarchies};
use vfswatch_test_utils::{dir, file, missing};

fn invalidator(path: &Path, root: SnapshotHierarchy) -> SnapshotHierarchy {
    root.invalidate(path, &mut NoopDiffListener)
}

fn recently_used(watchable: &WatchableHierarchies) -> Vec<PathBuf> {
    watchable.recently_used().map(Path::to_path_buf).collect()
}

#[test]
fn registration_order_is_most_recently_used_first() {
    let fs = MockFileSystem::new();
    let mut watchable = WatchableHierarchies::new(probes(&fs), WatchFilter::allow_all());
    let root = SnapshotHierarchy::empty();

    for h in ["/a", "/b", "/c"] {
        watchable.register_watchable_hierarchy(&p(h), &root).unwrap();
    }
    assert_eq!(recently_used(&watchable), vec![p("/c"), p("/b"), p("/a")]);

    watchable.register_watchable_hierarchy(&p("/a"), &root).unwrap();
    assert_eq!(recently_used(&watchable), vec![p("/a"), p("/c"), p("/b")]);
    assert_eq!(watchable.len(), 3);
}

#[test]
fn least_recently_used_hierarchies_are_evicted_over_the_limit() {
    let fs = MockFileSystem::new();
    let probes = probes(&fs);
    let mut watchable = WatchableHierarchies::new(probes.clone(), WatchFilter::allow_all());
    let mut root = SnapshotHierarchy::empty();
    for h in ["/a", "/b", "/c"] {
        watchable.register_watchable_hierarchy(&p(h), &root).unwrap();
        root = store(&root, file(format!("{h}/f"))).0;
    }

    let root =
        watchable.remove_watched_hierarchies_over_limit(root, |_| true, 2, &mut invalidator);

    assert_eq!(recently_used(&watchable), vec![p("/c"), p("/b")]);
    assert!(root.find(&p("/a/f")).is_none());
    assert!(root.find(&p("/b/f")).is_some());
    assert!(root.find(&p("/c/f")).is_some());
    assert_eq!(probes.probe_state(&p("/a")), None);
    assert!(!watchable.is_in_watchable_hierarchy(&p("/a/f")));
}

#[test]
fn unwatched_candidates_are_dropped_and_their_content_invalidated() {
    let fs = MockFileSystem::new();
    let mut watchable = WatchableHierarchies::new(probes(&fs), WatchFilter::allow_all());
    let mut root = SnapshotHierarchy::empty();
    for h in ["/a", "/b"] {
        watchable.register_watchable_hierarchy(&p(h), &root).unwrap();
        root = store(&root, file(format!("{h}/f"))).0;
    }

    let root = watchable.remove_unwatchable_content_on_build_finished(
        root,
        |h| h == Path::new("/a"),
        10,
        &mut invalidator,
    );

    assert_eq!(recently_used(&watchable), vec![p("/a")]);
    assert!(root.find(&p("/a/f")).is_some());
    assert!(root.find(&p("/b/f")).is_none());
}

#[test]
fn registering_over_unwatched_content_fails() {
    let fs = MockFileSystem::new();
    let mut watchable = WatchableHierarchies::new(probes(&fs), WatchFilter::allow_all());
    let (root, _) = store(&SnapshotHierarchy::empty(), file("/proj/f"));

    let err = watchable
        .register_watchable_hierarchy(&p("/proj"), &root)
        .unwrap_err();

    match err {
        WatchError::UnwatchedSnapshot {
            snapshot,
            hierarchy,
        } => {
            assert_eq!(snapshot, p("/proj/f"));
            assert_eq!(hierarchy, p("/proj"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(watchable.is_empty());
}

#[test]
fn content_in_ignored_locations_does_not_block_registration() {
    let fs = MockFileSystem::new();
    let filter = WatchFilter::ignoring([p("/proj/.cache")]);
    let mut watchable = WatchableHierarchies::new(probes(&fs), filter);
    let (root, _) = store(&SnapshotHierarchy::empty(), file("/proj/.cache/entry"));

    watchable
        .register_watchable_hierarchy(&p("/proj"), &root)
        .unwrap();

    assert_eq!(recently_used(&watchable), vec![p("/proj")]);
}

#[test]
fn ignored_locations_are_not_watchable() {
    let fs = MockFileSystem::new();
    let filter = WatchFilter::ignoring([p("/cache")]);
    let mut watchable = WatchableHierarchies::new(probes(&fs), filter);

    let err = watchable
        .register_watchable_hierarchy(&p("/cache/sub"), &SnapshotHierarchy::empty())
        .unwrap_err();

    assert!(matches!(err, WatchError::NotWatchable { path, .. } if path == p("/cache/sub")));
    assert!(!watchable.should_watch_location(&p("/cache/sub/x")));
}

#[test]
fn hierarchies_on_unwatchable_file_systems_are_deferred() {
    let fs = MockFileSystem::new();
    let mut watchable = WatchableHierarchies::new(probes(&fs), WatchFilter::allow_all());
    let root = SnapshotHierarchy::empty();

    let root = watchable.remove_unwatchable_content_on_build_start(
        root,
        &[p("/mnt/nfs")],
        &mut invalidator,
    );
    watchable
        .register_watchable_hierarchy(&p("/mnt/nfs/proj"), &root)
        .unwrap();
    assert!(watchable.is_empty());

    // The file system became watchable: the deferred registration is replayed.
    watchable.remove_unwatchable_content_on_build_start(root, &[], &mut invalidator);
    assert_eq!(recently_used(&watchable), vec![p("/mnt/nfs/proj")]);
}

#[test]
fn deferred_registrations_are_forgotten_when_the_build_finishes() {
    let fs = MockFileSystem::new();
    let mut watchable = WatchableHierarchies::new(probes(&fs), WatchFilter::allow_all());
    let root = watchable.remove_unwatchable_content_on_build_start(
        SnapshotHierarchy::empty(),
        &[p("/mnt/nfs")],
        &mut invalidator,
    );
    watchable
        .register_watchable_hierarchy(&p("/mnt/nfs/proj"), &root)
        .unwrap();

    let root =
        watchable.remove_unwatchable_content_on_build_finished(root, |_| true, 10, &mut invalidator);
    watchable.remove_unwatchable_content_on_build_start(root, &[], &mut invalidator);

    assert!(watchable.is_empty());
}

#[test]
fn unwatched_snapshots_are_removed_but_ignored_content_is_kept() {
    let fs = MockFileSystem::new();
    let filter = WatchFilter::ignoring([p("/cache")]);
    let mut watchable = WatchableHierarchies::new(probes(&fs), filter);
    watchable
        .register_watchable_hierarchy(&p("/proj"), &SnapshotHierarchy::empty())
        .unwrap();

    let mut root = SnapshotHierarchy::empty();
    root = store(&root, file("/proj/f")).0;
    root = store(&root, file("/outside/f")).0;
    root = store(&root, file("/cache/f")).0;
    root = store(
        &root,
        file("/proj/linked").with_access(vfswatch::snapshot::AccessType::ViaSymlink),
    )
    .0;

    let root = watchable.remove_unwatched_snapshots(root, &mut invalidator);

    assert!(root.find(&p("/proj/f")).is_some());
    assert!(root.find(&p("/cache/f")).is_some());
    assert!(root.find(&p("/outside/f")).is_none());
    assert!(root.find(&p("/proj/linked")).is_none());
}

#[test]
fn unproven_hierarchies_are_dropped_at_build_start() {
    let fs = MockFileSystem::new();
    fs.add_dir("/proj");
    fs.add_dir("/other");
    let probes = probes(&fs);
    let mut watchable = WatchableHierarchies::new(probes.clone(), WatchFilter::allow_all());
    let mut root = SnapshotHierarchy::empty();
    for h in ["/proj", "/other"] {
        watchable.register_watchable_hierarchy(&p(h), &root).unwrap();
        root = store(&root, file(format!("{h}/f"))).0;
        probes.arm_watch_probe(&p(h));
    }
    assert!(probes.trigger_watch_probe(&p("/other/.vfswatch-probe")));

    let root = watchable.remove_unwatchable_content_on_build_start(root, &[], &mut invalidator);

    assert_eq!(recently_used(&watchable), vec![p("/other")]);
    assert!(root.find(&p("/proj/f")).is_none());
    assert!(root.find(&p("/other/f")).is_some());
    assert_eq!(probes.probe_state(&p("/other")), Some(ProbeState::Triggered));
}

#[test]
fn hierarchies_without_content_are_not_watched() {
    let fs = MockFileSystem::new();
    let mut watchable = WatchableHierarchies::new(probes(&fs), WatchFilter::allow_all());
    let mut root = SnapshotHierarchy::empty();
    watchable.register_watchable_hierarchy(&p("/a"), &root).unwrap();
    watchable.register_watchable_hierarchy(&p("/b"), &root).unwrap();
    root = store(&root, file("/a/f")).0;

    let watched = WatchedHierarchies::resolve(&watchable, &root, &fs);

    assert_eq!(watched.hierarchies().collect::<Vec<_>>(), vec![Path::new("/a")]);
    assert!(watched.contains(&p("/a/deep/file")));
    assert!(!watched.contains(&p("/b/f")));
}

#[test]
fn missing_content_is_watched_from_the_first_existing_ancestor() {
    let fs = MockFileSystem::new();
    fs.add_dir("/proj");
    let mut watchable = WatchableHierarchies::new(probes(&fs), WatchFilter::allow_all());
    watchable
        .register_watchable_hierarchy(&p("/proj/gen"), &SnapshotHierarchy::empty())
        .unwrap();
    let (root, _) = store(&SnapshotHierarchy::empty(), missing("/proj/gen/out"));

    let watched = WatchedHierarchies::resolve(&watchable, &root, &fs);

    assert_eq!(watched.location_of(&p("/proj/gen")), Some(Path::new("/proj")));
    assert_eq!(watched.watched_roots(), vec![p("/proj")]);
}

#[test]
fn nested_hierarchies_collapse_into_the_broadest() {
    let fs = MockFileSystem::new();
    let mut watchable = WatchableHierarchies::new(probes(&fs), WatchFilter::allow_all());
    let empty = SnapshotHierarchy::empty();
    watchable.register_watchable_hierarchy(&p("/proj"), &empty).unwrap();
    watchable
        .register_watchable_hierarchy(&p("/proj/sub"), &empty)
        .unwrap();
    let (root, _) = store(&empty, dir("/proj/sub", vec![file("/proj/sub/f")]));

    let watched = WatchedHierarchies::resolve(&watchable, &root, &fs);

    assert_eq!(watched.hierarchies().collect::<Vec<_>>(), vec![Path::new("/proj")]);
    assert_eq!(watched.watched_roots(), vec![p("/proj")]);
}

#[test]
fn hierarchies_with_only_ignored_content_are_not_watched() {
    let fs = MockFileSystem::new();
    let filter = WatchFilter::ignoring([p("/proj/.cache")]);
    let mut watchable = WatchableHierarchies::new(probes(&fs), filter);
    watchable
        .register_watchable_hierarchy(&p("/proj"), &SnapshotHierarchy::empty())
        .unwrap();
    let (root, _) = store(&SnapshotHierarchy::empty(), file("/proj/.cache/entry"));

    let watched = WatchedHierarchies::resolve(&watchable, &root, &fs);

    assert!(watched.is_empty());
}
