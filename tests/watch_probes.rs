mod common;

use common::{p, probes};
use vfswatch::fs::mock::MockFileSystem;
use vfswatch::watch::ProbeState;

#[test]
fn probe_lives_directly_below_the_hierarchy() {
    let fs = MockFileSystem::new();
    let probes = probes(&fs);

    assert_eq!(probes.probe_location(&p("/proj")), p("/proj/.vfswatch-probe"));
    assert_eq!(probes.probe_directory(&p("/proj")), p("/proj"));
}

#[test]
fn arming_writes_the_probe_file() {
    let fs = MockFileSystem::new();
    fs.add_dir("/proj");
    let probes = probes(&fs);

    probes.register_probe(&p("/proj"));
    assert_eq!(probes.probe_state(&p("/proj")), Some(ProbeState::Unarmed));

    probes.arm_watch_probe(&p("/proj"));
    assert_eq!(probes.probe_state(&p("/proj")), Some(ProbeState::Armed));
    assert!(fs.contents("/proj/.vfswatch-probe").is_some());
}

#[test]
fn failing_to_write_leaves_the_probe_unarmed() {
    let fs = MockFileSystem::new();
    fs.add_dir("/proj");
    fs.make_read_only("/proj");
    let probes = probes(&fs);

    probes.register_probe(&p("/proj"));
    probes.arm_watch_probe(&p("/proj"));

    assert_eq!(probes.probe_state(&p("/proj")), Some(ProbeState::Unarmed));
    assert_eq!(probes.unproven_hierarchies().count(), 0);
}

#[test]
fn triggered_probes_are_proven_and_stay_triggered() {
    let fs = MockFileSystem::new();
    fs.add_dir("/a");
    fs.add_dir("/b");
    let probes = probes(&fs);
    probes.register_probe(&p("/a"));
    probes.register_probe(&p("/b"));
    probes.arm_watch_probe(&p("/a"));
    probes.arm_watch_probe(&p("/b"));

    assert!(probes.trigger_watch_probe(&p("/a/.vfswatch-probe")));
    assert_eq!(probes.unproven_hierarchies().collect::<Vec<_>>(), vec![p("/b")]);

    // Neither disarming nor re-arming leaves the triggered state.
    probes.disarm_watch_probe(&p("/a"));
    probes.arm_watch_probe(&p("/a"));
    assert_eq!(probes.probe_state(&p("/a")), Some(ProbeState::Triggered));
}

#[test]
fn unrelated_paths_do_not_trigger() {
    let fs = MockFileSystem::new();
    let probes = probes(&fs);
    probes.register_probe(&p("/a"));

    assert!(!probes.trigger_watch_probe(&p("/a/file.txt")));
    assert!(!probes.trigger_watch_probe(&p("/b/.vfswatch-probe")));
}

#[test]
fn disarm_returns_to_unarmed() {
    let fs = MockFileSystem::new();
    fs.add_dir("/a");
    let probes = probes(&fs);
    probes.register_probe(&p("/a"));
    probes.arm_watch_probe(&p("/a"));

    probes.disarm_watch_probe(&p("/a"));

    assert_eq!(probes.probe_state(&p("/a")), Some(ProbeState::Unarmed));
}

#[test]
fn removed_probes_are_forgotten() {
    let fs = MockFileSystem::new();
    fs.add_dir("/a");
    let probes = probes(&fs);
    probes.register_probe(&p("/a"));
    probes.arm_watch_probe(&p("/a"));

    probes.remove_probe(&p("/a"));

    assert_eq!(probes.probe_state(&p("/a")), None);
    assert!(!probes.trigger_watch_probe(&p("/a/.vfswatch-probe")));
    assert_eq!(probes.unproven_hierarchies().count(), 0);
}
