use std::path::PathBuf;
use std::sync::Arc;

use vfswatch::fs::mock::MockFileSystem;
use vfswatch::fs::{FileSystem, first_existing_ancestor};
use vfswatch::watch::detector::parse_unsupported_mounts;
use vfswatch::watch::{MountTableDetector, WatchableFileSystemDetector};

const MOUNTS: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda1 / ext4 rw,relatime 0 0
server:/export /mnt/nfs nfs4 rw,relatime,vers=4.2 0 0
//nas/share /mnt/my\\040share cifs rw,relatime 0 0
user@host:/ /home/me/remote fuse.sshfs rw,nosuid 0 0
tmpfs /tmp tmpfs rw 0 0
";

#[test]
fn network_mounts_are_unsupported() {
    assert_eq!(
        parse_unsupported_mounts(MOUNTS),
        vec![
            PathBuf::from("/mnt/nfs"),
            PathBuf::from("/mnt/my share"),
            PathBuf::from("/home/me/remote"),
        ]
    );
}

#[test]
fn malformed_lines_are_skipped() {
    assert!(parse_unsupported_mounts("garbage\n\n/dev/sda1 /\n").is_empty());
}

#[test]
fn detector_merges_configured_and_detected_mounts() {
    let fs = MockFileSystem::new();
    fs.add_file("/proc/mounts", MOUNTS);
    let detector = MountTableDetector::new(
        Arc::new(fs),
        vec![PathBuf::from("/mnt/nfs"), PathBuf::from("/srv/slow")],
    );

    assert_eq!(
        detector.detect_unsupported_file_systems(),
        vec![
            PathBuf::from("/home/me/remote"),
            PathBuf::from("/mnt/my share"),
            PathBuf::from("/mnt/nfs"),
            PathBuf::from("/srv/slow"),
        ]
    );
}

#[test]
fn unreadable_mount_table_falls_back_to_configuration() {
    let fs = MockFileSystem::new();
    let detector = MountTableDetector::new(Arc::new(fs), vec![PathBuf::from("/srv/slow")])
        .with_mount_table("/does/not/exist");

    assert_eq!(
        detector.detect_unsupported_file_systems(),
        vec![PathBuf::from("/srv/slow")]
    );
}

#[test]
fn mock_fs_follows_symlinks() {
    let fs = MockFileSystem::new();
    fs.add_file("/real/file.txt", "content");
    fs.add_symlink("/link", "/real");

    assert!(fs.is_symlink(&PathBuf::from("/link")));
    assert!(fs.is_dir(&PathBuf::from("/link")));
    assert_eq!(
        fs.read_to_string(&PathBuf::from("/link/file.txt")).unwrap(),
        "content"
    );
    assert_eq!(
        fs.canonicalize(&PathBuf::from("/link/file.txt")).unwrap(),
        PathBuf::from("/real/file.txt")
    );
    assert_eq!(
        fs.read_dir(&PathBuf::from("/real")).unwrap(),
        vec![PathBuf::from("/real/file.txt")]
    );
}

#[test]
fn mock_fs_writes_need_an_existing_parent() {
    let fs = MockFileSystem::new();
    fs.add_dir("/dir");

    fs.write(&PathBuf::from("/dir/a"), b"1").unwrap();
    assert!(fs.write(&PathBuf::from("/nope/a"), b"1").is_err());

    fs.make_read_only("/dir");
    assert!(fs.write(&PathBuf::from("/dir/b"), b"1").is_err());
    assert_eq!(fs.contents("/dir/a"), Some(b"1".to_vec()));
}

#[test]
fn mock_fs_removal_is_recursive() {
    let fs = MockFileSystem::new();
    fs.add_file("/dir/sub/a", "x");

    fs.remove("/dir/sub");

    assert!(!fs.exists(&PathBuf::from("/dir/sub/a")));
    assert!(fs.read_dir(&PathBuf::from("/dir")).unwrap().is_empty());
}

#[test]
fn first_existing_ancestor_walks_up() {
    let fs = MockFileSystem::new();
    fs.add_dir("/proj/src");

    assert_eq!(
        first_existing_ancestor(&fs, &PathBuf::from("/proj/src/gen/out")),
        PathBuf::from("/proj/src")
    );
    assert_eq!(
        first_existing_ancestor(&fs, &PathBuf::from("/other/x")),
        PathBuf::from("/")
    );
}
