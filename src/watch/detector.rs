// src/watch/detector.rs

//! Detecting file systems that cannot be watched reliably.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::fs::FileSystem;

/// File system types whose change notifications are missing or unreliable.
pub const UNSUPPORTED_FILE_SYSTEM_TYPES: &[&str] = &[
    "nfs",
    "nfs4",
    "cifs",
    "smbfs",
    "smb3",
    "autofs",
    "9p",
    "fuse.sshfs",
];

pub trait WatchableFileSystemDetector: Send + Sync + Debug {
    /// Mount points of file systems that must not be watched.
    fn detect_unsupported_file_systems(&self) -> Vec<PathBuf>;
}

/// Reads the mount table and adds the configured mount points.
#[derive(Debug)]
pub struct MountTableDetector {
    fs: Arc<dyn FileSystem>,
    mount_table: PathBuf,
    configured: Vec<PathBuf>,
}

impl MountTableDetector {
    pub fn new(fs: Arc<dyn FileSystem>, configured: Vec<PathBuf>) -> Self {
        Self {
            fs,
            mount_table: PathBuf::from("/proc/mounts"),
            configured,
        }
    }

    pub fn with_mount_table(mut self, mount_table: impl Into<PathBuf>) -> Self {
        self.mount_table = mount_table.into();
        self
    }
}

impl WatchableFileSystemDetector for MountTableDetector {
    fn detect_unsupported_file_systems(&self) -> Vec<PathBuf> {
        let mut unsupported = self.configured.clone();
        match self.fs.read_to_string(&self.mount_table) {
            Ok(table) => unsupported.extend(parse_unsupported_mounts(&table)),
            Err(err) => debug!(
                mount_table = ?self.mount_table,
                error = %err,
                "unable to read mount table"
            ),
        }
        unsupported.sort();
        unsupported.dedup();
        unsupported
    }
}

/// Mount points of unsupported types in `/proc/mounts` format.
pub fn parse_unsupported_mounts(table: &str) -> Vec<PathBuf> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            UNSUPPORTED_FILE_SYSTEM_TYPES
                .contains(&fs_type)
                .then(|| PathBuf::from(unescape_mount_point(mount_point)))
        })
        .collect()
}

/// `/proc/mounts` escapes whitespace and backslashes as `\ooo` octal.
fn unescape_mount_point(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = bytes
            .get(i + 1..i + 4)
            .filter(|_| bytes[i] == b'\\')
            .and_then(|digits| std::str::from_utf8(digits).ok())
            .and_then(|digits| u8::from_str_radix(digits, 8).ok());
        match escaped {
            Some(byte) => {
                out.push(byte);
                i += 4;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
