// src/snapshot/capture.rs

//! Building snapshots from the disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::fs::FileSystem;

use super::{AccessType, FileSystemSnapshot};

/// Snapshot whatever currently exists at `path`.
///
/// Directories are captured completely. Anything reached through a symlink is
/// marked [`AccessType::ViaSymlink`]; symlink cycles end in an empty directory.
pub fn snapshot_location(fs: &dyn FileSystem, path: &Path) -> Result<FileSystemSnapshot> {
    let mut visited = HashSet::new();
    capture(fs, path, AccessType::Direct, &mut visited)
}

fn capture(
    fs: &dyn FileSystem,
    path: &Path,
    inherited: AccessType,
    visited: &mut HashSet<PathBuf>,
) -> Result<FileSystemSnapshot> {
    let access = if fs.is_symlink(path) {
        AccessType::ViaSymlink
    } else {
        inherited
    };

    if fs.is_dir(path) {
        let canonical = fs.canonicalize(path)?;
        if !visited.insert(canonical.clone()) {
            debug!(?path, "symlink cycle while snapshotting");
            return Ok(FileSystemSnapshot::directory(path, Vec::new()).with_access(access));
        }
        let mut children = Vec::new();
        for child in fs.read_dir(path)? {
            children.push(capture(fs, &child, access, visited)?);
        }
        visited.remove(&canonical);
        return Ok(FileSystemSnapshot::directory(path, children).with_access(access));
    }

    if fs.is_file(path) {
        let len = fs.file_len(path)?;
        return Ok(FileSystemSnapshot::regular_file(path, len).with_access(access));
    }

    Ok(FileSystemSnapshot::missing(path).with_access(access))
}
