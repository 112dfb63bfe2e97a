// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
    Symlink(PathBuf),
}

/// In-memory file system for tests.
///
/// Paths are expected to be absolute. Parent directories are created
/// implicitly whenever a file, directory or symlink is added.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    read_only: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("/"), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
            read_only: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.insert(path.as_ref(), MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut files = self.files.lock().unwrap();
        Self::ensure_dir_entry(&mut files, path);
    }

    pub fn add_symlink(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) {
        self.insert(link.as_ref(), MockEntry::Symlink(target.as_ref().to_path_buf()));
    }

    /// Remove an entry and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut files = self.files.lock().unwrap();
        files.retain(|p, _| !p.starts_with(path));
        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
                let name = name.to_string_lossy();
                children.retain(|c| *c != name);
            }
        }
    }

    /// Make writes below `path` fail.
    pub fn make_read_only(&self, path: impl AsRef<Path>) {
        self.read_only.lock().unwrap().push(path.as_ref().to_path_buf());
    }

    /// Raw contents of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let files = self.files.lock().unwrap();
        match files.get(path.as_ref()) {
            Some(MockEntry::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    fn insert(&self, path: &Path, entry: MockEntry) {
        let mut files = self.files.lock().unwrap();
        if let Some(parent) = path.parent() {
            Self::ensure_dir_entry(&mut files, parent);
            Self::link_child(&mut files, parent, path);
        }
        files.insert(path.to_path_buf(), entry);
    }

    fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        if files.contains_key(path) {
            return;
        }
        files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
        if let Some(parent) = path.parent() {
            Self::ensure_dir_entry(files, parent);
            Self::link_child(files, parent, path);
        }
    }

    fn link_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
        if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
            if let Some(name) = child.file_name().and_then(|n| n.to_str()) {
                if !children.iter().any(|c| c == name) {
                    children.push(name.to_string());
                    children.sort();
                }
            }
        }
    }

    /// Resolve symlinks component by component.
    fn resolve(files: &HashMap<PathBuf, MockEntry>, path: &Path) -> PathBuf {
        let mut resolved = PathBuf::new();
        for component in path.components() {
            resolved.push(component);
            let mut hops = 0;
            while let Some(MockEntry::Symlink(target)) = files.get(&resolved) {
                resolved = target.clone();
                hops += 1;
                if hops > 32 {
                    break;
                }
            }
        }
        resolved
    }

    fn lookup(&self, path: &Path) -> Option<MockEntry> {
        let files = self.files.lock().unwrap();
        let resolved = Self::resolve(&files, path);
        files.get(&resolved).cloned()
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.lookup(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(_) => Err(anyhow!("Not a file: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if self.read_only.lock().unwrap().iter().any(|p| path.starts_with(p)) {
            return Err(anyhow!("Read-only location: {:?}", path));
        }
        match path.parent() {
            Some(parent) if self.is_dir(parent) => {
                self.add_file(path, contents);
                Ok(())
            }
            _ => Err(anyhow!("Parent directory does not exist: {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.lookup(path).is_some()
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lookup(path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lookup(path), Some(MockEntry::Dir(_)))
    }

    fn is_symlink(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        matches!(files.get(path), Some(MockEntry::Symlink(_)))
    }

    fn file_len(&self, path: &Path) -> Result<u64> {
        match self.lookup(path) {
            Some(MockEntry::File(content)) => Ok(content.len() as u64),
            _ => Err(anyhow!("Not a file: {:?}", path)),
        }
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        let files = self.files.lock().unwrap();
        let resolved = Self::resolve(&files, path);
        if files.contains_key(&resolved) {
            Ok(resolved)
        } else {
            Err(anyhow!("File not found: {:?}", path))
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match self.lookup(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}
