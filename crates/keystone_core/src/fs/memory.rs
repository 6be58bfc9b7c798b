//! In-memory filesystem, used by tests and embedders without a disk.

use std::collections::HashMap;
use std::io::{Error, ErrorKind, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::FileSystem;

/// An in-memory filesystem implementation
#[derive(Debug, Clone, Default)]
pub struct InMemoryFileSystem {
    files: Arc<RwLock<HashMap<PathBuf, String>>>,
}

impl InMemoryFileSystem {
    /// Create a new empty in-memory filesystem
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, String>> {
        self.files.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, String>> {
        self.files.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Helper to normalize paths (remove . and .. components where possible)
    fn normalize_path(path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    components.pop();
                }
                c => components.push(c),
            }
        }
        components.iter().collect()
    }

    fn not_found(path: &Path) -> Error {
        Error::new(ErrorKind::NotFound, format!("File not found: {:?}", path))
    }
}

impl FileSystem for InMemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read()
            .get(&Self::normalize_path(path))
            .cloned()
            .ok_or_else(|| Self::not_found(path))
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        self.write()
            .insert(Self::normalize_path(path), content.to_string());
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        match self.write().remove(&Self::normalize_path(path)) {
            Some(_) => Ok(()),
            None => Err(Self::not_found(path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.read().contains_key(&Self::normalize_path(path))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.write();
        let content = files
            .remove(&Self::normalize_path(from))
            .ok_or_else(|| Self::not_found(from))?;
        files.insert(Self::normalize_path(to), content);
        Ok(())
    }
}
