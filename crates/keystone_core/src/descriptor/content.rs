//! Typed views over descriptor contents.

use serde::{Deserialize, Serialize};

/// One entry of an environment's file index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub checksum: String,
}

/// Content of an `env` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvContent {
    pub name: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl EnvContent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
        }
    }

    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Insert a file entry or update the checksum of an existing one.
    ///
    /// Returns `true` when the index changed.
    pub fn upsert_file(&mut self, name: &str, checksum: &str) -> bool {
        match self.files.iter_mut().find(|f| f.name == name) {
            Some(entry) if entry.checksum == checksum => false,
            Some(entry) => {
                entry.checksum = checksum.to_string();
                true
            }
            None => {
                self.files.push(FileEntry {
                    name: name.to_string(),
                    checksum: checksum.to_string(),
                });
                true
            }
        }
    }

    /// Remove a file entry by name. Returns `true` when it was present.
    pub fn remove_file(&mut self, name: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.name != name);
        self.files.len() != before
    }
}

/// Content of a `project` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContent {
    pub name: String,
    pub created_by: String,
    #[serde(default)]
    pub environments: Vec<String>,
}

impl ProjectContent {
    pub fn has_environment(&self, env: &str) -> bool {
        self.environments.iter().any(|e| e == env)
    }
}
