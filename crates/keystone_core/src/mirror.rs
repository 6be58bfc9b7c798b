//! Local mirror of the last synchronized state of a working directory.
//!
//! The hidden folder (`.keystone/` by default) holds:
//!
//! - `cache/<file>`: content of each tracked file as of the last pull or push
//! - `manifest.json`: hash and descriptor version of each tracked file
//! - `conflicts/`: scratch files presented to a human during a conflict
//!
//! Comparing the working copy against the manifest tells which tracked files
//! carry uncommitted changes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::conflict::{Conflict, ConflictResolution, ConflictResolver};
use crate::descriptor::compute_content_hash;
use crate::error::{KeystoneError, Result};
use crate::fs::{AsyncFileSystem, BoxFuture};
use crate::path::check_file_name;

const MANIFEST_FILE: &str = "manifest.json";
const CACHE_DIR: &str = "cache";
const CONFLICTS_DIR: &str = "conflicts";
const RESET_SUFFIX: &str = ".ksreset";

/// State of a tracked file in the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Ok,
    Modified,
    Deleted,
}

/// A tracked file and how it differs from the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalChange {
    pub path: String,
    pub status: ChangeStatus,
}

impl LocalChange {
    pub fn is_changed(&self) -> bool {
        self.status != ChangeStatus::Ok
    }
}

/// Manifest of the files tracked in a working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Version of the manifest format
    pub version: u32,

    /// When the last pull or push completed
    pub last_sync: Option<DateTime<Utc>>,

    /// Per-file state, keyed by path relative to the working directory
    pub files: BTreeMap<String, TrackedFile>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            last_sync: None,
            files: BTreeMap::new(),
        }
    }
}

impl Manifest {
    /// Current manifest format version
    pub const CURRENT_VERSION: u32 = 1;

    pub fn get_file(&self, path: &str) -> Option<&TrackedFile> {
        self.files.get(path)
    }

    pub fn set_file(&mut self, state: TrackedFile) {
        self.files.insert(state.path.clone(), state);
    }

    pub fn remove_file(&mut self, path: &str) -> Option<TrackedFile> {
        self.files.remove(path)
    }

    pub fn mark_synced(&mut self) {
        self.last_sync = Some(Utc::now());
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Last synchronized state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    /// Path relative to the working directory
    pub path: String,

    /// SHA-256 of the content at last sync
    pub content_hash: String,

    /// Version of the file descriptor at last sync
    pub version: u64,

    pub synced_at: DateTime<Utc>,
}

impl TrackedFile {
    pub fn new(path: impl Into<String>, content: &str, version: u64) -> Self {
        Self {
            path: path.into(),
            content_hash: compute_content_hash(content.as_bytes()),
            version,
            synced_at: Utc::now(),
        }
    }
}

/// The working directory of a checked-out project and its hidden folder.
pub struct Mirror<'a, FS: AsyncFileSystem + ?Sized> {
    fs: &'a FS,
    root: PathBuf,
    hidden_folder: String,
    hidden: PathBuf,
}

impl<'a, FS: AsyncFileSystem + ?Sized> Mirror<'a, FS> {
    pub fn new(fs: &'a FS, root: impl Into<PathBuf>, hidden_folder: &str) -> Self {
        let root = root.into();
        let hidden = root.join(hidden_folder);
        Self {
            fs,
            root,
            hidden_folder: hidden_folder.to_string(),
            hidden,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of `file` in the working directory.
    pub fn working_path(&self, file: &str) -> Result<PathBuf> {
        check_file_name(file, &self.hidden_folder)?;
        Ok(self.root.join(file))
    }

    fn cache_path(&self, file: &str) -> Result<PathBuf> {
        check_file_name(file, &self.hidden_folder)?;
        Ok(self.hidden.join(CACHE_DIR).join(file))
    }

    fn manifest_path(&self) -> PathBuf {
        self.hidden.join(MANIFEST_FILE)
    }

    /// Scratch file used to present a conflict.
    pub fn conflict_path(&self, conflict: &Conflict) -> PathBuf {
        self.hidden
            .join(CONFLICTS_DIR)
            .join(conflict.conflict_file_name())
    }

    async fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        if !self.fs.exists(path).await {
            return Ok(None);
        }
        self.fs
            .read_to_string(path)
            .await
            .map(Some)
            .map_err(|e| KeystoneError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        self.fs
            .write_file(path, content)
            .await
            .map_err(|e| KeystoneError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        if !self.fs.exists(path).await {
            return Ok(());
        }
        self.fs
            .delete_file(path)
            .await
            .map_err(|e| KeystoneError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Load the manifest; a missing manifest is empty.
    pub async fn manifest(&self) -> Result<Manifest> {
        match self.read_optional(&self.manifest_path()).await? {
            Some(json) => Manifest::from_json(&json),
            None => Ok(Manifest::default()),
        }
    }

    pub async fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        self.write(&self.manifest_path(), &manifest.to_json()?).await
    }

    /// Content of a file in the working directory.
    pub async fn read_working(&self, file: &str) -> Result<Option<String>> {
        self.read_optional(&self.working_path(file)?).await
    }

    /// Content of a file as of the last sync.
    pub async fn read_cached(&self, file: &str) -> Result<Option<String>> {
        self.read_optional(&self.cache_path(file)?).await
    }

    /// Overwrite the working copy of `file` without touching the mirror.
    pub async fn write_working(&self, file: &str, content: &str) -> Result<()> {
        self.write(&self.working_path(file)?, content).await
    }

    /// Record `content` as the synchronized state of `file`, leaving the
    /// working copy alone.
    pub async fn record(&self, file: &str, content: &str, version: u64) -> Result<()> {
        self.write(&self.cache_path(file)?, content).await?;
        let mut manifest = self.manifest().await?;
        manifest.set_file(TrackedFile::new(file, content, version));
        manifest.mark_synced();
        self.save_manifest(&manifest).await
    }

    /// Write `content` into the working directory and record it as synchronized.
    pub async fn write_synced(&self, file: &str, content: &str, version: u64) -> Result<()> {
        self.write(&self.working_path(file)?, content).await?;
        self.record(file, content, version).await
    }

    /// Stop tracking `file`. The working copy is kept.
    pub async fn forget(&self, file: &str) -> Result<()> {
        self.remove(&self.cache_path(file)?).await?;
        let mut manifest = self.manifest().await?;
        if manifest.remove_file(file).is_some() {
            self.save_manifest(&manifest).await?;
        }
        Ok(())
    }

    /// Stop tracking `file` and delete its working copy.
    pub async fn drop_file(&self, file: &str) -> Result<()> {
        self.remove(&self.working_path(file)?).await?;
        self.forget(file).await
    }

    /// Status of every tracked file.
    pub async fn detect_local_changes(&self) -> Result<Vec<LocalChange>> {
        let manifest = self.manifest().await?;
        let mut changes = Vec::with_capacity(manifest.files.len());
        for (path, tracked) in &manifest.files {
            let status = match self.read_working(path).await? {
                None => ChangeStatus::Deleted,
                Some(content) if compute_content_hash(content.as_bytes()) != tracked.content_hash => {
                    ChangeStatus::Modified
                }
                Some(_) => ChangeStatus::Ok,
            };
            changes.push(LocalChange {
                path: path.clone(),
                status,
            });
        }
        Ok(changes)
    }

    /// Tracked files that are modified or deleted.
    pub async fn changed_files(&self) -> Result<Vec<LocalChange>> {
        let mut changes = self.detect_local_changes().await?;
        changes.retain(LocalChange::is_changed);
        Ok(changes)
    }

    /// Restore working files from the mirror, discarding local changes.
    ///
    /// With no `files`, every modified or deleted file is restored. Each file
    /// is written to a temporary sibling first and renamed into place.
    pub async fn reset(&self, files: &[&str], confirmed: bool) -> Result<Vec<String>> {
        if !confirmed {
            return Err(KeystoneError::ResetNotConfirmed);
        }

        let targets: Vec<String> = if files.is_empty() {
            self.changed_files()
                .await?
                .into_iter()
                .map(|change| change.path)
                .collect()
        } else {
            files.iter().map(|f| f.to_string()).collect()
        };

        for file in &targets {
            let cached = self
                .read_cached(file)
                .await?
                .ok_or_else(|| KeystoneError::NotTracked(file.clone()))?;
            let target = self.working_path(file)?;
            let temp = self.working_path(&format!("{file}{RESET_SUFFIX}"))?;
            self.write(&temp, &cached).await?;
            self.fs
                .rename(&temp, &target)
                .await
                .map_err(|e| KeystoneError::FileWrite {
                    path: target.clone(),
                    source: e,
                })?;
            log::debug!("Reset {:?}", target);
        }
        Ok(targets)
    }

    /// Unified diff from the mirror to the working copy of `file`.
    ///
    /// Empty when the file is unchanged.
    pub async fn diff(&self, file: &str) -> Result<String> {
        let cached = self
            .read_cached(file)
            .await?
            .ok_or_else(|| KeystoneError::NotTracked(file.to_string()))?;
        let working = self.read_working(file).await?.unwrap_or_default();
        if cached == working {
            return Ok(String::new());
        }
        Ok(TextDiff::from_lines(cached.as_str(), working.as_str())
            .unified_diff()
            .context_radius(3)
            .header(&format!("a/{file}"), &format!("b/{file}"))
            .to_string())
    }

    /// Write the marked document of `conflict` into the conflicts folder.
    pub async fn write_conflict(&self, conflict: &Conflict) -> Result<PathBuf> {
        let path = self.conflict_path(conflict);
        self.write(&path, &conflict.marked_document()).await?;
        Ok(path)
    }

    /// Remove the scratch file of `conflict`, if any.
    pub async fn clear_conflict(&self, conflict: &Conflict) -> Result<()> {
        self.remove(&self.conflict_path(conflict)).await
    }
}

/// Resolver writing each conflict as a marked scratch file in the conflicts
/// folder of a working directory, then deferring to `inner`.
///
/// The scratch file is removed once `inner` settles the conflict and kept
/// while it is skipped.
pub struct ScratchConflicts<FS: AsyncFileSystem> {
    fs: Arc<FS>,
    root: PathBuf,
    hidden_folder: String,
    inner: Arc<dyn ConflictResolver>,
}

impl<FS: AsyncFileSystem> ScratchConflicts<FS> {
    pub fn new(
        fs: Arc<FS>,
        root: impl Into<PathBuf>,
        hidden_folder: impl Into<String>,
        inner: Arc<dyn ConflictResolver>,
    ) -> Self {
        Self {
            fs,
            root: root.into(),
            hidden_folder: hidden_folder.into(),
            inner,
        }
    }

    fn mirror(&self) -> Mirror<'_, FS> {
        Mirror::new(self.fs.as_ref(), &self.root, &self.hidden_folder)
    }
}

impl<FS: AsyncFileSystem> ConflictResolver for ScratchConflicts<FS> {
    fn resolve<'a>(&'a self, conflict: &'a Conflict) -> BoxFuture<'a, Result<ConflictResolution>> {
        Box::pin(async move {
            let mirror = self.mirror();
            let scratch = mirror.write_conflict(conflict).await?;
            log::info!("Conflict on {} written to {:?}", conflict.path, scratch);

            let resolution = self.inner.resolve(conflict).await?;
            if resolution != ConflictResolution::Skip {
                mirror.clear_conflict(conflict).await?;
            }
            Ok(resolution)
        })
    }
}
