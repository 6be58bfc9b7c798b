//! Configuration types for keystone.
//!
//! Two layers of configuration exist:
//!
//! - [`ProjectConfig`]: the `.ksconfig` file at the root of a working
//!   directory, recording which project and environment it is checked out on.
//! - [`EngineConfig`]: tuning of the reconciliation engine, supplied by the
//!   embedding application.
//!
//! Both are persisted as TOML.
//!
//! # Example
//!
//! ```ignore
//! use keystone_core::config::{EngineConfig, ProjectConfig};
//!
//! let engine = EngineConfig::default().with_concurrency(4);
//! let config = ProjectConfig::load_from(&fs, Path::new("/work/app")).await?;
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KeystoneError, Result};
use crate::fs::AsyncFileSystem;

/// Name of the per-directory project config file
pub const CONFIG_FILE_NAME: &str = ".ksconfig";

/// Default name of the hidden folder holding the local mirror
pub const DEFAULT_HIDDEN_FOLDER: &str = ".keystone";

/// Environment every new project starts with
pub const DEFAULT_ENV: &str = "default";

/// The project and environment a working directory is checked out on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Full project name, `<name>/<uuid>`
    pub project: String,
    /// Current environment
    pub env: String,
}

impl ProjectConfig {
    pub fn new(project: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            env: env.into(),
        }
    }

    /// Location of the config file inside `dir`.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE_NAME)
    }

    /// Whether `dir` already holds a config file.
    pub async fn exists_in<FS: AsyncFileSystem + ?Sized>(fs: &FS, dir: &Path) -> bool {
        fs.exists(&Self::path_in(dir)).await
    }

    /// Load the config of `dir`.
    pub async fn load_from<FS: AsyncFileSystem + ?Sized>(fs: &FS, dir: &Path) -> Result<Self> {
        let path = Self::path_in(dir);
        if !fs.exists(&path).await {
            return Err(KeystoneError::ConfigNotInitialized(dir.to_path_buf()));
        }
        let contents = fs
            .read_to_string(&path)
            .await
            .map_err(|e| KeystoneError::FileRead {
                path: path.clone(),
                source: e,
            })?;

        let config: ProjectConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save the config into `dir`.
    pub async fn save_to<FS: AsyncFileSystem + ?Sized>(&self, fs: &FS, dir: &Path) -> Result<()> {
        let path = Self::path_in(dir);
        let contents = toml::to_string_pretty(self)?;
        fs.write_file(&path, &contents)
            .await
            .map_err(|e| KeystoneError::FileWrite { path, source: e })?;
        Ok(())
    }
}

/// Tuning of the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of member hubs contacted at once during fan-in and fan-out
    pub concurrency: usize,

    /// Name of the hidden folder holding the local mirror
    pub hidden_folder: String,

    /// Environment created with every new project
    pub default_env: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            hidden_folder: DEFAULT_HIDDEN_FOLDER.to_string(),
            default_env: DEFAULT_ENV.to_string(),
        }
    }
}

impl EngineConfig {
    /// Set the fan-in/fan-out concurrency. Zero is raised to one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Number of member hubs contacted at once, never zero.
    pub fn fan_width(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn with_hidden_folder(mut self, folder: impl Into<String>) -> Self {
        self.hidden_folder = folder.into();
        self
    }

    pub fn with_default_env(mut self, env: impl Into<String>) -> Self {
        self.default_env = env.into();
        self
    }

    /// Parse from TOML; missing keys take their default value.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        let concurrency = config.concurrency;
        Ok(config.with_concurrency(concurrency))
    }

    /// Load from a TOML file, falling back to the defaults when it is absent.
    pub async fn load_from_or_default<FS: AsyncFileSystem + ?Sized>(
        fs: &FS,
        path: &Path,
    ) -> Result<Self> {
        if !fs.exists(path).await {
            log::debug!("No engine config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let contents = fs
            .read_to_string(path)
            .await
            .map_err(|e| KeystoneError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{InMemoryFileSystem, SyncToAsyncFs};

    #[tokio::test]
    async fn test_project_config_round_trip() {
        let fs = SyncToAsyncFs::new(InMemoryFileSystem::new());
        let dir = Path::new("/work/app");

        assert!(matches!(
            ProjectConfig::load_from(&fs, dir).await,
            Err(KeystoneError::ConfigNotInitialized(_))
        ));

        let config = ProjectConfig::new("app/5f0c3a1e-0000-4000-8000-000000000000", "default");
        config.save_to(&fs, dir).await.unwrap();
        assert!(ProjectConfig::exists_in(&fs, dir).await);

        let raw = fs.read_to_string(&dir.join(".ksconfig")).await.unwrap();
        assert!(raw.contains("env = \"default\""));
        assert_eq!(ProjectConfig::load_from(&fs, dir).await.unwrap(), config);
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::from_toml_str("concurrency = 0\n").unwrap();
        assert_eq!(config.concurrency, 1);

        let config = EngineConfig {
            concurrency: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.fan_width(), 1);
        assert_eq!(EngineConfig::default().fan_width(), 8);
        assert_eq!(config.hidden_folder, ".keystone");
        assert_eq!(config.default_env, "default");

        let config = EngineConfig::default()
            .with_hidden_folder(".ks")
            .with_default_env("dev");
        assert_eq!(config.hidden_folder, ".ks");
        assert_eq!(config.default_env, "dev");
    }

    #[tokio::test]
    async fn test_engine_config_missing_file() {
        let fs = SyncToAsyncFs::new(InMemoryFileSystem::new());
        let config = EngineConfig::load_from_or_default(&fs, Path::new("/etc/keystone.toml"))
            .await
            .unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
