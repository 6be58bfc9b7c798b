use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::mirror::LocalChange;
use crate::storage::StorageError;

/// Unified error type for keystone operations
#[derive(Debug, Error)]
pub enum KeystoneError {
    // Call errors
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    // Authorization errors
    #[error("You need to be an admin to perform this operation")]
    NeedToBeAdmin,

    #[error("You need to be an admin or a contributor to perform this operation")]
    NeedToBeAdminOrContributor,

    // Reconciliation errors
    #[error("A newer version of '{path}' exists with another content. Please pull before pushing.")]
    PullBeforeYouPush { path: String },

    #[error("{} tracked file(s) have uncommitted changes. Push them or pull with force.", .0.len())]
    PullWhileFilesModified(Vec<LocalChange>),

    #[error("No stable version could be found for '{path}'")]
    NoStableVersion { path: String },

    #[error("A version of '{path}' with the same content already exists")]
    NoChange { path: String },

    #[error("Conflict on '{path}' was left unresolved")]
    UnresolvedConflict { path: String },

    #[error("No member could be reached while publishing '{path}'")]
    NoMemberReachable { path: String },

    #[error("No descriptor found for '{path}'")]
    DescriptorNotFound { path: String },

    #[error("History of '{path}' is corrupt: {reason}")]
    CorruptHistory { path: String, reason: String },

    #[error("Public key not found for '{0}'")]
    PublicKeyNotFound(String),

    // Membership errors
    #[error("'{identity}' is already a member")]
    AlreadyInProject { identity: String },

    // Project errors
    #[error("Invalid project name '{0}'. Expected '<name>/<uuid>'")]
    InvalidProjectName(String),

    #[error("One or more projects are already named '{0}'")]
    ProjectNameExists(String),

    #[error("Environment '{env}' is not defined in project '{project}'")]
    UnknownEnvironment { project: String, env: String },

    #[error("Environment '{env}' already exists in project '{project}'")]
    EnvironmentExists { project: String, env: String },

    #[error("Cannot fetch '{project}' from the hub of '{origin}'")]
    FailedToFetch { project: String, origin: String },

    #[error("No file to delete")]
    NoFileToDelete,

    // Local state errors
    #[error("Config file already exists at '{0}'")]
    ConfigFileExists(PathBuf),

    #[error("No keystone project configured in '{0}'. Run init first.")]
    ConfigNotInitialized(PathBuf),

    #[error("'{0}' is not tracked")]
    NotTracked(String),

    #[error("'{0}' is not a valid file name. Use a relative path inside the working directory")]
    InvalidFileName(String),

    #[error("Resetting discards uncommitted changes and must be confirmed")]
    ResetNotConfirmed,

    // Storage errors are transient and kept as-is
    #[error(transparent)]
    Storage(#[from] StorageError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

/// Result type alias for keystone operations
pub type Result<T> = std::result::Result<T, KeystoneError>;

impl KeystoneError {
    /// Whether retrying the same call may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            KeystoneError::Storage(err) => err.is_retryable(),
            KeystoneError::NoMemberReachable { .. } => true,
            _ => false,
        }
    }

    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}

/// A serializable representation of KeystoneError for IPC
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&KeystoneError> for SerializableError {
    fn from(err: &KeystoneError) -> Self {
        let kind = match err {
            KeystoneError::MissingParameter(_) => "MissingParameter",
            KeystoneError::NeedToBeAdmin => "NeedToBeAdmin",
            KeystoneError::NeedToBeAdminOrContributor => "NeedToBeAdminOrContributor",
            KeystoneError::PullBeforeYouPush { .. } => "PullBeforeYouPush",
            KeystoneError::PullWhileFilesModified(_) => "PullWhileFilesModified",
            KeystoneError::NoStableVersion { .. } => "NoStableVersion",
            KeystoneError::NoChange { .. } => "NoChange",
            KeystoneError::UnresolvedConflict { .. } => "UnresolvedConflict",
            KeystoneError::NoMemberReachable { .. } => "NoMemberReachable",
            KeystoneError::DescriptorNotFound { .. } => "DescriptorNotFound",
            KeystoneError::CorruptHistory { .. } => "CorruptHistory",
            KeystoneError::PublicKeyNotFound(_) => "PublicKeyNotFound",
            KeystoneError::AlreadyInProject { .. } => "AlreadyInProject",
            KeystoneError::InvalidProjectName(_) => "InvalidProjectName",
            KeystoneError::ProjectNameExists(_) => "ProjectNameExists",
            KeystoneError::UnknownEnvironment { .. } => "UnknownEnvironment",
            KeystoneError::EnvironmentExists { .. } => "EnvironmentExists",
            KeystoneError::FailedToFetch { .. } => "FailedToFetch",
            KeystoneError::NoFileToDelete => "NoFileToDelete",
            KeystoneError::ConfigFileExists(_) => "ConfigFileExists",
            KeystoneError::ConfigNotInitialized(_) => "ConfigNotInitialized",
            KeystoneError::NotTracked(_) => "NotTracked",
            KeystoneError::InvalidFileName(_) => "InvalidFileName",
            KeystoneError::ResetNotConfirmed => "ResetNotConfirmed",
            KeystoneError::Storage(_) => "Storage",
            KeystoneError::Io(_) => "Io",
            KeystoneError::FileRead { .. } => "FileRead",
            KeystoneError::FileWrite { .. } => "FileWrite",
            KeystoneError::Json(_) => "Json",
            KeystoneError::ConfigParse(_) => "ConfigParse",
            KeystoneError::ConfigSerialize(_) => "ConfigSerialize",
        }
        .to_string();

        let path = match err {
            KeystoneError::FileRead { path, .. } => Some(path.clone()),
            KeystoneError::FileWrite { path, .. } => Some(path.clone()),
            KeystoneError::ConfigFileExists(path) => Some(path.clone()),
            KeystoneError::ConfigNotInitialized(path) => Some(path.clone()),
            KeystoneError::PullBeforeYouPush { path }
            | KeystoneError::NoStableVersion { path }
            | KeystoneError::NoChange { path }
            | KeystoneError::UnresolvedConflict { path }
            | KeystoneError::NoMemberReachable { path }
            | KeystoneError::DescriptorNotFound { path }
            | KeystoneError::CorruptHistory { path, .. } => Some(PathBuf::from(path)),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<KeystoneError> for SerializableError {
    fn from(err: KeystoneError) -> Self {
        SerializableError::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializable_error_carries_kind_and_path() {
        let err = KeystoneError::PullBeforeYouPush {
            path: "app/uuid/default/.env/alice.json".to_string(),
        };
        let serializable = err.to_serializable();
        assert_eq!(serializable.kind, "PullBeforeYouPush");
        assert_eq!(
            serializable.path,
            Some(PathBuf::from("app/uuid/default/.env/alice.json"))
        );
        assert!(serializable.message.contains("pull before pushing"));
    }

    #[test]
    fn only_storage_failures_are_retryable() {
        assert!(!KeystoneError::NeedToBeAdmin.is_retryable());
        let err = KeystoneError::from(StorageError::Unreachable {
            identity: "bob".to_string(),
            message: "timeout".to_string(),
        });
        assert!(err.is_retryable());
    }
}
