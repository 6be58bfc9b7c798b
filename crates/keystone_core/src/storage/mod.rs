//! Seams towards the storage backend and the identity service.
//!
//! Every member owns a hub and may only write into it. Copies meant for other
//! members are written into the caller's own hub, encrypted for the
//! recipient's public key, and read by the recipient from the caller's hub.
//!
//! ## Object safety
//!
//! Both traits return boxed futures so they can be used as `dyn Hub` and
//! `dyn IdentityResolver` behind an `Arc`.

mod cache;
mod memory;

pub use cache::DescriptorCache;
pub use memory::{MemoryHub, MemoryNetwork, StaticIdentityResolver};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use crate::fs::BoxFuture;

/// A member's public encryption key, as published by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(pub String);

impl PublicKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PublicKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Hub of '{identity}' is unreachable: {message}")]
    Unreachable { identity: String, message: String },

    #[error("Cannot decrypt '{path}': {message}")]
    Decrypt { path: String, message: String },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Transient failures worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unreachable { .. } | StorageError::Io(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Blob storage owned by the calling member.
pub trait Hub: Send + Sync {
    /// Identity of the hub owner.
    fn identity(&self) -> &str;

    /// Public key of the hub owner.
    fn public_key(&self) -> &PublicKey;

    /// Write into the own hub, encrypted for `encrypt_for` when given.
    fn put<'a>(
        &'a self,
        path: &'a str,
        bytes: &'a [u8],
        encrypt_for: Option<&'a PublicKey>,
    ) -> BoxFuture<'a, StorageResult<()>>;

    /// Read from the own hub.
    fn get<'a>(
        &'a self,
        path: &'a str,
        decrypt: bool,
    ) -> BoxFuture<'a, StorageResult<Option<Vec<u8>>>>;

    /// Read from the hub at `location`, usually another member's.
    fn get_from<'a>(
        &'a self,
        location: &'a Url,
        path: &'a str,
        decrypt: bool,
    ) -> BoxFuture<'a, StorageResult<Option<Vec<u8>>>>;

    /// Delete from the own hub. Deleting an absent path succeeds.
    fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, StorageResult<()>>;

    /// Every path stored in the own hub.
    fn list<'a>(&'a self) -> BoxFuture<'a, StorageResult<Vec<String>>>;
}

/// Naming service mapping identities to hubs and keys.
pub trait IdentityResolver: Send + Sync {
    fn resolve_storage_location<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, StorageResult<Url>>;

    fn resolve_public_key<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, StorageResult<Option<PublicKey>>>;
}
