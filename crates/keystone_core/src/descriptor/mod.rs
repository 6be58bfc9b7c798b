//! Versioned, checksummed document envelopes.
//!
//! A [`Descriptor`] is the unit of synchronization. Every member holding
//! access has their own encrypted copy; copies agree when they carry the same
//! version and checksum. Each accepted write bumps the version by one and
//! appends a reverse [`Patch`] to the history, so every earlier content can be
//! replayed from the latest one.
//!
//! # Invariants
//!
//! - `checksum == checksum(content)`
//! - versions along a lineage are contiguous and start at 1
//! - `history.len() == version - 1`

mod content;
pub mod patch;

pub use content::{EnvContent, FileEntry, ProjectContent};
pub use patch::{Patch, PatchOp, PatchTarget};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{KeystoneError, Result};
use crate::path::{self, DescriptorType, PathRequest};

/// SHA-256 of raw bytes, hex encoded.
pub fn compute_content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Checksum of a descriptor content.
///
/// Objects serialize with sorted keys, so equal values hash equally.
pub fn checksum(content: &Value) -> String {
    compute_content_hash(content.to_string().as_bytes())
}

/// One step back in a descriptor's lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Version this entry reconstructs
    pub version: u64,
    /// Checksum of the reconstructed content
    pub checksum: String,
    /// Reverse patch from the next version's content to this version's
    #[serde(rename = "content")]
    pub patch: Patch,
    /// Checksum of the content the patch applies to
    #[serde(rename = "sourcePatch")]
    pub source_checksum: String,
    /// Author of the reconstructed version
    pub author: String,
}

/// A versioned document envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: DescriptorType,
    pub name: String,
    pub content: Value,
    pub checksum: String,
    pub version: u64,
    pub author: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Descriptor {
    /// Create a descriptor at version 0 with an empty history.
    pub fn create(
        name: impl Into<String>,
        location: PathRequest<'_>,
        content: Value,
        author: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            path: path::resolve(location)?,
            kind: location.kind,
            name: name.into(),
            checksum: checksum(&content),
            content,
            version: 0,
            author: author.into(),
            history: Vec::new(),
        })
    }

    /// The same descriptor addressed to another member.
    pub fn for_owner(&self, owner: &str) -> Self {
        Self {
            path: path::with_owner(&self.path, owner),
            ..self.clone()
        }
    }

    /// Deserialize the content into a typed view.
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.content.clone())?)
    }

    pub fn env_content(&self) -> Result<EnvContent> {
        self.content_as()
    }

    pub fn project_content(&self) -> Result<ProjectContent> {
        self.content_as()
    }

    /// Raw text of a file descriptor.
    pub fn text(&self) -> Option<&str> {
        self.content.as_str()
    }

    /// Whether both copies carry the same version and content.
    pub fn same_version_as(&self, other: &Descriptor) -> bool {
        self.version == other.version && self.checksum == other.checksum
    }

    /// Checksum recorded for `version` in this lineage, if known.
    pub fn checksum_at(&self, version: u64) -> Option<&str> {
        if version == self.version {
            return Some(&self.checksum);
        }
        self.history
            .iter()
            .find(|entry| entry.version == version)
            .map(|entry| entry.checksum.as_str())
    }

    /// Replay the history backward to reconstruct the content of `version`.
    pub fn content_at(&self, version: u64) -> Result<Value> {
        if version == self.version {
            return Ok(self.content.clone());
        }
        if version == 0 || version > self.version {
            return Err(self.corrupt(format!(
                "version {version} is outside of 1..={}",
                self.version
            )));
        }

        let mut current = self.content.clone();
        let mut current_checksum = self.checksum.clone();
        for entry in self.history.iter().rev() {
            if entry.source_checksum != current_checksum {
                return Err(self.corrupt(format!(
                    "entry for version {} does not apply on top of {current_checksum}",
                    entry.version
                )));
            }
            current = entry
                .patch
                .apply(&current)
                .map_err(|reason| self.corrupt(reason))?;
            current_checksum = checksum(&current);
            if current_checksum != entry.checksum {
                return Err(self.corrupt(format!(
                    "replayed content of version {} does not match its checksum",
                    entry.version
                )));
            }
            if entry.version == version {
                return Ok(current);
            }
        }

        Err(self.corrupt(format!("version {version} is missing from the history")))
    }

    /// Check the checksum and history invariants.
    pub fn verify(&self) -> Result<()> {
        if checksum(&self.content) != self.checksum {
            return Err(self.corrupt("checksum does not match the content".to_string()));
        }
        let expected = self.version.saturating_sub(1) as usize;
        if self.history.len() != expected {
            return Err(self.corrupt(format!(
                "version {} carries {} history entries",
                self.version,
                self.history.len()
            )));
        }
        for (index, entry) in self.history.iter().enumerate() {
            if entry.version != index as u64 + 1 {
                return Err(self.corrupt(format!(
                    "history entry {index} is for version {}",
                    entry.version
                )));
            }
        }
        Ok(())
    }

    fn corrupt(&self, reason: String) -> KeystoneError {
        KeystoneError::CorruptHistory {
            path: self.path.clone(),
            reason,
        }
    }
}

/// Produce the next version of `descriptor` carrying `new_content`.
///
/// Without a previous descriptor the result is version 1 with an empty
/// history. With one, the previous content is recorded as a reverse patch and
/// the version advances by one. Writing the previous content again fails with
/// [`KeystoneError::NoChange`], except for project and env descriptors, for
/// which the previous descriptor is returned unchanged.
pub fn increment_version(
    descriptor: &Descriptor,
    new_content: Value,
    previous: Option<&Descriptor>,
    author: &str,
) -> Result<Descriptor> {
    let new_checksum = checksum(&new_content);

    let Some(previous) = previous else {
        return Ok(Descriptor {
            content: new_content,
            checksum: new_checksum,
            version: 1,
            history: Vec::new(),
            author: author.to_string(),
            ..descriptor.clone()
        });
    };

    if new_checksum == previous.checksum {
        if previous.kind.tolerates_noop_write() {
            return Ok(previous.clone());
        }
        return Err(KeystoneError::NoChange {
            path: previous.path.clone(),
        });
    }

    let mut history = previous.history.clone();
    history.push(HistoryEntry {
        version: previous.version,
        checksum: previous.checksum.clone(),
        patch: Patch::create(&new_content, &previous.content),
        source_checksum: new_checksum.clone(),
        author: previous.author.clone(),
    });

    Ok(Descriptor {
        path: descriptor.path.clone(),
        kind: previous.kind,
        name: previous.name.clone(),
        content: new_content,
        checksum: new_checksum,
        version: previous.version + 1,
        author: author.to_string(),
        history,
    })
}
