//! Conflicts the engine cannot merge on its own.
//!
//! When copies of a descriptor disagree at the same version and neither a
//! structural merge nor a three-way line merge settles them, a [`Conflict`]
//! is handed to the injected [`ConflictResolver`]. The engine waits for its
//! decision before going on.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::patch::render;
use crate::error::{KeystoneError, Result};
use crate::fs::BoxFuture;
use crate::merge::merge_lines_marked;
use crate::path::DescriptorType;

/// One of the disagreeing copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictCandidate {
    /// Member whose hub holds this copy
    pub owner: String,
    pub author: String,
    pub version: u64,
    pub checksum: String,
    pub content: Value,
}

/// Information about an unmergeable conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Path of the caller's own copy
    pub path: String,
    pub kind: DescriptorType,
    /// Identity of the member reconciling
    pub local_identity: String,
    /// Copies in conflict, highest version first
    pub candidates: Vec<ConflictCandidate>,
    /// Content of the most recent common ancestor, when known
    pub base: Option<Value>,
}

impl Conflict {
    /// Whether the candidates really carry different contents.
    pub fn is_content_different(&self) -> bool {
        self.candidates
            .iter()
            .any(|c| c.checksum != self.candidates[0].checksum)
    }

    /// The copy held in the caller's own hub.
    pub fn local(&self) -> Option<&ConflictCandidate> {
        self.candidates
            .iter()
            .find(|c| c.owner == self.local_identity)
    }

    /// The preferred copy of another member: highest version, then owner order.
    pub fn remote(&self) -> Option<&ConflictCandidate> {
        let local_checksum = self.local().map(|c| c.checksum.as_str());
        self.candidates
            .iter()
            .filter(|c| c.owner != self.local_identity)
            .filter(|c| Some(c.checksum.as_str()) != local_checksum)
            .max_by(|a, b| a.version.cmp(&b.version).then(b.owner.cmp(&a.owner)))
    }

    /// Scratch file name for this path.
    ///
    /// For example: `app/1/default/.env/alice.json` -> `.env.conflict`
    pub fn conflict_file_name(&self) -> String {
        let mut segments = self.path.rsplit('/');
        let _owner = segments.next();
        let name = segments.next().unwrap_or(self.path.as_str());
        match name.rfind('.') {
            Some(dot_pos) if dot_pos > 0 => {
                format!("{}.conflict{}", &name[..dot_pos], &name[dot_pos..])
            }
            _ => format!("{name}.conflict"),
        }
    }

    /// Text shown to a human: the local and remote copies between conflict
    /// markers, merged where they agree.
    pub fn marked_document(&self) -> String {
        let render_text = |value: &Value| render(value).0;
        let local = self.local();
        let local_version = local.map(|c| c.version).unwrap_or(0);
        let local = local.map(|c| render_text(&c.content)).unwrap_or_default();
        let Some(remote) = self.remote() else {
            return local;
        };
        let remote_text = render_text(&remote.content);
        let base = self.base.as_ref().map(render_text).unwrap_or_default();
        let local_label = format!("{} (v{local_version})", self.local_identity);
        let remote_label = format!("{} (v{})", remote.owner, remote.version);
        merge_lines_marked(&base, &local, &remote_text, &local_label, &remote_label).text
    }

    /// Highest version among the candidates.
    pub fn version(&self) -> u64 {
        self.candidates.iter().map(|c| c.version).max().unwrap_or(0)
    }

    /// Content selected by `resolution`.
    pub fn resolved_content(&self, resolution: &ConflictResolution) -> Result<Value> {
        let unresolved = || KeystoneError::UnresolvedConflict {
            path: self.path.clone(),
        };
        match resolution {
            ConflictResolution::KeepLocal => {
                self.local().map(|c| c.content.clone()).ok_or_else(unresolved)
            }
            ConflictResolution::KeepRemote => {
                self.remote().map(|c| c.content.clone()).ok_or_else(unresolved)
            }
            ConflictResolution::Merge { content } => Ok(content.clone()),
            ConflictResolution::Skip => Err(unresolved()),
        }
    }
}

/// How to resolve a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConflictResolution {
    /// Keep the copy from the own hub
    KeepLocal,

    /// Keep the preferred copy of another member
    KeepRemote,

    /// Use a hand-merged content
    Merge {
        /// The merged content
        content: Value,
    },

    /// Leave the conflict in place; it will resurface on next reconcile
    Skip,
}

impl FromStr for ConflictResolution {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "keep_local" | "keep-local" => Ok(ConflictResolution::KeepLocal),
            "remote" | "keep_remote" | "keep-remote" => Ok(ConflictResolution::KeepRemote),
            "skip" => Ok(ConflictResolution::Skip),
            _ => Err(()),
        }
    }
}

impl ConflictResolution {
    pub fn keeps_local(&self) -> bool {
        matches!(
            self,
            ConflictResolution::KeepLocal | ConflictResolution::Merge { .. }
        )
    }

    pub fn keeps_remote(&self) -> bool {
        matches!(self, ConflictResolution::KeepRemote)
    }
}

/// Strategy deciding unmergeable conflicts.
///
/// Typically backed by an editor session; the engine awaits the returned
/// future before proceeding with the path.
pub trait ConflictResolver: Send + Sync {
    fn resolve<'a>(&'a self, conflict: &'a Conflict) -> BoxFuture<'a, Result<ConflictResolution>>;
}

/// Resolver leaving every conflict unresolved.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipConflicts;

impl ConflictResolver for SkipConflicts {
    fn resolve<'a>(&'a self, conflict: &'a Conflict) -> BoxFuture<'a, Result<ConflictResolution>> {
        Box::pin(async move {
            log::warn!("Leaving conflict on {} unresolved", conflict.path);
            Ok(ConflictResolution::Skip)
        })
    }
}

/// Resolver backed by a closure.
pub struct ResolveWith<F>(pub F);

impl<F> ConflictResolver for ResolveWith<F>
where
    F: Fn(&Conflict) -> ConflictResolution + Send + Sync,
{
    fn resolve<'a>(&'a self, conflict: &'a Conflict) -> BoxFuture<'a, Result<ConflictResolution>> {
        let resolution = (self.0)(conflict);
        Box::pin(async move { Ok(resolution) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(owner: &str, version: u64, content: &str) -> ConflictCandidate {
        let content = json!(content);
        ConflictCandidate {
            owner: owner.to_string(),
            author: owner.to_string(),
            version,
            checksum: crate::descriptor::checksum(&content),
            content,
        }
    }

    fn sample() -> Conflict {
        Conflict {
            path: "app/1/default/.env/alice.json".to_string(),
            kind: DescriptorType::File,
            local_identity: "alice".to_string(),
            candidates: vec![
                candidate("alice", 2, "A=1\nB=3\n"),
                candidate("bob", 2, "A=1\nB=4\n"),
            ],
            base: Some(json!("A=1\nB=2\n")),
        }
    }

    #[test]
    fn test_local_and_remote_candidates() {
        let conflict = sample();
        assert!(conflict.is_content_different());
        assert_eq!(conflict.local().unwrap().owner, "alice");
        assert_eq!(conflict.remote().unwrap().owner, "bob");
        assert_eq!(conflict.version(), 2);
    }

    #[test]
    fn test_conflict_file_name() {
        let mut conflict = sample();
        assert_eq!(conflict.conflict_file_name(), ".env.conflict");
        conflict.path = "app/1/default/config.yml/alice.json".to_string();
        assert_eq!(conflict.conflict_file_name(), "config.conflict.yml");
    }

    #[test]
    fn test_marked_document() {
        let document = sample().marked_document();
        assert_eq!(
            document,
            "A=1\n<<<<<<< alice (v2)\nB=3\n=======\nB=4\n>>>>>>> bob (v2)\n"
        );
    }

    #[test]
    fn test_resolved_content() {
        let conflict = sample();
        assert_eq!(
            conflict
                .resolved_content(&ConflictResolution::KeepRemote)
                .unwrap(),
            json!("A=1\nB=4\n")
        );
        assert_eq!(
            conflict
                .resolved_content(&ConflictResolution::KeepLocal)
                .unwrap(),
            json!("A=1\nB=3\n")
        );
        assert!(matches!(
            conflict.resolved_content(&ConflictResolution::Skip),
            Err(KeystoneError::UnresolvedConflict { .. })
        ));
    }

    #[test]
    fn test_conflict_resolution_from_str() {
        assert_eq!(
            ConflictResolution::from_str("keep-remote"),
            Ok(ConflictResolution::KeepRemote)
        );
        assert_eq!(
            ConflictResolution::from_str("LOCAL"),
            Ok(ConflictResolution::KeepLocal)
        );
        assert!(ConflictResolution::from_str("both").is_err());
        assert!(ConflictResolution::KeepLocal.keeps_local());
        assert!(ConflictResolution::KeepRemote.keeps_remote());
    }

    #[tokio::test]
    async fn test_closure_resolver() {
        let resolver = ResolveWith(|c: &Conflict| ConflictResolution::Merge {
            content: json!(format!("merged {}", c.candidates.len())),
        });
        let resolution = resolver.resolve(&sample()).await.unwrap();
        assert_eq!(
            resolution,
            ConflictResolution::Merge {
                content: json!("merged 2")
            }
        );
        assert_eq!(
            SkipConflicts.resolve(&sample()).await.unwrap(),
            ConflictResolution::Skip
        );
    }
}
