//! Multi-writer reconciliation of descriptor copies.
//!
//! Every member keeps, in their own hub, one encrypted copy of each descriptor
//! per member allowed to read it. Reconciling a path gathers the copies meant
//! for the caller from every readable member, settles on the latest content
//! (merging or asking the [`ConflictResolver`] when copies diverge), applies
//! the caller's pending write if any, and publishes the result back to every
//! writable member.
//!
//! There is no lock across clients. Two members advancing the same version
//! concurrently is caught when the loser reconciles: either the version it
//! would write already exists with another content
//! ([`KeystoneError::PullBeforeYouPush`]), or the divergence surfaces as a
//! same-version conflict on the next read.

mod classify;
pub mod fan;
pub mod locks;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

pub use classify::Latest;
pub use fan::{FetchedCopy, MemberPublish, PublishReport};
pub use locks::{PathGuard, PathLocks};

use crate::conflict::{Conflict, ConflictCandidate, ConflictResolver};
use crate::descriptor::{Descriptor, checksum, increment_version};
use crate::error::{KeystoneError, Result};
use crate::members::{Member, Members};
use crate::merge::keyed_three_way;
use crate::path::{self, DescriptorType, PathRequest};
use crate::session::Session;

/// The descriptor being reconciled, addressed to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Path of the caller's own copy
    pub path: String,
    pub kind: DescriptorType,
    /// Name given to the descriptor when it is first created
    pub name: String,
}

impl Target {
    pub fn new(name: impl Into<String>, location: PathRequest<'_>) -> Result<Self> {
        Ok(Self {
            path: path::resolve(location)?,
            kind: location.kind,
            name: name.into(),
        })
    }

    fn blank(&self, content: Value, author: &str) -> Descriptor {
        Descriptor {
            path: self.path.clone(),
            kind: self.kind,
            name: self.name.clone(),
            checksum: checksum(&content),
            content,
            version: 0,
            author: author.to_string(),
            history: Vec::new(),
        }
    }

    fn pull_before_push(&self) -> KeystoneError {
        KeystoneError::PullBeforeYouPush {
            path: self.path.clone(),
        }
    }
}

/// One reconciliation to perform.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub target: Target,
    /// Members whose copies are read
    pub readable: Vec<Member>,
    /// Members receiving a copy of the result
    pub writable: Vec<Member>,
    /// Content the caller wants to write, if any
    pub pending: Option<Value>,
    /// Publish the latest version again even when nothing changed
    pub force_publish: bool,
}

impl ReconcileRequest {
    /// Fetch the latest version of `target`.
    pub fn read(target: Target, members: &Members) -> Self {
        Self {
            readable: members.readable(target.kind),
            writable: members.writable(),
            target,
            pending: None,
            force_publish: false,
        }
    }

    /// Write `content` as the next version of `target`.
    pub fn write(target: Target, members: &Members, content: Value) -> Self {
        Self {
            pending: Some(content),
            ..Self::read(target, members)
        }
    }

    /// Republish even when every copy is up to date.
    pub fn force_publish(mut self) -> Self {
        self.force_publish = true;
        self
    }
}

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileAction {
    /// No copy existed; version 1 was written
    Created,
    /// The pending content was written on top of the own copy
    Advanced,
    /// Diverging contents were merged into a new version
    Merged,
    /// The pending content equals the own copy
    Unchanged,
    /// An existing version was published again
    Republished,
    /// Every copy already agreed
    UpToDate,
}

/// Result of [`Reconciler::reconcile`].
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Settled descriptor, addressed to the caller
    pub descriptor: Descriptor,
    pub action: ReconcileAction,
    /// Fan-out results, when something was published
    pub publish: Option<PublishReport>,
}

impl ReconcileOutcome {
    fn new(descriptor: Descriptor, action: ReconcileAction, publish: Option<PublishReport>) -> Self {
        Self {
            descriptor,
            action,
            publish,
        }
    }

    pub fn published(&self) -> bool {
        self.publish.is_some()
    }

    /// Whether the settled content differs from the caller's previous copy.
    pub fn changed(&self) -> bool {
        !matches!(
            self.action,
            ReconcileAction::Unchanged | ReconcileAction::UpToDate
        )
    }
}

/// Latest content settled from a set of copies.
struct Settled {
    descriptor: Descriptor,
    merged: bool,
}

/// The reconciliation engine of one member.
pub struct Reconciler {
    session: Arc<Session>,
    resolver: Arc<dyn ConflictResolver>,
    locks: PathLocks,
}

impl Reconciler {
    pub fn new(session: Arc<Session>, resolver: Arc<dyn ConflictResolver>) -> Self {
        Self {
            session,
            resolver,
            locks: PathLocks::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Reconcile one descriptor path.
    ///
    /// Calls for the same path are serialized within this process.
    pub async fn reconcile(&self, request: ReconcileRequest) -> Result<ReconcileOutcome> {
        let _guard = self.locks.lock(&request.target.path).await;
        let previous = self.session.read_own(&request.target.path).await?;
        let remote = fan::fan_in(&self.session, &request.target.path, &request.readable).await?;

        log::debug!(
            "Reconciling {} (own v{}, remote copies: {})",
            request.target.path,
            previous.as_ref().map(|d| d.version).unwrap_or(0),
            remote.len()
        );

        match request.pending.clone() {
            Some(content) => self.write(&request, previous, remote, content).await,
            None => self.read(&request, previous, remote).await,
        }
    }

    /// Delete every copy of `path` held in the own hub.
    pub async fn unpublish(&self, path: &str, members: &[Member]) -> PublishReport {
        let _guard = self.locks.lock(path).await;
        fan::unpublish(&self.session, path, members).await
    }

    async fn write(
        &self,
        request: &ReconcileRequest,
        previous: Option<Descriptor>,
        remote: Vec<FetchedCopy>,
        content: Value,
    ) -> Result<ReconcileOutcome> {
        let target = &request.target;
        let me = self.session.identity();

        let Some(previous) = previous else {
            if !remote.is_empty() {
                return Err(target.pull_before_push());
            }
            let created = increment_version(&target.blank(content.clone(), me), content, None, me)?;
            let report = self.publish(target, &created, &request.writable).await?;
            log::info!("Created {} v1", target.path);
            return Ok(ReconcileOutcome::new(
                created,
                ReconcileAction::Created,
                Some(report),
            ));
        };

        if checksum(&content) == previous.checksum {
            return Ok(ReconcileOutcome::new(
                previous,
                ReconcileAction::Unchanged,
                None,
            ));
        }

        let mut copies = remote;
        copies.push(FetchedCopy {
            owner: me.to_string(),
            descriptor: previous.clone(),
        });
        let latest = match classify::classify(&copies, me) {
            Some(Latest::Agreed(copy)) => copy.descriptor,
            _ => return Err(target.pull_before_push()),
        };

        let (next, action) = if latest.version > previous.version && target.kind.is_list_shaped() {
            let merged = keyed_three_way(target.kind, &previous.content, &content, &latest.content)
                .ok_or_else(|| target.pull_before_push())?;
            if checksum(&merged) == latest.checksum {
                let report = self.publish(target, &latest, &request.writable).await?;
                return Ok(ReconcileOutcome::new(
                    latest,
                    ReconcileAction::Republished,
                    Some(report),
                ));
            }
            (
                increment_version(&latest, merged, Some(&latest), me)?,
                ReconcileAction::Merged,
            )
        } else {
            (
                increment_version(&previous, content, Some(&previous), me)?,
                ReconcileAction::Advanced,
            )
        };

        let diverged_at_next = copies
            .iter()
            .any(|c| c.descriptor.checksum_at(next.version).is_some_and(|s| s != next.checksum));
        let rewritten_previous = latest
            .checksum_at(previous.version)
            .is_some_and(|s| s != previous.checksum);
        if next.version != latest.version + 1 || diverged_at_next || rewritten_previous {
            log::info!(
                "Refusing to write {} v{}: v{} is the latest known",
                target.path,
                next.version,
                latest.version
            );
            return Err(target.pull_before_push());
        }

        let report = self.publish(target, &next, &request.writable).await?;
        log::info!("Wrote {} v{}", target.path, next.version);
        Ok(ReconcileOutcome::new(next, action, Some(report)))
    }

    async fn read(
        &self,
        request: &ReconcileRequest,
        previous: Option<Descriptor>,
        remote: Vec<FetchedCopy>,
    ) -> Result<ReconcileOutcome> {
        let target = &request.target;
        let remote_version = remote.iter().map(|c| c.descriptor.version).max();

        let mut copies = remote;
        if let Some(previous) = &previous {
            copies.push(FetchedCopy {
                owner: self.session.identity().to_string(),
                descriptor: previous.clone(),
            });
        }
        if copies.is_empty() {
            return Err(KeystoneError::DescriptorNotFound {
                path: target.path.clone(),
            });
        }

        let settled = self.settle(target, &copies).await?;
        if settled.merged {
            let report = self.publish(target, &settled.descriptor, &request.writable).await?;
            return Ok(ReconcileOutcome::new(
                settled.descriptor,
                ReconcileAction::Merged,
                Some(report),
            ));
        }

        let latest = settled.descriptor;
        let republish = match &previous {
            None => true,
            Some(previous) if !previous.same_version_as(&latest) => true,
            // Other members lag behind: an earlier fan-out may have been partial
            Some(previous) => {
                request.force_publish || remote_version.is_some_and(|v| v < previous.version)
            }
        };
        if !republish {
            return Ok(ReconcileOutcome::new(latest, ReconcileAction::UpToDate, None));
        }

        let report = self.publish(target, &latest, &request.writable).await?;
        Ok(ReconcileOutcome::new(
            latest,
            ReconcileAction::Republished,
            Some(report),
        ))
    }

    /// Settle on the latest content among `copies`, merging divergent ones.
    async fn settle(&self, target: &Target, copies: &[FetchedCopy]) -> Result<Settled> {
        let me = self.session.identity();
        let (version, candidates) = match classify::classify(copies, me) {
            Some(Latest::Agreed(copy)) => {
                return Ok(Settled {
                    descriptor: copy.descriptor,
                    merged: false,
                });
            }
            Some(Latest::Diverged {
                version,
                candidates,
            }) => (version, candidates),
            None => {
                return Err(KeystoneError::DescriptorNotFound {
                    path: target.path.clone(),
                });
            }
        };

        log::info!(
            "{} copies of {} diverge at v{}",
            candidates.len(),
            target.path,
            version
        );

        let mut base = None;
        let mut merged = classify::union_of(target.kind, &candidates);
        if merged.is_none() {
            let ancestor = self.base_of(target, &candidates, copies, version)?;
            merged = classify::three_way_of(target.kind, &ancestor, &candidates);
            base = Some(ancestor);
        }

        let content = match merged {
            Some(content) => content,
            None => {
                let conflict = Conflict {
                    path: target.path.clone(),
                    kind: target.kind,
                    local_identity: me.to_string(),
                    candidates: candidates
                        .iter()
                        .map(|c| ConflictCandidate {
                            owner: c.owner.clone(),
                            author: c.descriptor.author.clone(),
                            version: c.descriptor.version,
                            checksum: c.descriptor.checksum.clone(),
                            content: c.descriptor.content.clone(),
                        })
                        .collect(),
                    base,
                };
                let resolution = self.resolver.resolve(&conflict).await?;
                log::info!("Conflict on {} resolved with {:?}", target.path, resolution);
                conflict.resolved_content(&resolution)?
            }
        };

        // Advance from a candidate the content differs from, the own copy first
        let new_checksum = checksum(&content);
        let from = candidates
            .iter()
            .find(|c| c.descriptor.checksum != new_checksum)
            .map(|c| &c.descriptor)
            .ok_or_else(|| KeystoneError::UnresolvedConflict {
                path: target.path.clone(),
            })?;
        let mut descriptor = increment_version(from, content, Some(from), me)?;
        descriptor.path = target.path.clone();

        Ok(Settled {
            descriptor,
            merged: true,
        })
    }

    /// Content the diverging candidates last agreed on.
    fn base_of(
        &self,
        target: &Target,
        candidates: &[FetchedCopy],
        copies: &[FetchedCopy],
        version: u64,
    ) -> Result<Value> {
        if let Some(ancestor) = classify::common_ancestor(candidates)
            && let Some(first) = candidates.first()
        {
            return first.descriptor.content_at(ancestor);
        }
        match classify::stable_copy(copies, version) {
            Some(stable) => {
                log::debug!(
                    "No common ancestor for {}, using v{} held by {}",
                    target.path,
                    stable.descriptor.version,
                    stable.owner
                );
                Ok(stable.descriptor.content.clone())
            }
            None => Err(KeystoneError::NoStableVersion {
                path: target.path.clone(),
            }),
        }
    }

    async fn publish(
        &self,
        target: &Target,
        descriptor: &Descriptor,
        writable: &[Member],
    ) -> Result<PublishReport> {
        let mut descriptor = descriptor.clone();
        descriptor.path = target.path.clone();
        fan::fan_out(&self.session, &descriptor, writable).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::conflict::{ConflictResolution, ResolveWith, SkipConflicts};
    use crate::storage::MemoryNetwork;
    use serde_json::json;

    const PROJECT: &str = "app/5f0c3a1e-0000-4000-8000-000000000000";

    struct Peer {
        reconciler: Reconciler,
    }

    impl Peer {
        fn join(network: &MemoryNetwork, identity: &str) -> Self {
            Self::join_with(network, identity, Arc::new(SkipConflicts))
        }

        fn join_with(
            network: &MemoryNetwork,
            identity: &str,
            resolver: Arc<dyn ConflictResolver>,
        ) -> Self {
            let hub = Arc::new(network.join(identity).unwrap());
            let session = Arc::new(Session::new(hub, network.resolver(), EngineConfig::default()));
            Self {
                reconciler: Reconciler::new(session, resolver),
            }
        }

        fn identity(&self) -> &str {
            self.reconciler.session().identity()
        }

        fn file(&self, name: &str) -> Target {
            Target::new(name, PathRequest::file(PROJECT, "default", name, self.identity())).unwrap()
        }

        fn env(&self) -> Target {
            Target::new("default", PathRequest::env(PROJECT, "default", self.identity())).unwrap()
        }

        async fn push(&self, target: Target, members: &Members, content: Value) -> Result<ReconcileOutcome> {
            self.reconciler
                .reconcile(ReconcileRequest::write(target, members, content))
                .await
        }

        async fn pull(&self, target: Target, members: &Members) -> Result<ReconcileOutcome> {
            self.reconciler
                .reconcile(ReconcileRequest::read(target, members))
                .await
        }

        /// Write the next version without looking at other members' hubs,
        /// as a writer racing another one would.
        async fn race(&self, target: Target, members: &Members, content: Value) {
            let session = self.reconciler.session();
            let previous = session.read_own(&target.path).await.unwrap().unwrap();
            let next = increment_version(&previous, content, Some(&previous), self.identity()).unwrap();
            fan::fan_out(session, &next, &members.writable()).await.unwrap();
        }
    }

    fn team() -> Members {
        let mut members = Members::with_admin(Member::new("alice"));
        members
            .add(Member::new("bob"), crate::members::Role::Contributor)
            .unwrap();
        members
    }

    #[tokio::test]
    async fn test_first_write_creates_version_one() {
        let network = MemoryNetwork::new();
        let alice = Peer::join(&network, "alice");
        network.join("bob").unwrap();
        let members = team();

        let outcome = alice
            .push(alice.file(".env"), &members, json!("A=1\n"))
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Created);
        assert_eq!(outcome.descriptor.version, 1);
        let report = outcome.publish.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.results.len(), 2);

        let paths = network.paths_of("alice");
        assert!(paths.contains(&format!("{PROJECT}/default/.env/alice.json")));
        assert!(paths.contains(&format!("{PROJECT}/default/.env/bob.json")));
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_reaches_members() {
        let network = MemoryNetwork::new();
        let hub = Arc::new(network.join("alice").unwrap());
        network.join("bob").unwrap();
        let config = EngineConfig {
            concurrency: 0,
            ..EngineConfig::default()
        };
        let session = Arc::new(Session::new(hub, network.resolver(), config));
        let alice = Peer {
            reconciler: Reconciler::new(session, Arc::new(SkipConflicts)),
        };

        let members = team();
        let push = alice.push(alice.file(".env"), &members, json!("A=1\n"));
        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), push)
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.publish.unwrap().is_complete());
        assert!(network.paths_of("alice").contains(&format!("{PROJECT}/default/.env/bob.json")));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let network = MemoryNetwork::new();
        let alice = Peer::join(&network, "alice");
        let bob = Peer::join(&network, "bob");
        let members = team();

        alice
            .push(alice.file(".env"), &members, json!("A=1\n"))
            .await
            .unwrap();
        let first = bob.pull(bob.file(".env"), &members).await.unwrap();
        assert_eq!(first.action, ReconcileAction::Republished);

        let again = bob.pull(bob.file(".env"), &members).await.unwrap();
        assert_eq!(again.action, ReconcileAction::UpToDate);
        assert!(!again.published());
        assert!(again.descriptor.same_version_as(&first.descriptor));

        let unchanged = alice
            .push(alice.file(".env"), &members, json!("A=1\n"))
            .await
            .unwrap();
        assert_eq!(unchanged.action, ReconcileAction::Unchanged);
    }

    #[tokio::test]
    async fn test_stale_writer_must_pull() {
        let network = MemoryNetwork::new();
        let alice = Peer::join(&network, "alice");
        let bob = Peer::join(&network, "bob");
        let members = team();

        alice
            .push(alice.file(".env"), &members, json!("A=1\n"))
            .await
            .unwrap();
        bob.pull(bob.file(".env"), &members).await.unwrap();
        alice
            .push(alice.file(".env"), &members, json!("A=2\n"))
            .await
            .unwrap();

        let err = bob
            .push(bob.file(".env"), &members, json!("A=3\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, KeystoneError::PullBeforeYouPush { .. }));

        let pulled = bob.pull(bob.file(".env"), &members).await.unwrap();
        assert_eq!(pulled.descriptor.version, 2);
        let pushed = bob
            .push(bob.file(".env"), &members, json!("A=3\n"))
            .await
            .unwrap();
        assert_eq!(pushed.descriptor.version, 3);
        assert_eq!(pushed.action, ReconcileAction::Advanced);
    }

    #[tokio::test]
    async fn test_remote_copy_without_own_copy_must_pull() {
        let network = MemoryNetwork::new();
        let alice = Peer::join(&network, "alice");
        let bob = Peer::join(&network, "bob");
        let members = team();

        alice
            .push(alice.file(".env"), &members, json!("A=1\n"))
            .await
            .unwrap();
        let err = bob
            .push(bob.file(".env"), &members, json!("B=1\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, KeystoneError::PullBeforeYouPush { .. }));
    }

    #[tokio::test]
    async fn test_env_writes_merge_off_the_remote() {
        let network = MemoryNetwork::new();
        let alice = Peer::join(&network, "alice");
        let bob = Peer::join(&network, "bob");
        let members = team();
        let empty = json!({"name": "default", "files": []});

        alice.push(alice.env(), &members, empty.clone()).await.unwrap();
        bob.pull(bob.env(), &members).await.unwrap();

        alice
            .push(
                alice.env(),
                &members,
                json!({"name": "default", "files": [{"name": "a", "checksum": "1"}]}),
            )
            .await
            .unwrap();
        let outcome = bob
            .push(
                bob.env(),
                &members,
                json!({"name": "default", "files": [{"name": "b", "checksum": "2"}]}),
            )
            .await
            .unwrap();

        assert_eq!(outcome.action, ReconcileAction::Merged);
        assert_eq!(outcome.descriptor.version, 3);
        let env = outcome.descriptor.env_content().unwrap();
        assert!(env.file("a").is_some());
        assert!(env.file("b").is_some());
    }

    #[tokio::test]
    async fn test_divergent_file_copies_merge_on_read() {
        let network = MemoryNetwork::new();
        let alice = Peer::join(&network, "alice");
        let bob = Peer::join(&network, "bob");
        let members = team();

        alice
            .push(alice.file(".env"), &members, json!("A=1\nB=2\n"))
            .await
            .unwrap();
        bob.pull(bob.file(".env"), &members).await.unwrap();

        // Both write v2 concurrently
        alice
            .push(alice.file(".env"), &members, json!("A=10\nB=2\n"))
            .await
            .unwrap();
        bob.race(bob.file(".env"), &members, json!("A=1\nB=20\n")).await;

        let outcome = alice.pull(alice.file(".env"), &members).await.unwrap();
        assert_eq!(outcome.action, ReconcileAction::Merged);
        assert_eq!(outcome.descriptor.version, 3);
        assert_eq!(outcome.descriptor.content, json!("A=10\nB=20\n"));
        assert_eq!(outcome.descriptor.author, "alice");
        outcome.descriptor.verify().unwrap();
    }

    #[tokio::test]
    async fn test_unmergeable_conflict_goes_to_resolver() {
        let network = MemoryNetwork::new();
        let keep_remote: Arc<dyn ConflictResolver> =
            Arc::new(ResolveWith(|_: &Conflict| ConflictResolution::KeepRemote));
        let alice = Peer::join_with(&network, "alice", keep_remote);
        let bob = Peer::join(&network, "bob");
        let members = team();

        alice
            .push(alice.file(".env"), &members, json!("A=1\n"))
            .await
            .unwrap();
        bob.pull(bob.file(".env"), &members).await.unwrap();

        alice
            .push(alice.file(".env"), &members, json!("A=2\n"))
            .await
            .unwrap();
        bob.race(bob.file(".env"), &members, json!("A=3\n")).await;

        let outcome = alice.pull(alice.file(".env"), &members).await.unwrap();
        assert_eq!(outcome.action, ReconcileAction::Merged);
        assert_eq!(outcome.descriptor.content, json!("A=3\n"));
        assert_eq!(outcome.descriptor.version, 3);

        let adopted = bob.pull(bob.file(".env"), &members).await.unwrap();
        assert_eq!(adopted.action, ReconcileAction::Republished);
        assert_eq!(adopted.descriptor.content, json!("A=3\n"));
    }

    #[tokio::test]
    async fn test_skipped_conflict_is_an_error() {
        let network = MemoryNetwork::new();
        let alice = Peer::join(&network, "alice");
        let bob = Peer::join(&network, "bob");
        let members = team();

        alice
            .push(alice.file(".env"), &members, json!("A=1\n"))
            .await
            .unwrap();
        bob.pull(bob.file(".env"), &members).await.unwrap();

        alice
            .push(alice.file(".env"), &members, json!("A=2\n"))
            .await
            .unwrap();
        bob.race(bob.file(".env"), &members, json!("A=3\n")).await;

        let err = alice.pull(alice.file(".env"), &members).await.unwrap_err();
        assert!(matches!(err, KeystoneError::UnresolvedConflict { .. }));
    }

    #[tokio::test]
    async fn test_missing_everywhere_is_not_found() {
        let network = MemoryNetwork::new();
        let alice = Peer::join(&network, "alice");
        network.join("bob").unwrap();
        let err = alice.pull(alice.file(".env"), &team()).await.unwrap_err();
        assert!(matches!(err, KeystoneError::DescriptorNotFound { .. }));
    }

    #[tokio::test]
    async fn test_forced_publish_reaches_new_member() {
        let network = MemoryNetwork::new();
        let alice = Peer::join(&network, "alice");
        network.join("carol").unwrap();
        let mut members = team();
        network.join("bob").unwrap();

        alice
            .push(alice.file(".env"), &members, json!("A=1\n"))
            .await
            .unwrap();
        members
            .add(Member::new("carol"), crate::members::Role::Reader)
            .unwrap();

        let quiet = alice.pull(alice.file(".env"), &members).await.unwrap();
        assert_eq!(quiet.action, ReconcileAction::UpToDate);

        let forced = alice
            .reconciler
            .reconcile(ReconcileRequest::read(alice.file(".env"), &members).force_publish())
            .await
            .unwrap();
        assert_eq!(forced.action, ReconcileAction::Republished);
        assert!(
            network
                .paths_of("alice")
                .contains(&format!("{PROJECT}/default/.env/carol.json"))
        );
    }
}
