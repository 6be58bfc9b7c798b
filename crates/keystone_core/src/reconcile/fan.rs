//! Fan-in of members' copies and fan-out of new versions.

use futures_util::StreamExt;
use futures_util::stream;
use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::error::{KeystoneError, Result};
use crate::members::Member;
use crate::session::Session;

/// A copy of a descriptor as found in one member's hub.
#[derive(Debug, Clone)]
pub struct FetchedCopy {
    pub owner: String,
    pub descriptor: Descriptor,
}

/// Outcome of writing one member's copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPublish {
    pub identity: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MemberPublish {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-member results of a fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub results: Vec<MemberPublish>,
}

impl PublishReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &MemberPublish> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &MemberPublish> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Read `path` from the hub of every member in `readable` except the caller.
///
/// Missing copies are skipped. Share-link members hold no hub and are never
/// contacted. Failing members are logged and skipped; when every member
/// failed, the first error is returned.
pub async fn fan_in(session: &Session, path: &str, readable: &[Member]) -> Result<Vec<FetchedCopy>> {
    let me = session.identity();
    let others: Vec<&Member> = readable
        .iter()
        .filter(|m| m.identity != me && !m.is_shared())
        .collect();
    if others.is_empty() {
        return Ok(Vec::new());
    }

    let results: Vec<(String, Result<Option<Descriptor>>)> = stream::iter(others)
        .map(|member| async move {
            let identity = member.identity.clone();
            let fetched = session.read_from(&identity, path).await;
            (identity, fetched)
        })
        .buffer_unordered(session.config().fan_width())
        .collect()
        .await;

    let attempted = results.len();
    let mut copies = Vec::new();
    let mut first_error = None;
    let mut failures = 0usize;

    for (owner, fetched) in results {
        match fetched {
            Ok(Some(descriptor)) => match descriptor.verify() {
                Ok(()) => copies.push(FetchedCopy { owner, descriptor }),
                Err(e) => {
                    log::warn!("Ignoring copy of {} from {}: {}", path, owner, e);
                }
            },
            Ok(None) => {}
            Err(e) => {
                log::warn!("Cannot fetch {} from {}: {}", path, owner, e);
                failures += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    if failures == attempted
        && let Some(err) = first_error
    {
        return Err(err);
    }

    // Stable order keeps merges deterministic across members
    copies.sort_by(|a, b| a.owner.cmp(&b.owner));
    Ok(copies)
}

/// Write the caller's own copy, then one copy per other member of `writable`.
///
/// Every member is attempted; failures are reported, not raised. The call
/// fails only when other members exist and none of them could be written.
pub async fn fan_out(
    session: &Session,
    descriptor: &Descriptor,
    writable: &[Member],
) -> Result<PublishReport> {
    let me = session.identity();
    let own = descriptor.for_owner(me);
    session.write_own(&own).await?;

    let mut report = PublishReport {
        results: vec![MemberPublish {
            identity: me.to_string(),
            path: own.path.clone(),
            error: None,
        }],
    };

    let mut others: Vec<&Member> = writable.iter().filter(|m| m.identity != me).collect();
    others.dedup_by(|a, b| a.identity == b.identity);
    if others.is_empty() {
        return Ok(report);
    }

    let results: Vec<MemberPublish> = stream::iter(others)
        .map(|member| async move {
            let copy = descriptor.for_owner(&member.identity);
            let error = publish_copy(session, member, &copy).await.err();
            if let Some(e) = &error {
                log::warn!("Cannot publish {} for {}: {}", copy.path, member.identity, e);
            }
            MemberPublish {
                identity: member.identity.clone(),
                path: copy.path,
                error: error.map(|e| e.to_string()),
            }
        })
        .buffer_unordered(session.config().fan_width())
        .collect()
        .await;

    if !results.iter().any(MemberPublish::is_success) {
        return Err(KeystoneError::NoMemberReachable {
            path: own.path.clone(),
        });
    }

    report.results.extend(results);
    report.results[1..].sort_by(|a, b| a.identity.cmp(&b.identity));
    log::debug!(
        "Published {} v{} to {} member(s)",
        own.path,
        own.version,
        report.succeeded().count()
    );
    Ok(report)
}

async fn publish_copy(session: &Session, member: &Member, copy: &Descriptor) -> Result<()> {
    let key = session
        .public_key_of(member)
        .await?
        .ok_or_else(|| KeystoneError::PublicKeyNotFound(member.identity.clone()))?;
    session.write_for(copy, &key).await
}

/// Delete the copies of `path` meant for `members` (and the caller) from the
/// own hub. Best effort: failures are reported per member.
pub async fn unpublish(session: &Session, path: &str, members: &[Member]) -> PublishReport {
    let me = session.identity().to_string();
    let mut identities: Vec<String> = members.iter().map(|m| m.identity.clone()).collect();
    identities.push(me);
    identities.sort();
    identities.dedup();

    let results = stream::iter(identities)
        .map(|identity| async move {
            let member_path = crate::path::with_owner(path, &identity);
            let error = session.delete_own(&member_path).await.err();
            if let Some(e) = &error {
                log::warn!("Cannot delete {}: {}", member_path, e);
            }
            MemberPublish {
                identity,
                path: member_path,
                error: error.map(|e| e.to_string()),
            }
        })
        .buffer_unordered(session.config().fan_width())
        .collect::<Vec<_>>()
        .await;

    let mut report = PublishReport { results };
    report.results.sort_by(|a, b| a.identity.cmp(&b.identity));
    report
}
