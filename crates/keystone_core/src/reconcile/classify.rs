//! Divergence detection over the copies gathered by fan-in.

use serde_json::Value;

use super::fan::FetchedCopy;
use crate::merge::{keyed_three_way, merge_content, structural_union};
use crate::path::DescriptorType;

/// State of the copies at their highest version.
#[derive(Debug, Clone)]
pub enum Latest {
    /// Every copy at the highest version carries the same content
    Agreed(FetchedCopy),
    /// Copies disagree at `version`; one candidate per distinct checksum,
    /// the caller's own copy first
    Diverged {
        version: u64,
        candidates: Vec<FetchedCopy>,
    },
}

/// Group copies by version and look at the highest one.
pub fn classify(copies: &[FetchedCopy], me: &str) -> Option<Latest> {
    let version = copies.iter().map(|c| c.descriptor.version).max()?;

    let mut candidates: Vec<FetchedCopy> = Vec::new();
    for copy in copies.iter().filter(|c| c.descriptor.version == version) {
        match candidates
            .iter_mut()
            .find(|c| c.descriptor.checksum == copy.descriptor.checksum)
        {
            // Prefer the own copy as representative of its group
            Some(existing) if copy.owner == me => *existing = copy.clone(),
            Some(_) => {}
            None => candidates.push(copy.clone()),
        }
    }
    candidates.sort_by(|a, b| (a.owner != me, &a.owner).cmp(&(b.owner != me, &b.owner)));

    if candidates.len() == 1 {
        return candidates.pop().map(Latest::Agreed);
    }
    Some(Latest::Diverged {
        version,
        candidates,
    })
}

/// Most recent version on which every candidate's history agrees.
pub fn common_ancestor(candidates: &[FetchedCopy]) -> Option<u64> {
    let (first, rest) = candidates.split_first()?;
    let top = candidates.iter().map(|c| c.descriptor.version).min()?;
    (1..top).rev().find(|version| {
        let Some(checksum) = first.descriptor.checksum_at(*version) else {
            return false;
        };
        rest.iter()
            .all(|c| c.descriptor.checksum_at(*version) == Some(checksum))
    })
}

/// Highest version below `below` held unanimously by the copies sitting at
/// exactly that version.
pub fn stable_copy(copies: &[FetchedCopy], below: u64) -> Option<&FetchedCopy> {
    let mut version = below;
    while version > 1 {
        version -= 1;
        let mut at_version = copies.iter().filter(|c| c.descriptor.version == version);
        let Some(first) = at_version.next() else {
            continue;
        };
        if at_version.all(|c| c.descriptor.checksum == first.descriptor.checksum) {
            return Some(first);
        }
    }
    None
}

/// Union of diverged list-shaped contents, when their shared items agree.
pub fn union_of(kind: DescriptorType, candidates: &[FetchedCopy]) -> Option<Value> {
    if !kind.is_list_shaped() {
        return None;
    }
    let contents: Vec<&Value> = candidates.iter().map(|c| &c.descriptor.content).collect();
    structural_union(kind, &contents)
}

/// Fold a three-way merge of every candidate against `base`.
pub fn three_way_of(kind: DescriptorType, base: &Value, candidates: &[FetchedCopy]) -> Option<Value> {
    let (first, rest) = candidates.split_first()?;
    rest.iter().try_fold(first.descriptor.content.clone(), |merged, next| {
        if kind.is_list_shaped() {
            keyed_three_way(kind, base, &merged, &next.descriptor.content)
        } else {
            merge_content(base, &merged, &next.descriptor.content)
        }
    })
}
