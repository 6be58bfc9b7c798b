//! Merge primitives used by the reconciliation engine.
//!
//! List-shaped contents (`env` file indexes and `members` lists) are merged
//! structurally: every item is addressed by a key (file name, member
//! identity) and copies are combined item by item. Other contents are merged
//! line by line against a common ancestor.
//!
//! Merges return `None` when the inputs genuinely conflict; the caller then
//! hands the decision to a [`crate::conflict::ConflictResolver`].

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use similar::{Algorithm, DiffOp, capture_diff_slices};

use crate::descriptor::patch::{PatchTarget, render, split_lines};
use crate::members::Role;
use crate::path::DescriptorType;

type Entries = BTreeMap<String, Value>;

/// Flatten a list-shaped content into keyed items.
fn entries(kind: DescriptorType, content: &Value) -> Option<Entries> {
    let mut out = Entries::new();
    match kind {
        DescriptorType::Env => {
            for file in content.get("files")?.as_array()? {
                let name = file.get("name")?.as_str()?;
                out.insert(name.to_string(), file.clone());
            }
        }
        DescriptorType::Members => {
            for role in Role::ALL {
                let Some(list) = content.get(role_key(role)) else {
                    continue;
                };
                for member in list.as_array()? {
                    let identity = member.get("identity")?.as_str()?;
                    let item = json!({ "role": role, "member": member });
                    if out.insert(identity.to_string(), item).is_some() {
                        // Same identity listed under two roles of one copy
                        return None;
                    }
                }
            }
        }
        DescriptorType::Project | DescriptorType::File => return None,
    }
    Some(out)
}

fn role_key(role: Role) -> &'static str {
    match role {
        Role::Admin => "admins",
        Role::Contributor => "contributors",
        Role::Reader => "readers",
    }
}

/// Rebuild a content from keyed items, sorted by key.
fn rebuild(kind: DescriptorType, template: &Value, entries: Entries) -> Option<Value> {
    match kind {
        DescriptorType::Env => {
            let mut content = template.as_object()?.clone();
            content.insert(
                "files".to_string(),
                Value::Array(entries.into_values().collect()),
            );
            Some(Value::Object(content))
        }
        DescriptorType::Members => {
            let mut content = Map::new();
            for role in Role::ALL {
                content.insert(role_key(role).to_string(), Value::Array(Vec::new()));
            }
            for item in entries.into_values() {
                let role: Role = serde_json::from_value(item.get("role")?.clone()).ok()?;
                let list = content.get_mut(role_key(role))?.as_array_mut()?;
                list.push(item.get("member")?.clone());
            }
            Some(Value::Object(content))
        }
        DescriptorType::Project | DescriptorType::File => None,
    }
}

/// Fields outside of the keyed lists must agree between copies.
fn same_header(kind: DescriptorType, a: &Value, b: &Value) -> bool {
    match kind {
        DescriptorType::Env => a.get("name") == b.get("name"),
        _ => true,
    }
}

/// Union of several copies of a list-shaped content.
///
/// Items present in only some copies are kept; items present in several
/// copies must be identical. The result does not depend on the order of
/// `copies`.
pub fn structural_union(kind: DescriptorType, copies: &[&Value]) -> Option<Value> {
    let (first, rest) = copies.split_first()?;
    let mut merged = entries(kind, first)?;

    for copy in rest {
        if !same_header(kind, first, copy) {
            return None;
        }
        for (key, item) in entries(kind, copy)? {
            match merged.get(&key) {
                Some(existing) if *existing != item => return None,
                Some(_) => {}
                None => {
                    merged.insert(key, item);
                }
            }
        }
    }

    rebuild(kind, first, merged)
}

/// Three-way merge of list-shaped contents against a common `base`.
///
/// Additions, removals and modifications from either side are applied; the
/// same item changed differently on both sides is a conflict.
pub fn keyed_three_way(
    kind: DescriptorType,
    base: &Value,
    ours: &Value,
    theirs: &Value,
) -> Option<Value> {
    if !same_header(kind, ours, theirs) {
        return None;
    }
    let base_entries = entries(kind, base)?;
    let our_entries = entries(kind, ours)?;
    let their_entries = entries(kind, theirs)?;

    let mut keys: Vec<&String> = base_entries
        .keys()
        .chain(our_entries.keys())
        .chain(their_entries.keys())
        .collect();
    keys.sort();
    keys.dedup();

    let mut merged = Entries::new();
    for key in keys {
        let b = base_entries.get(key);
        let o = our_entries.get(key);
        let t = their_entries.get(key);
        let pick = if o == t {
            o
        } else if o == b {
            t
        } else if t == b {
            o
        } else {
            return None;
        };
        if let Some(item) = pick {
            merged.insert(key.clone(), item.clone());
        }
    }

    rebuild(kind, ours, merged)
}

/// A replacement of `base[start..end]` by `lines`.
#[derive(Debug)]
struct Hunk<'a> {
    start: usize,
    end: usize,
    lines: Vec<&'a str>,
}

fn hunks<'a>(base: &[&'a str], other: &[&'a str]) -> Vec<Hunk<'a>> {
    let mut out: Vec<Hunk<'a>> = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, base, other) {
        let hunk = match op {
            DiffOp::Equal { .. } => continue,
            DiffOp::Delete {
                old_index, old_len, ..
            } => Hunk {
                start: old_index,
                end: old_index + old_len,
                lines: Vec::new(),
            },
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => Hunk {
                start: old_index,
                end: old_index,
                lines: other[new_index..new_index + new_len].to_vec(),
            },
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => Hunk {
                start: old_index,
                end: old_index + old_len,
                lines: other[new_index..new_index + new_len].to_vec(),
            },
        };
        match out.last_mut() {
            Some(last) if last.end == hunk.start => {
                last.end = hunk.end;
                last.lines.extend(hunk.lines);
            }
            _ => out.push(hunk),
        }
    }
    out
}

fn apply_range<'a>(base: &[&'a str], from: usize, to: usize, hunks: &[Hunk<'a>]) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut pos = from;
    for hunk in hunks {
        out.extend_from_slice(&base[pos..hunk.start]);
        out.extend_from_slice(&hunk.lines);
        pos = hunk.end;
    }
    out.extend_from_slice(&base[pos..to]);
    out
}

/// A region of a three-way line merge.
#[derive(Debug)]
enum Region<'a> {
    Resolved(Vec<&'a str>),
    Conflict {
        ours: Vec<&'a str>,
        theirs: Vec<&'a str>,
    },
}

fn diff3<'a>(base_lines: &[&'a str], our_lines: &[&'a str], their_lines: &[&'a str]) -> Vec<Region<'a>> {
    let our_hunks = hunks(base_lines, our_lines);
    let their_hunks = hunks(base_lines, their_lines);

    let mut regions = Vec::new();
    let mut pos = 0usize;
    let (mut i, mut j) = (0usize, 0usize);

    while i < our_hunks.len() || j < their_hunks.len() {
        let start = match (our_hunks.get(i), their_hunks.get(j)) {
            (Some(a), Some(b)) => a.start.min(b.start),
            (Some(a), None) => a.start,
            (None, Some(b)) => b.start,
            (None, None) => break,
        };

        // Grow the region until no hunk of either side overlaps it. Hunks
        // only meeting at a boundary stay apart unless both sit on the
        // region's start, where their order would be ambiguous.
        let (first_ours, first_theirs) = (i, j);
        let mut end = start;
        let overlaps =
            |h: &Hunk<'_>, end: usize| h.start < end || (h.start == start && start == end);
        loop {
            let mut grew = false;
            while let Some(h) = our_hunks.get(i)
                && overlaps(h, end)
            {
                end = end.max(h.end);
                i += 1;
                grew = true;
            }
            while let Some(h) = their_hunks.get(j)
                && overlaps(h, end)
            {
                end = end.max(h.end);
                j += 1;
                grew = true;
            }
            if !grew {
                break;
            }
        }

        if pos < start {
            regions.push(Region::Resolved(base_lines[pos..start].to_vec()));
        }
        let ours_region = &our_hunks[first_ours..i];
        let theirs_region = &their_hunks[first_theirs..j];
        let region = match (ours_region.is_empty(), theirs_region.is_empty()) {
            (false, true) => Region::Resolved(apply_range(base_lines, start, end, ours_region)),
            (true, false) => Region::Resolved(apply_range(base_lines, start, end, theirs_region)),
            _ => {
                let ours = apply_range(base_lines, start, end, ours_region);
                let theirs = apply_range(base_lines, start, end, theirs_region);
                if ours == theirs {
                    Region::Resolved(ours)
                } else {
                    Region::Conflict { ours, theirs }
                }
            }
        };
        regions.push(region);
        pos = end;
    }

    if pos < base_lines.len() {
        regions.push(Region::Resolved(base_lines[pos..].to_vec()));
    }
    regions
}

/// Three-way line merge (diff3).
///
/// Changes from both sides are combined when they touch disjoint regions of
/// `base`; overlapping regions must have been changed identically.
pub fn merge_lines(base: &str, ours: &str, theirs: &str) -> Option<String> {
    let regions = diff3(&split_lines(base), &split_lines(ours), &split_lines(theirs));
    let mut out = String::new();
    for region in regions {
        match region {
            Region::Resolved(lines) => lines.iter().for_each(|l| out.push_str(l)),
            Region::Conflict { .. } => return None,
        }
    }
    Some(out)
}

/// Outcome of a three-way merge that keeps conflicting regions inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedMerge {
    pub text: String,
    /// Number of regions wrapped in conflict markers
    pub conflicts: usize,
}

fn push_block(out: &mut String, lines: &[&str]) {
    lines.iter().for_each(|l| out.push_str(l));
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Three-way line merge writing conflicting regions between markers.
pub fn merge_lines_marked(
    base: &str,
    ours: &str,
    theirs: &str,
    ours_label: &str,
    theirs_label: &str,
) -> MarkedMerge {
    let regions = diff3(&split_lines(base), &split_lines(ours), &split_lines(theirs));
    let mut text = String::new();
    let mut conflicts = 0;
    for region in regions {
        match region {
            Region::Resolved(lines) => lines.iter().for_each(|l| text.push_str(l)),
            Region::Conflict { ours, theirs } => {
                conflicts += 1;
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&format!("<<<<<<< {ours_label}\n"));
                push_block(&mut text, &ours);
                text.push_str("=======\n");
                push_block(&mut text, &theirs);
                text.push_str(&format!(">>>>>>> {theirs_label}\n"));
            }
        }
    }
    MarkedMerge { text, conflicts }
}

/// Three-way merge of arbitrary contents through their text rendering.
pub fn merge_content(base: &Value, ours: &Value, theirs: &Value) -> Option<Value> {
    if ours == theirs || theirs == base {
        return Some(ours.clone());
    }
    if ours == base {
        return Some(theirs.clone());
    }

    let (base_text, _) = render(base);
    let (our_text, our_target) = render(ours);
    let (their_text, their_target) = render(theirs);
    if our_target != their_target {
        return None;
    }

    let merged = merge_lines(&base_text, &our_text, &their_text)?;
    match our_target {
        PatchTarget::Text => Some(Value::String(merged)),
        PatchTarget::Json => serde_json::from_str(&merged).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(files: &[(&str, &str)]) -> Value {
        json!({
            "name": "default",
            "files": files
                .iter()
                .map(|(name, checksum)| json!({"name": name, "checksum": checksum}))
                .collect::<Vec<_>>(),
        })
    }

    #[test]
    fn test_union_is_order_independent() {
        let a = env(&[("a", "1"), ("b", "2")]);
        let b = env(&[("c", "3")]);
        let c = env(&[("b", "2"), ("d", "4")]);

        let abc = structural_union(DescriptorType::Env, &[&a, &b, &c]).unwrap();
        let cba = structural_union(DescriptorType::Env, &[&c, &b, &a]).unwrap();
        let bac = structural_union(DescriptorType::Env, &[&b, &a, &c]).unwrap();
        assert_eq!(abc, cba);
        assert_eq!(abc, bac);
        assert_eq!(abc, env(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]));
    }

    #[test]
    fn test_union_conflicts_on_shared_key() {
        let a = env(&[("a", "1")]);
        let b = env(&[("a", "2")]);
        assert!(structural_union(DescriptorType::Env, &[&a, &b]).is_none());
    }

    #[test]
    fn test_union_of_members() {
        let a = json!({"admins": [{"identity": "alice"}], "contributors": [], "readers": []});
        let b = json!({"admins": [{"identity": "alice"}], "contributors": [{"identity": "bob"}], "readers": []});
        let merged = structural_union(DescriptorType::Members, &[&a, &b]).unwrap();
        assert_eq!(merged, b);

        let moved = json!({"admins": [{"identity": "alice"}], "contributors": [], "readers": [{"identity": "bob"}]});
        assert!(structural_union(DescriptorType::Members, &[&b, &moved]).is_none());
    }

    #[test]
    fn test_keyed_three_way_applies_removals() {
        let base = env(&[("a", "1"), ("b", "2")]);
        let ours = env(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let theirs = env(&[("a", "1")]);
        let merged = keyed_three_way(DescriptorType::Env, &base, &ours, &theirs).unwrap();
        assert_eq!(merged, env(&[("a", "1"), ("c", "3")]));
    }

    #[test]
    fn test_keyed_three_way_conflict() {
        let base = env(&[("a", "1")]);
        let ours = env(&[("a", "2")]);
        let theirs = env(&[("a", "3")]);
        assert!(keyed_three_way(DescriptorType::Env, &base, &ours, &theirs).is_none());
    }

    #[test]
    fn test_merge_lines_disjoint_changes() {
        let base = "A=1\nB=2\nC=3\nD=4\n";
        let ours = "A=10\nB=2\nC=3\nD=4\n";
        let theirs = "A=1\nB=2\nC=3\nD=40\nE=5\n";
        assert_eq!(
            merge_lines(base, ours, theirs).unwrap(),
            "A=10\nB=2\nC=3\nD=40\nE=5\n"
        );
    }

    #[test]
    fn test_merge_lines_adjacent_changes() {
        let base = "A=1\nB=2\n";
        assert_eq!(
            merge_lines(base, "A=10\nB=2\n", "A=1\nB=20\n").unwrap(),
            "A=10\nB=20\n"
        );
        assert_eq!(
            merge_lines(base, "A=1\nB=2\nC=3\n", "A=0\nB=2\n").unwrap(),
            "A=0\nB=2\nC=3\n"
        );
    }

    #[test]
    fn test_merge_lines_insertions_at_same_point_conflict() {
        let base = "A=1\n";
        assert!(merge_lines(base, "A=1\nB=2\n", "A=1\nC=3\n").is_none());
        assert_eq!(
            merge_lines(base, "A=1\nB=2\n", "A=1\nB=2\n").unwrap(),
            "A=1\nB=2\n"
        );
    }

    #[test]
    fn test_merge_lines_identical_changes() {
        let base = "A=1\nB=2\n";
        let both = "A=1\nB=3\n";
        assert_eq!(merge_lines(base, both, both).unwrap(), both);
    }

    #[test]
    fn test_merge_lines_overlapping_changes_conflict() {
        let base = "A=1\nB=2\n";
        assert!(merge_lines(base, "A=1\nB=3\n", "A=1\nB=4\n").is_none());
    }

    #[test]
    fn test_merge_lines_marked() {
        let base = "A=1\nB=2\nC=3\n";
        let merged = merge_lines_marked(base, "A=1\nB=3\nC=3\n", "A=1\nB=4\nC=3\n", "local", "remote");
        assert_eq!(merged.conflicts, 1);
        assert_eq!(
            merged.text,
            "A=1\n<<<<<<< local\nB=3\n=======\nB=4\n>>>>>>> remote\nC=3\n"
        );

        let clean = merge_lines_marked(base, "A=0\nB=2\nC=3\n", base, "local", "remote");
        assert_eq!(clean.conflicts, 0);
        assert_eq!(clean.text, "A=0\nB=2\nC=3\n");
    }

    #[test]
    fn test_merge_content_shortcuts() {
        let base = json!("A=1\n");
        let changed = json!("A=2\n");
        assert_eq!(merge_content(&base, &base, &changed).unwrap(), changed);
        assert_eq!(merge_content(&base, &changed, &base).unwrap(), changed);
        assert!(merge_content(&base, &json!({"a": 1}), &changed).is_none());
    }
}
