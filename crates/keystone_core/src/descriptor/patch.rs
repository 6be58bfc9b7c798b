//! Line-level patches between two descriptor contents.
//!
//! A descriptor keeps its lineage as a chain of reverse patches: each history
//! entry turns the content of version `n + 1` back into the content of
//! version `n`. Patches operate on a text rendering of the content (the raw
//! string for text files, pretty-printed JSON for everything else) and
//! remember which rendering the target used so that applying them restores
//! the exact value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{Algorithm, DiffOp, capture_diff_slices};

/// How the content a patch produces is rendered as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchTarget {
    /// The content is a JSON string, diffed as raw text
    Text,
    /// Any other JSON value, diffed as pretty-printed JSON
    Json,
}

/// One step of an edit script, applied to the source lines in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Copy `count` source lines unchanged
    Keep { count: usize },
    /// Skip `count` source lines
    Delete { count: usize },
    /// Emit new lines
    Insert { lines: Vec<String> },
}

/// An edit script turning one content into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub target: PatchTarget,
    pub ops: Vec<PatchOp>,
}

/// Render a content value as text, together with the rendering used.
pub fn render(content: &Value) -> (String, PatchTarget) {
    match content {
        Value::String(text) => (text.clone(), PatchTarget::Text),
        other => (
            serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
            PatchTarget::Json,
        ),
    }
}

/// Split text into lines, keeping line terminators so that joining is lossless.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

impl Patch {
    /// Build the patch that turns `from` into `to`.
    pub fn create(from: &Value, to: &Value) -> Self {
        let (from_text, _) = render(from);
        let (to_text, target) = render(to);
        let from_lines = split_lines(&from_text);
        let to_lines = split_lines(&to_text);

        let mut ops = Vec::new();
        for op in capture_diff_slices(Algorithm::Myers, &from_lines, &to_lines) {
            match op {
                DiffOp::Equal { len, .. } => push_op(&mut ops, PatchOp::Keep { count: len }),
                DiffOp::Delete { old_len, .. } => {
                    push_op(&mut ops, PatchOp::Delete { count: old_len })
                }
                DiffOp::Insert {
                    new_index, new_len, ..
                } => push_op(
                    &mut ops,
                    PatchOp::Insert {
                        lines: owned(&to_lines[new_index..new_index + new_len]),
                    },
                ),
                DiffOp::Replace {
                    old_len,
                    new_index,
                    new_len,
                    ..
                } => {
                    push_op(&mut ops, PatchOp::Delete { count: old_len });
                    push_op(
                        &mut ops,
                        PatchOp::Insert {
                            lines: owned(&to_lines[new_index..new_index + new_len]),
                        },
                    );
                }
            }
        }

        Self { target, ops }
    }

    /// Apply the patch to `from`, producing the content it was built towards.
    pub fn apply(&self, from: &Value) -> Result<Value, String> {
        let (from_text, _) = render(from);
        let source = split_lines(&from_text);
        let mut cursor = 0usize;
        let mut out = String::with_capacity(from_text.len());

        for op in &self.ops {
            match op {
                PatchOp::Keep { count } => {
                    let end = cursor + count;
                    let lines = source.get(cursor..end).ok_or_else(|| {
                        format!("keep of {count} lines at line {cursor} runs past the end")
                    })?;
                    lines.iter().for_each(|line| out.push_str(line));
                    cursor = end;
                }
                PatchOp::Delete { count } => {
                    let end = cursor + count;
                    if end > source.len() {
                        return Err(format!(
                            "delete of {count} lines at line {cursor} runs past the end"
                        ));
                    }
                    cursor = end;
                }
                PatchOp::Insert { lines } => lines.iter().for_each(|line| out.push_str(line)),
            }
        }

        if cursor != source.len() {
            return Err(format!(
                "patch consumed {cursor} of {} source lines",
                source.len()
            ));
        }

        match self.target {
            PatchTarget::Text => Ok(Value::String(out)),
            PatchTarget::Json => serde_json::from_str(&out).map_err(|e| e.to_string()),
        }
    }
}

fn owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}

fn push_op(ops: &mut Vec<PatchOp>, op: PatchOp) {
    if matches!(op, PatchOp::Keep { count: 0 } | PatchOp::Delete { count: 0 }) {
        return;
    }
    let merged = match (ops.last_mut(), &op) {
        (Some(PatchOp::Keep { count }), PatchOp::Keep { count: more })
        | (Some(PatchOp::Delete { count }), PatchOp::Delete { count: more }) => {
            *count += *more;
            true
        }
        (Some(PatchOp::Insert { lines }), PatchOp::Insert { lines: more }) => {
            lines.extend(more.iter().cloned());
            true
        }
        _ => false,
    };
    if !merged {
        ops.push(op);
    }
}
