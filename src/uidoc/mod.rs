//! UI document state machine
//!
//! The server-authoritative state a client renders: a versioned map of UI
//! nodes mutated through a small op algebra (upsert / delete / clear) under
//! optimistic concurrency. The version increases by exactly 1 per accepted
//! batch that contains at least one effective op; a batch whose
//! `base_version` is positive and does not match the current version is
//! rejected as a conflict with no state change.

mod engine;
mod restore;
mod store;

pub use engine::{UiDocumentService, CHAT_NODE_ID, CHAT_NODE_TYPE};
pub use restore::{RestoreOutcome, RestoreReason};
pub use store::{InMemoryUiDocumentStore, SledUiDocumentStore, UiDocumentStore};

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// One renderable node of the UI document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiNode {
    /// Node identifier; unique within the document
    pub id: String,
    /// Node type discriminator for the client renderer
    #[serde(rename = "type")]
    pub node_type: String,
    /// Renderer payload
    #[serde(default)]
    pub content: serde_json::Value,
    /// Whether the node is still streaming a response
    #[serde(default)]
    pub responding: bool,
    /// Whether the node rejects user edits
    #[serde(default)]
    pub locked: bool,
}

impl UiNode {
    /// Create a node with empty content
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            content: serde_json::Value::Null,
            responding: false,
            locked: false,
        }
    }

    /// Canonical byte encoding used for the restore content hash
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // serde_json preserves struct field order, which is fixed, so this
        // encoding is deterministic for equal nodes.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// An atomic mutation of the UI document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum UiOp {
    /// Insert or replace one node, keyed by its id
    UpsertNode { node: UiNode },
    /// Remove one node by id
    DeleteNode { node_id: String },
    /// Replace the node map with an empty one
    ClearNodes,
}

/// A versioned UI document as emitted to clients: nodes sorted by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiDocument {
    /// Owning run identifier
    pub run_id: String,
    /// Monotonic document version, starting at 0
    pub version: i64,
    /// Nodes sorted by id for deterministic client diffing
    pub nodes: Vec<UiNode>,
}

impl UiDocument {
    /// The empty document for a run
    pub fn empty(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            version: 0,
            nodes: Vec::new(),
        }
    }

    /// Deterministic content hash over the canonical node encoding:
    /// `SHA-256(concat_sorted_by_id(id || 0x00 || type || 0x00 ||
    /// canonical(node) || 0x00))`.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for node in &self.nodes {
            hasher.update(node.id.as_bytes());
            hasher.update([0u8]);
            hasher.update(node.node_type.as_bytes());
            hasher.update([0u8]);
            hasher.update(node.canonical_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// Internal per-run document state shared by the store backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct DocState {
    pub version: i64,
    pub nodes: BTreeMap<String, UiNode>,
}

impl DocState {
    pub fn to_document(&self, run_id: &str) -> UiDocument {
        UiDocument {
            run_id: run_id.to_string(),
            version: self.version,
            // BTreeMap iteration yields nodes sorted by id.
            nodes: self.nodes.values().cloned().collect(),
        }
    }
}

/// Apply one op batch to a document state. Returns the resulting document
/// and whether the batch was rejected as a version conflict.
///
/// Every exit path that reports an error leaves the state unchanged: ops
/// are validated against a scratch copy before the state is replaced.
pub(crate) fn apply_ops_to_state(
    state: &mut DocState,
    run_id: &str,
    base_version: i64,
    ops: &[UiOp],
) -> GatewayResult<(UiDocument, bool)> {
    if base_version > 0 && base_version != state.version {
        return Ok((state.to_document(run_id), true));
    }

    let mut scratch = state.nodes.clone();
    let mut changed = false;
    for op in ops {
        match op {
            UiOp::UpsertNode { node } => {
                let id = node.id.trim();
                if id.is_empty() {
                    return Err(GatewayError::InvalidArgument(
                        "upsert node requires a non-empty id".to_string(),
                    ));
                }
                let mut clone = node.clone();
                clone.id = id.to_string();
                scratch.insert(clone.id.clone(), clone);
                changed = true;
            }
            UiOp::DeleteNode { node_id } => {
                if node_id.trim().is_empty() {
                    return Err(GatewayError::InvalidArgument(
                        "delete node requires a non-empty id".to_string(),
                    ));
                }
                scratch.remove(node_id.trim());
                changed = true;
            }
            UiOp::ClearNodes => {
                scratch = BTreeMap::new();
                changed = true;
            }
        }
    }

    if changed {
        state.nodes = scratch;
        state.version += 1;
    }
    Ok((state.to_document(run_id), false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> UiNode {
        UiNode::new(id, "panel")
    }

    #[test]
    fn upsert_then_get_is_sorted_by_id() {
        let mut state = DocState::default();
        let ops = vec![
            UiOp::UpsertNode { node: node("zeta") },
            UiOp::UpsertNode { node: node("alpha") },
        ];
        let (doc, conflict) = apply_ops_to_state(&mut state, "r1", 0, &ops).unwrap();
        assert!(!conflict);
        assert_eq!(doc.version, 1);
        let ids: Vec<&str> = doc.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[test]
    fn batch_increments_version_by_one() {
        let mut state = DocState::default();
        let ops = vec![
            UiOp::UpsertNode { node: node("a") },
            UiOp::UpsertNode { node: node("b") },
            UiOp::DeleteNode {
                node_id: "a".to_string(),
            },
        ];
        let (doc, _) = apply_ops_to_state(&mut state, "r1", 0, &ops).unwrap();
        assert_eq!(doc.version, 1);
    }

    #[test]
    fn stale_base_version_conflicts_without_change() {
        let mut state = DocState::default();
        apply_ops_to_state(&mut state, "r1", 0, &[UiOp::UpsertNode { node: node("a") }])
            .unwrap();
        let before = state.clone();

        let (doc, conflict) =
            apply_ops_to_state(&mut state, "r1", 7, &[UiOp::UpsertNode { node: node("b") }])
                .unwrap();
        assert!(conflict);
        assert_eq!(doc.version, 1);
        assert_eq!(state.version, before.version);
        assert_eq!(state.nodes.len(), before.nodes.len());
    }

    #[test]
    fn invalid_op_leaves_state_untouched() {
        let mut state = DocState::default();
        apply_ops_to_state(&mut state, "r1", 0, &[UiOp::UpsertNode { node: node("a") }])
            .unwrap();

        let ops = vec![
            UiOp::UpsertNode { node: node("b") },
            UiOp::UpsertNode { node: node("   ") },
        ];
        assert!(apply_ops_to_state(&mut state, "r1", 0, &ops).is_err());
        assert_eq!(state.version, 1);
        assert!(!state.nodes.contains_key("b"));
    }

    #[test]
    fn upsert_trims_node_id() {
        let mut state = DocState::default();
        let op = UiOp::UpsertNode {
            node: node("  padded  "),
        };
        let (doc, _) = apply_ops_to_state(&mut state, "r1", 0, &[op]).unwrap();
        assert_eq!(doc.nodes[0].id, "padded");
    }

    #[test]
    fn clear_empties_the_map() {
        let mut state = DocState::default();
        apply_ops_to_state(&mut state, "r1", 0, &[UiOp::UpsertNode { node: node("a") }])
            .unwrap();
        let (doc, _) = apply_ops_to_state(&mut state, "r1", 0, &[UiOp::ClearNodes]).unwrap();
        assert!(doc.nodes.is_empty());
        assert_eq!(doc.version, 2);
    }

    #[test]
    fn content_hash_is_order_independent_of_insertion() {
        let mut s1 = DocState::default();
        let mut s2 = DocState::default();
        apply_ops_to_state(
            &mut s1,
            "r1",
            0,
            &[
                UiOp::UpsertNode { node: node("a") },
                UiOp::UpsertNode { node: node("b") },
            ],
        )
        .unwrap();
        apply_ops_to_state(
            &mut s2,
            "r1",
            0,
            &[
                UiOp::UpsertNode { node: node("b") },
                UiOp::UpsertNode { node: node("a") },
            ],
        )
        .unwrap();
        assert_eq!(
            s1.to_document("r1").content_hash(),
            s2.to_document("r1").content_hash()
        );
    }
}
