//! UI document service
//!
//! Fronts a [`UiDocumentStore`] and, on read, overlays the run's persisted
//! conversation history onto a single chat node so a restored client sees
//! the dialogue without replaying the run.

use super::{UiDocument, UiDocumentStore, UiNode, UiOp};
use crate::artifact::ArtifactStore;
use crate::error::GatewayResult;
use crate::interact::ConversationSnapshot;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Well-known id of the node carrying the run's chat transcript
pub const CHAT_NODE_ID: &str = "llm-chat";
/// Node type of the chat transcript node
pub const CHAT_NODE_TYPE: &str = "llm_chat";

/// Document reads and writes with the conversation-history overlay.
pub struct UiDocumentService {
    store: Arc<dyn UiDocumentStore>,
    artifacts: Arc<dyn ArtifactStore>,
    conversation_path: String,
}

impl UiDocumentService {
    /// Create a service reading conversation snapshots from `artifacts` at
    /// the configured repo-relative path.
    pub fn new(
        store: Arc<dyn UiDocumentStore>,
        artifacts: Arc<dyn ArtifactStore>,
        conversation_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            artifacts,
            conversation_path: conversation_path.into(),
        }
    }

    /// Current document for a run with the conversation overlay applied.
    pub async fn get_document(&self, run_id: &str) -> GatewayResult<UiDocument> {
        let mut doc = self.store.get_document(run_id).await?;
        if let Some(snapshot) = self.load_conversation(run_id).await {
            overlay_conversation(&mut doc, &snapshot);
        }
        Ok(doc)
    }

    /// Apply one op batch; see [`UiDocumentStore::apply_ops`]
    pub async fn apply_ops(
        &self,
        run_id: &str,
        base_version: i64,
        ops: &[UiOp],
    ) -> GatewayResult<(UiDocument, bool)> {
        self.store.apply_ops(run_id, base_version, ops).await
    }

    /// Best-effort conversation fetch; any failure just skips the overlay.
    async fn load_conversation(&self, run_id: &str) -> Option<ConversationSnapshot> {
        match self.artifacts.get(run_id, &self.conversation_path).await {
            Ok(bytes) => ConversationSnapshot::from_bytes(&bytes),
            Err(err) => {
                if !err.is_not_found() {
                    debug!(run_id, error = %err, "conversation overlay unavailable");
                }
                None
            }
        }
    }
}

/// Merge the persisted dialogue onto the document's chat node, creating the
/// node if absent. The node is marked as neither responding nor locked; the
/// persisted history is by definition settled.
fn overlay_conversation(doc: &mut UiDocument, snapshot: &ConversationSnapshot) {
    if snapshot.messages.is_empty() {
        return;
    }
    let mut nodes: BTreeMap<String, UiNode> = doc
        .nodes
        .drain(..)
        .map(|n| (n.id.clone(), n))
        .collect();

    let mut chat = nodes
        .remove(CHAT_NODE_ID)
        .unwrap_or_else(|| UiNode::new(CHAT_NODE_ID, CHAT_NODE_TYPE));
    let messages: Vec<serde_json::Value> = snapshot
        .messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "seq": m.seq,
                "role": m.role,
                "content": m.content,
                "interaction_id": m.interaction_id,
                "created_at_unix_ms": m.created_at_unix_ms,
            })
        })
        .collect();
    chat.content = serde_json::json!({ "messages": messages });
    chat.responding = false;
    chat.locked = false;
    nodes.insert(chat.id.clone(), chat);

    doc.nodes = nodes.into_values().collect();
}
