//! Conversation history
//!
//! The waiter keeps an ordered per-run conversation log and persists it as
//! one JSON document per run at `<run_id>/<configured path>` through the
//! artifact store. Inputs are stored in trimmed form.

use serde::{Deserialize, Serialize};

/// Who authored a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human participant
    User,
    /// Worker-produced message
    Assistant,
}

/// One ordered conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Position within the run's conversation, starting at 0
    pub seq: u64,
    /// Message author
    pub role: Role,
    /// Message body
    pub content: String,
    /// Interaction the message belongs to
    pub interaction_id: String,
    /// Creation time, unix milliseconds
    pub created_at_unix_ms: i64,
}

/// The persisted conversation document for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Owning run
    pub run_id: String,
    /// Messages in seq order
    pub messages: Vec<ConversationMessage>,
}

impl ConversationSnapshot {
    /// Decode a persisted snapshot
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Encode for persistence
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}
