//! Wire-level run events
//!
//! Each run streams an ordered sequence of events to its subscribers.
//! `Complete` and `Error` are terminal: subscribers close after seeing
//! either. Two progress messages carry protocol meaning: the
//! `INPUT_REQUIRED:<interaction id>` prefix signals a blocked run, and the
//! literal `NODE_READY` announces a fresh UI node upsert.

use serde::{Deserialize, Serialize};

/// Progress message prefix announcing a blocked run
pub const INPUT_REQUIRED_PREFIX: &str = "INPUT_REQUIRED:";
/// Progress message announcing a fresh UI node upsert
pub const NODE_READY_MESSAGE: &str = "NODE_READY";

/// Kind of a run event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunEventType {
    /// Free-form log output
    Log,
    /// Progress marker
    Progress,
    /// Terminal failure
    Error,
    /// Terminal success
    Complete,
}

/// One event on a run's stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Event kind
    pub event_type: RunEventType,
    /// Event message
    pub message: String,
    /// Percent complete, 0..=100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    /// Client view payload on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_view: Option<serde_json::Value>,
}

impl RunEvent {
    /// A log event
    pub fn log(message: impl Into<String>) -> Self {
        Self {
            event_type: RunEventType::Log,
            message: message.into(),
            progress_percent: None,
            client_view: None,
        }
    }

    /// A progress event
    pub fn progress(message: impl Into<String>, percent: Option<u8>) -> Self {
        Self {
            event_type: RunEventType::Progress,
            message: message.into(),
            progress_percent: percent.map(|p| p.min(100)),
            client_view: None,
        }
    }

    /// A terminal error event
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            event_type: RunEventType::Error,
            message: message.into(),
            progress_percent: None,
            client_view: None,
        }
    }

    /// A terminal completion event carrying the client view
    pub fn complete(client_view: serde_json::Value) -> Self {
        Self {
            event_type: RunEventType::Complete,
            message: "complete".to_string(),
            progress_percent: Some(100),
            client_view: Some(client_view),
        }
    }

    /// The progress event announcing a blocked run
    pub fn input_required(interaction_id: &str) -> Self {
        Self::progress(format!("{}{}", INPUT_REQUIRED_PREFIX, interaction_id), None)
    }

    /// The progress event announcing a fresh UI node
    pub fn node_ready() -> Self {
        Self::progress(NODE_READY_MESSAGE, None)
    }

    /// Whether subscribers should close after this event
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event_type,
            RunEventType::Complete | RunEventType::Error
        )
    }
}
