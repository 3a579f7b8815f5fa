//! API request models

use crate::uidoc::UiOp;
use serde::Deserialize;

/// Start a worker run
#[derive(Debug, Clone, Deserialize)]
pub struct StartRunRequest {
    /// Owning project
    pub project_id: String,
    /// Worker to execute
    pub worker_id: String,
    /// Caller parameters forwarded to the worker
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Send user input to a blocked run
#[derive(Debug, Clone, Deserialize)]
pub struct SendInputRequest {
    /// Target run
    pub run_id: String,
    /// User input
    pub input: String,
    /// Interaction the input answers, when known
    #[serde(default)]
    pub interaction_id: Option<String>,
}

/// Query (and optionally await a change of) a run's wait state
#[derive(Debug, Clone, Deserialize)]
pub struct WaitRequest {
    /// Target run
    pub run_id: String,
    /// How long to block for a state change; 0 returns immediately
    #[serde(default)]
    pub timeout_ms: i64,
}

/// Apply a UI op batch under optimistic concurrency
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyOpsRequest {
    /// Target run
    pub run_id: String,
    /// Version the client based its ops on; 0 skips the check
    #[serde(default)]
    pub base_version: i64,
    /// Ops in application order
    pub ops: Vec<UiOp>,
}

/// Resolve the document to restore for a project
#[derive(Debug, Clone, Deserialize)]
pub struct RestoreRequest {
    /// Target project
    pub project_id: String,
    /// Preferred tab, when the client remembers one
    #[serde(default)]
    pub tab_id: Option<String>,
}

/// Create a tab in a workspace
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTabRequest {
    /// Owning workspace
    pub workspace_id: String,
    /// Tab title
    pub title: String,
    /// Run to bind, when known
    #[serde(default)]
    pub run_id: String,
}

/// Make a tab the workspace's active tab
#[derive(Debug, Clone, Deserialize)]
pub struct SelectTabRequest {
    /// Owning workspace
    pub workspace_id: String,
    /// Tab to select
    pub tab_id: String,
}

/// Bind a tab to a run
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTabRunRequest {
    /// Owning workspace
    pub workspace_id: String,
    /// Tab to update
    pub tab_id: String,
    /// Run to bind
    pub run_id: String,
}
