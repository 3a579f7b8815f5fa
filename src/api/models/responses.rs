//! API response models

use crate::cache::StoreMetricsSnapshot;
use crate::interact::WaitState;
use crate::uidoc::{RestoreOutcome, UiDocument};
use crate::workspace::{Tab, Workspace};
use serde::Serialize;

/// Result of starting a run
#[derive(Debug, Clone, Serialize)]
pub struct StartRunResponse {
    /// Allocated run identifier
    pub run_id: String,
}

/// Result of sending user input
#[derive(Debug, Clone, Serialize)]
pub struct SendInputResponse {
    /// False when the run's interaction state was already closed
    pub accepted: bool,
}

/// A run's wait state
#[derive(Debug, Clone, Serialize)]
pub struct WaitResponse {
    /// Current state snapshot
    #[serde(flatten)]
    pub state: WaitState,
}

/// A document read
#[derive(Debug, Clone, Serialize)]
pub struct GetDocumentResponse {
    /// The current document
    pub document: UiDocument,
}

/// Result of an apply-ops batch. A conflict is a field, never an error.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOpsResponse {
    /// The resulting (or, on conflict, current) document
    pub document: UiDocument,
    /// True when the base version did not match
    pub conflict: bool,
}

/// Result of a restore resolution
#[derive(Debug, Clone, Serialize)]
pub struct RestoreResponse {
    /// Resolution details
    #[serde(flatten)]
    pub outcome: RestoreOutcome,
}

/// Active runs
#[derive(Debug, Clone, Serialize)]
pub struct ListRunsResponse {
    /// Registered run identifiers, sorted
    pub runs: Vec<String>,
}

/// A workspace with its tabs
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceResponse {
    /// The workspace record
    pub workspace: Workspace,
    /// Its tabs in stable order
    pub tabs: Vec<Tab>,
}

/// A single tab
#[derive(Debug, Clone, Serialize)]
pub struct TabResponse {
    /// The tab record
    pub tab: Tab,
}

/// Artifact cache counters
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    /// Facade hit/miss and origin counters
    pub artifact_store: StoreMetricsSnapshot,
}

/// Service liveness
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "ok" while the process serves traffic
    pub status: String,
    /// Crate version
    pub version: String,
    /// Number of registered runs
    pub active_runs: usize,
}
