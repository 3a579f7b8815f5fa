//! Workspaces and tabs
//!
//! A workspace is the per-project container of tabs; each tab may reference
//! the run whose UI document it renders. At most one workspace exists per
//! project, a workspace's active tab (when set) must reference one of its
//! own tabs, and tab order is stable by (order_index asc, created_at asc).

mod memory;
mod sled_store;

pub use memory::InMemoryWorkspaceStore;
pub use sled_store::SledWorkspaceStore;

use crate::error::GatewayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-project container of tabs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique workspace identifier
    pub workspace_id: String,
    /// Owning project; unique across workspaces
    pub project_id: String,
    /// Display name
    pub name: String,
    /// Currently selected tab; empty when none
    pub active_tab_id: String,
}

/// One tab within a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    /// Unique tab identifier
    pub tab_id: String,
    /// Owning workspace
    pub workspace_id: String,
    /// Display title
    pub title: String,
    /// Run whose document this tab renders; empty when unbound
    pub run_id: String,
    /// Position among siblings
    pub order_index: i32,
    /// Whether the tab resists automatic eviction in the client
    pub is_pinned: bool,
    /// Creation time, unix milliseconds; tie-breaker for ordering
    pub created_at_unix_ms: i64,
}

/// Sort tabs by (order_index asc, created_at asc) in place.
pub(crate) fn sort_tabs(tabs: &mut [Tab]) {
    tabs.sort_by(|a, b| {
        a.order_index
            .cmp(&b.order_index)
            .then(a.created_at_unix_ms.cmp(&b.created_at_unix_ms))
    });
}

/// Workspace and tab storage.
///
/// All mutating operations return the stored record so callers observe the
/// origin's authoritative ordering and active-tab tracking.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Fetch the project's workspace, creating it (with `name`) if absent
    async fn ensure_workspace(&self, project_id: &str, name: &str) -> GatewayResult<Workspace>;

    /// Fetch the project's workspace; `None` when the project has none
    async fn get_workspace_by_project(&self, project_id: &str)
        -> GatewayResult<Option<Workspace>>;

    /// List a workspace's tabs in stable order
    async fn list_tabs(&self, workspace_id: &str) -> GatewayResult<Vec<Tab>>;

    /// Fetch one tab
    async fn get_tab(&self, workspace_id: &str, tab_id: &str) -> GatewayResult<Option<Tab>>;

    /// Create a tab at the end of the workspace's order and make it active
    async fn create_tab(&self, workspace_id: &str, title: &str, run_id: &str)
        -> GatewayResult<Tab>;

    /// Make an existing tab the workspace's active tab
    async fn select_tab(&self, workspace_id: &str, tab_id: &str) -> GatewayResult<Workspace>;

    /// Bind a tab to a run
    async fn update_tab_run(
        &self,
        workspace_id: &str,
        tab_id: &str,
        run_id: &str,
    ) -> GatewayResult<Tab>;
}
