//! Restore-from-tab resolution
//!
//! Given a project and an optional preferred tab, resolve the tab whose run
//! document the client should render after a reload, and return that
//! document with a deterministic content hash for client-side verification.

use super::engine::UiDocumentService;
use super::UiDocument;
use crate::workspace::WorkspaceStore;
use serde::Serialize;
use tracing::warn;

/// Why the restore resolved the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestoreReason {
    /// A tab with a run was found and its document returned
    Resolved,
    /// The workspace has no tabs
    NoTab,
    /// The resolved tab has no run bound to it
    NoRun,
    /// A store operation failed
    Error,
}

/// Result of a restore resolution
#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    /// Resolution reason code
    pub reason: RestoreReason,
    /// The project's workspace, when one could be ensured
    pub workspace_id: Option<String>,
    /// The resolved tab
    pub tab_id: Option<String>,
    /// The resolved run
    pub run_id: Option<String>,
    /// The run's document, overlay applied
    pub document: Option<UiDocument>,
    /// SHA-256 over the document's canonical node encoding
    pub content_hash: Option<String>,
    /// Human-readable detail for [`RestoreReason::Error`]
    pub message: Option<String>,
}

impl RestoreOutcome {
    fn error(workspace_id: Option<String>, message: String) -> Self {
        Self {
            reason: RestoreReason::Error,
            workspace_id,
            tab_id: None,
            run_id: None,
            document: None,
            content_hash: None,
            message: Some(message),
        }
    }
}

impl UiDocumentService {
    /// Resolve the document to restore for a project.
    ///
    /// Ensures the workspace exists, picks the preferred tab when it belongs
    /// to the workspace, otherwise the active tab, otherwise the first tab
    /// in stable order.
    pub async fn restore(
        &self,
        workspaces: &dyn WorkspaceStore,
        project_id: &str,
        preferred_tab_id: Option<&str>,
    ) -> RestoreOutcome {
        let workspace = match workspaces.ensure_workspace(project_id, project_id).await {
            Ok(ws) => ws,
            Err(err) => {
                warn!(project_id, error = %err, "restore failed to ensure workspace");
                return RestoreOutcome::error(None, err.to_string());
            }
        };

        let tabs = match workspaces.list_tabs(&workspace.workspace_id).await {
            Ok(tabs) => tabs,
            Err(err) => {
                warn!(project_id, error = %err, "restore failed to list tabs");
                return RestoreOutcome::error(Some(workspace.workspace_id), err.to_string());
            }
        };

        let preferred = preferred_tab_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .and_then(|id| tabs.iter().find(|t| t.tab_id == id));
        let active = tabs.iter().find(|t| t.tab_id == workspace.active_tab_id);
        let tab = match preferred.or(active).or_else(|| tabs.first()) {
            Some(tab) => tab.clone(),
            None => {
                return RestoreOutcome {
                    reason: RestoreReason::NoTab,
                    workspace_id: Some(workspace.workspace_id),
                    tab_id: None,
                    run_id: None,
                    document: None,
                    content_hash: None,
                    message: None,
                }
            }
        };

        if tab.run_id.is_empty() {
            return RestoreOutcome {
                reason: RestoreReason::NoRun,
                workspace_id: Some(workspace.workspace_id),
                tab_id: Some(tab.tab_id),
                run_id: None,
                document: None,
                content_hash: None,
                message: None,
            };
        }

        match self.get_document(&tab.run_id).await {
            Ok(document) => {
                let content_hash = document.content_hash();
                RestoreOutcome {
                    reason: RestoreReason::Resolved,
                    workspace_id: Some(workspace.workspace_id),
                    tab_id: Some(tab.tab_id),
                    run_id: Some(tab.run_id),
                    content_hash: Some(content_hash),
                    document: Some(document),
                    message: None,
                }
            }
            Err(err) => {
                warn!(run_id = %tab.run_id, error = %err, "restore failed to load document");
                RestoreOutcome::error(Some(workspace.workspace_id), err.to_string())
            }
        }
    }
}
