//! Workspace service
//!
//! Service layer for workspace and tab management.

use crate::api::models::{
    requests::{CreateTabRequest, SelectTabRequest, UpdateTabRunRequest},
    responses::{TabResponse, WorkspaceResponse},
    ApiError, ApiResult,
};
use crate::workspace::WorkspaceStore;
use std::sync::Arc;

/// Workspace and tab operations
pub struct WorkspaceService {
    workspaces: Arc<dyn WorkspaceStore>,
}

impl WorkspaceService {
    /// Create a workspace service
    pub fn new(workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self { workspaces }
    }

    /// Fetch (creating if needed) a project's workspace with its tabs
    pub async fn ensure_workspace(&self, project_id: &str) -> ApiResult<WorkspaceResponse> {
        let project_id = project_id.trim();
        if project_id.is_empty() {
            return Err(ApiError::new(
                "INVALID_ARGUMENT",
                "project_id must not be empty",
            ));
        }
        let workspace = self
            .workspaces
            .ensure_workspace(project_id, project_id)
            .await
            .map_err(ApiError::from)?;
        let tabs = self
            .workspaces
            .list_tabs(&workspace.workspace_id)
            .await
            .map_err(ApiError::from)?;
        Ok(WorkspaceResponse { workspace, tabs })
    }

    /// Create a tab
    pub async fn create_tab(&self, request: CreateTabRequest) -> ApiResult<TabResponse> {
        let tab = self
            .workspaces
            .create_tab(&request.workspace_id, &request.title, &request.run_id)
            .await
            .map_err(ApiError::from)?;
        Ok(TabResponse { tab })
    }

    /// Select a workspace's active tab
    pub async fn select_tab(&self, request: SelectTabRequest) -> ApiResult<WorkspaceResponse> {
        let workspace = self
            .workspaces
            .select_tab(&request.workspace_id, &request.tab_id)
            .await
            .map_err(ApiError::from)?;
        let tabs = self
            .workspaces
            .list_tabs(&workspace.workspace_id)
            .await
            .map_err(ApiError::from)?;
        Ok(WorkspaceResponse { workspace, tabs })
    }

    /// Bind a tab to a run
    pub async fn update_tab_run(&self, request: UpdateTabRunRequest) -> ApiResult<TabResponse> {
        let tab = self
            .workspaces
            .update_tab_run(&request.workspace_id, &request.tab_id, &request.run_id)
            .await
            .map_err(ApiError::from)?;
        Ok(TabResponse { tab })
    }
}
