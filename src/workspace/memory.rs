//! In-memory workspace store

use super::{sort_tabs, Tab, Workspace, WorkspaceStore};
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    by_project: HashMap<String, String>,
    workspaces: HashMap<String, Workspace>,
    tabs: HashMap<String, Vec<Tab>>,
}

/// Map-backed workspace store. A single mutex serializes all mutations,
/// which also serializes concurrent tab creation and keeps order indexes
/// collision-free.
#[derive(Default)]
pub struct InMemoryWorkspaceStore {
    inner: Mutex<Inner>,
}

impl InMemoryWorkspaceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkspaceStore for InMemoryWorkspaceStore {
    async fn ensure_workspace(&self, project_id: &str, name: &str) -> GatewayResult<Workspace> {
        let project_id = project_id.trim();
        if project_id.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "project id must not be empty".to_string(),
            ));
        }
        let mut inner = self.inner.lock();
        if let Some(ws_id) = inner.by_project.get(project_id) {
            let ws_id = ws_id.clone();
            if let Some(ws) = inner.workspaces.get(&ws_id) {
                return Ok(ws.clone());
            }
        }
        let workspace = Workspace {
            workspace_id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            active_tab_id: String::new(),
        };
        inner
            .by_project
            .insert(project_id.to_string(), workspace.workspace_id.clone());
        inner
            .workspaces
            .insert(workspace.workspace_id.clone(), workspace.clone());
        Ok(workspace)
    }

    async fn get_workspace_by_project(
        &self,
        project_id: &str,
    ) -> GatewayResult<Option<Workspace>> {
        let inner = self.inner.lock();
        Ok(inner
            .by_project
            .get(project_id.trim())
            .and_then(|ws_id| inner.workspaces.get(ws_id))
            .cloned())
    }

    async fn list_tabs(&self, workspace_id: &str) -> GatewayResult<Vec<Tab>> {
        let inner = self.inner.lock();
        let mut tabs = inner.tabs.get(workspace_id).cloned().unwrap_or_default();
        sort_tabs(&mut tabs);
        Ok(tabs)
    }

    async fn get_tab(&self, workspace_id: &str, tab_id: &str) -> GatewayResult<Option<Tab>> {
        let inner = self.inner.lock();
        Ok(inner
            .tabs
            .get(workspace_id)
            .and_then(|tabs| tabs.iter().find(|t| t.tab_id == tab_id))
            .cloned())
    }

    async fn create_tab(
        &self,
        workspace_id: &str,
        title: &str,
        run_id: &str,
    ) -> GatewayResult<Tab> {
        let mut inner = self.inner.lock();
        if !inner.workspaces.contains_key(workspace_id) {
            return Err(GatewayError::NotFound(format!(
                "workspace {}",
                workspace_id
            )));
        }
        let tabs = inner.tabs.entry(workspace_id.to_string()).or_default();
        let tab = Tab {
            tab_id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.to_string(),
            title: title.to_string(),
            run_id: run_id.trim().to_string(),
            order_index: tabs.len() as i32,
            is_pinned: false,
            created_at_unix_ms: Utc::now().timestamp_millis(),
        };
        tabs.push(tab.clone());
        if let Some(ws) = inner.workspaces.get_mut(workspace_id) {
            ws.active_tab_id = tab.tab_id.clone();
        }
        Ok(tab)
    }

    async fn select_tab(&self, workspace_id: &str, tab_id: &str) -> GatewayResult<Workspace> {
        let mut inner = self.inner.lock();
        let owns_tab = inner
            .tabs
            .get(workspace_id)
            .map(|tabs| tabs.iter().any(|t| t.tab_id == tab_id))
            .unwrap_or(false);
        if !owns_tab {
            return Err(GatewayError::NotFound(format!(
                "tab {} in workspace {}",
                tab_id, workspace_id
            )));
        }
        let ws = inner
            .workspaces
            .get_mut(workspace_id)
            .ok_or_else(|| GatewayError::NotFound(format!("workspace {}", workspace_id)))?;
        ws.active_tab_id = tab_id.to_string();
        Ok(ws.clone())
    }

    async fn update_tab_run(
        &self,
        workspace_id: &str,
        tab_id: &str,
        run_id: &str,
    ) -> GatewayResult<Tab> {
        let mut inner = self.inner.lock();
        let tabs = inner
            .tabs
            .get_mut(workspace_id)
            .ok_or_else(|| GatewayError::NotFound(format!("workspace {}", workspace_id)))?;
        let tab = tabs
            .iter_mut()
            .find(|t| t.tab_id == tab_id)
            .ok_or_else(|| GatewayError::NotFound(format!("tab {}", tab_id)))?;
        tab.run_id = run_id.trim().to_string();
        Ok(tab.clone())
    }
}
