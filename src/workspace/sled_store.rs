//! Sled-backed workspace store
//!
//! Workspaces and tabs live in three trees: workspace records, a
//! project-to-workspace index, and tab records keyed by
//! `<workspace_id>/<tab_id>`. Mutations for one workspace are serialized by
//! a per-workspace lock, so concurrent tab creation cannot collide on
//! order indexes.

use super::{sort_tabs, Tab, Workspace, WorkspaceStore};
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const WORKSPACE_TREE: &str = "workspaces";
const PROJECT_INDEX_TREE: &str = "workspaces_by_project";
const TAB_TREE: &str = "tabs";

/// Persistent workspace store on sled.
pub struct SledWorkspaceStore {
    workspaces: sled::Tree,
    by_project: sled::Tree,
    tabs: sled::Tree,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SledWorkspaceStore {
    /// Open the workspace trees inside an existing sled database
    pub fn new(db: &sled::Db) -> GatewayResult<Self> {
        Ok(Self {
            workspaces: db.open_tree(WORKSPACE_TREE)?,
            by_project: db.open_tree(PROJECT_INDEX_TREE)?,
            tabs: db.open_tree(TAB_TREE)?,
            locks: DashMap::new(),
        })
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn read_workspace(&self, workspace_id: &str) -> GatewayResult<Option<Workspace>> {
        match self.workspaces.get(workspace_id.as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            None => Ok(None),
        }
    }

    fn write_workspace(&self, workspace: &Workspace) -> GatewayResult<()> {
        self.workspaces.insert(
            workspace.workspace_id.as_bytes(),
            serde_json::to_vec(workspace)?,
        )?;
        Ok(())
    }

    fn tab_key(workspace_id: &str, tab_id: &str) -> String {
        format!("{}/{}", workspace_id, tab_id)
    }

    fn read_tabs(&self, workspace_id: &str) -> GatewayResult<Vec<Tab>> {
        let prefix = format!("{}/", workspace_id);
        let mut tabs = Vec::new();
        for item in self.tabs.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            if let Ok(tab) = serde_json::from_slice::<Tab>(&bytes) {
                tabs.push(tab);
            }
        }
        sort_tabs(&mut tabs);
        Ok(tabs)
    }

    fn write_tab(&self, tab: &Tab) -> GatewayResult<()> {
        self.tabs.insert(
            Self::tab_key(&tab.workspace_id, &tab.tab_id).as_bytes(),
            serde_json::to_vec(tab)?,
        )?;
        Ok(())
    }
}

#[async_trait]
impl WorkspaceStore for SledWorkspaceStore {
    async fn ensure_workspace(&self, project_id: &str, name: &str) -> GatewayResult<Workspace> {
        let project_id = project_id.trim();
        if project_id.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "project id must not be empty".to_string(),
            ));
        }
        let lock = self.lock_for(&format!("project:{}", project_id));
        let _guard = lock.lock().await;

        if let Some(bytes) = self.by_project.get(project_id.as_bytes())? {
            let ws_id = String::from_utf8_lossy(&bytes).to_string();
            if let Some(ws) = self.read_workspace(&ws_id)? {
                return Ok(ws);
            }
        }
        let workspace = Workspace {
            workspace_id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            active_tab_id: String::new(),
        };
        self.write_workspace(&workspace)?;
        self.by_project
            .insert(project_id.as_bytes(), workspace.workspace_id.as_bytes())?;
        Ok(workspace)
    }

    async fn get_workspace_by_project(
        &self,
        project_id: &str,
    ) -> GatewayResult<Option<Workspace>> {
        match self.by_project.get(project_id.trim().as_bytes())? {
            Some(bytes) => {
                let ws_id = String::from_utf8_lossy(&bytes).to_string();
                self.read_workspace(&ws_id)
            }
            None => Ok(None),
        }
    }

    async fn list_tabs(&self, workspace_id: &str) -> GatewayResult<Vec<Tab>> {
        self.read_tabs(workspace_id)
    }

    async fn get_tab(&self, workspace_id: &str, tab_id: &str) -> GatewayResult<Option<Tab>> {
        match self
            .tabs
            .get(Self::tab_key(workspace_id, tab_id).as_bytes())?
        {
            Some(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            None => Ok(None),
        }
    }

    async fn create_tab(
        &self,
        workspace_id: &str,
        title: &str,
        run_id: &str,
    ) -> GatewayResult<Tab> {
        let lock = self.lock_for(workspace_id);
        let _guard = lock.lock().await;

        let mut workspace = self
            .read_workspace(workspace_id)?
            .ok_or_else(|| GatewayError::NotFound(format!("workspace {}", workspace_id)))?;
        let existing = self.read_tabs(workspace_id)?;
        let tab = Tab {
            tab_id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.to_string(),
            title: title.to_string(),
            run_id: run_id.trim().to_string(),
            order_index: existing.len() as i32,
            is_pinned: false,
            created_at_unix_ms: Utc::now().timestamp_millis(),
        };
        self.write_tab(&tab)?;
        workspace.active_tab_id = tab.tab_id.clone();
        self.write_workspace(&workspace)?;
        Ok(tab)
    }

    async fn select_tab(&self, workspace_id: &str, tab_id: &str) -> GatewayResult<Workspace> {
        let lock = self.lock_for(workspace_id);
        let _guard = lock.lock().await;

        if self.get_tab(workspace_id, tab_id).await?.is_none() {
            return Err(GatewayError::NotFound(format!(
                "tab {} in workspace {}",
                tab_id, workspace_id
            )));
        }
        let mut workspace = self
            .read_workspace(workspace_id)?
            .ok_or_else(|| GatewayError::NotFound(format!("workspace {}", workspace_id)))?;
        workspace.active_tab_id = tab_id.to_string();
        self.write_workspace(&workspace)?;
        Ok(workspace)
    }

    async fn update_tab_run(
        &self,
        workspace_id: &str,
        tab_id: &str,
        run_id: &str,
    ) -> GatewayResult<Tab> {
        let lock = self.lock_for(workspace_id);
        let _guard = lock.lock().await;

        let mut tab = self
            .get_tab(workspace_id, tab_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("tab {}", tab_id)))?;
        tab.run_id = run_id.trim().to_string();
        self.write_tab(&tab)?;
        Ok(tab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> SledWorkspaceStore {
        let db = sled::open(dir.path()).unwrap();
        SledWorkspaceStore::new(&db).unwrap()
    }

    #[tokio::test]
    async fn workspace_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let ws_id = {
            let db = sled::open(dir.path()).unwrap();
            let store = SledWorkspaceStore::new(&db).unwrap();
            let ws = store.ensure_workspace("p1", "P1").await.unwrap();
            store.create_tab(&ws.workspace_id, "tab", "run-1").await.unwrap();
            ws.workspace_id
        };
        let store = store(&dir).await;
        let ws = store
            .get_workspace_by_project("p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ws.workspace_id, ws_id);
        let tabs = store.list_tabs(&ws_id).await.unwrap();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].run_id, "run-1");
    }

    #[tokio::test]
    async fn tabs_keep_stable_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let ws = store.ensure_workspace("p1", "P1").await.unwrap();
        for title in ["a", "b", "c"] {
            store.create_tab(&ws.workspace_id, title, "").await.unwrap();
        }
        let tabs = store.list_tabs(&ws.workspace_id).await.unwrap();
        let titles: Vec<&str> = tabs.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
        assert_eq!(
            tabs.iter().map(|t| t.order_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }
}
