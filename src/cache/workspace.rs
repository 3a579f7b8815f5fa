//! Workspace/tab cache facade
//!
//! Wraps any [`WorkspaceStore`] with five small caches: workspace by
//! project, workspace by id, tabs by workspace, tab by (workspace, tab),
//! and a tab-to-workspace reverse index. Mutating operations invalidate the
//! surrounding caches rather than patching them surgically; the origin is
//! authoritative for ordering and active-tab tracking.

use crate::cache::memory::MemoryCache;
use crate::config::CacheTuning;
use crate::error::GatewayResult;
use crate::workspace::{Tab, Workspace, WorkspaceStore};
use async_trait::async_trait;
use std::sync::Arc;

/// Caching facade over a workspace store.
pub struct CachedWorkspaceStore {
    origin: Arc<dyn WorkspaceStore>,
    ws_by_project: MemoryCache<String, Workspace>,
    ws_by_id: MemoryCache<String, Workspace>,
    tabs_by_ws: MemoryCache<String, Vec<Tab>>,
    tab_by_key: MemoryCache<String, Tab>,
    ws_by_tab: MemoryCache<String, String>,
}

impl CachedWorkspaceStore {
    /// Wrap `origin` with caches tuned by `tuning`.
    pub fn new(origin: Arc<dyn WorkspaceStore>, tuning: CacheTuning) -> Self {
        Self {
            origin,
            ws_by_project: MemoryCache::with_tuning(tuning),
            ws_by_id: MemoryCache::with_tuning(tuning),
            tabs_by_ws: MemoryCache::with_tuning(tuning),
            tab_by_key: MemoryCache::with_tuning(tuning),
            ws_by_tab: MemoryCache::with_tuning(tuning),
        }
    }

    fn tab_key(workspace_id: &str, tab_id: &str) -> String {
        format!("{}/{}", workspace_id, tab_id)
    }

    fn remember_workspace(&self, workspace: &Workspace) {
        self.ws_by_project
            .set(workspace.project_id.clone(), workspace.clone(), 1);
        self.ws_by_id
            .set(workspace.workspace_id.clone(), workspace.clone(), 1);
    }

    /// Drop every cache entry touching `workspace_id`, including the
    /// project-keyed entry when it is still known.
    fn invalidate_workspace(&self, workspace_id: &str) {
        if let Some(ws) = self.ws_by_id.get(&workspace_id.to_string()) {
            self.ws_by_project.delete(&ws.project_id);
        }
        self.ws_by_id.delete(&workspace_id.to_string());
        self.tabs_by_ws.delete(&workspace_id.to_string());
    }

    fn invalidate_tab(&self, workspace_id: &str, tab_id: &str) {
        self.tab_by_key.delete(&Self::tab_key(workspace_id, tab_id));
        self.ws_by_tab.delete(&tab_id.to_string());
        self.tabs_by_ws.delete(&workspace_id.to_string());
    }

    /// Resolve a tab's owning workspace from the reverse index
    pub fn workspace_for_tab(&self, tab_id: &str) -> Option<String> {
        self.ws_by_tab.get(&tab_id.to_string())
    }
}

#[async_trait]
impl WorkspaceStore for CachedWorkspaceStore {
    async fn ensure_workspace(&self, project_id: &str, name: &str) -> GatewayResult<Workspace> {
        if let Some(ws) = self.ws_by_project.get(&project_id.trim().to_string()) {
            return Ok(ws);
        }
        let ws = self.origin.ensure_workspace(project_id, name).await?;
        self.remember_workspace(&ws);
        Ok(ws)
    }

    async fn get_workspace_by_project(
        &self,
        project_id: &str,
    ) -> GatewayResult<Option<Workspace>> {
        let key = project_id.trim().to_string();
        if let Some(ws) = self.ws_by_project.get(&key) {
            return Ok(Some(ws));
        }
        let ws = self.origin.get_workspace_by_project(project_id).await?;
        if let Some(ws) = &ws {
            self.remember_workspace(ws);
        }
        Ok(ws)
    }

    async fn list_tabs(&self, workspace_id: &str) -> GatewayResult<Vec<Tab>> {
        let key = workspace_id.to_string();
        if let Some(tabs) = self.tabs_by_ws.get(&key) {
            return Ok(tabs);
        }
        let tabs = self.origin.list_tabs(workspace_id).await?;
        self.tabs_by_ws.set(key, tabs.clone(), tabs.len() as i64);
        for tab in &tabs {
            self.tab_by_key
                .set(Self::tab_key(workspace_id, &tab.tab_id), tab.clone(), 1);
            self.ws_by_tab
                .set(tab.tab_id.clone(), workspace_id.to_string(), 1);
        }
        Ok(tabs)
    }

    async fn get_tab(&self, workspace_id: &str, tab_id: &str) -> GatewayResult<Option<Tab>> {
        let key = Self::tab_key(workspace_id, tab_id);
        if let Some(tab) = self.tab_by_key.get(&key) {
            return Ok(Some(tab));
        }
        let tab = self.origin.get_tab(workspace_id, tab_id).await?;
        if let Some(tab) = &tab {
            self.tab_by_key.set(key, tab.clone(), 1);
            self.ws_by_tab
                .set(tab.tab_id.clone(), workspace_id.to_string(), 1);
        }
        Ok(tab)
    }

    async fn create_tab(
        &self,
        workspace_id: &str,
        title: &str,
        run_id: &str,
    ) -> GatewayResult<Tab> {
        let tab = self.origin.create_tab(workspace_id, title, run_id).await?;
        // Creation changes tab ordering and the active tab.
        self.invalidate_workspace(workspace_id);
        self.invalidate_tab(workspace_id, &tab.tab_id);
        Ok(tab)
    }

    async fn select_tab(&self, workspace_id: &str, tab_id: &str) -> GatewayResult<Workspace> {
        let ws = self.origin.select_tab(workspace_id, tab_id).await?;
        self.invalidate_workspace(workspace_id);
        self.remember_workspace(&ws);
        Ok(ws)
    }

    async fn update_tab_run(
        &self,
        workspace_id: &str,
        tab_id: &str,
        run_id: &str,
    ) -> GatewayResult<Tab> {
        let tab = self.origin.update_tab_run(workspace_id, tab_id, run_id).await?;
        self.invalidate_tab(workspace_id, tab_id);
        Ok(tab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::workspace::InMemoryWorkspaceStore;

    fn facade() -> CachedWorkspaceStore {
        CachedWorkspaceStore::new(
            Arc::new(InMemoryWorkspaceStore::new()),
            CacheConfig::workspace_defaults(),
        )
    }

    #[tokio::test]
    async fn create_tab_invalidates_listing() {
        let store = facade();
        let ws = store.ensure_workspace("p1", "P1").await.unwrap();
        assert!(store.list_tabs(&ws.workspace_id).await.unwrap().is_empty());

        store.create_tab(&ws.workspace_id, "one", "").await.unwrap();
        let tabs = store.list_tabs(&ws.workspace_id).await.unwrap();
        assert_eq!(tabs.len(), 1);
    }

    #[tokio::test]
    async fn select_tab_refreshes_active_tab() {
        let store = facade();
        let ws = store.ensure_workspace("p1", "P1").await.unwrap();
        let t1 = store.create_tab(&ws.workspace_id, "one", "").await.unwrap();
        let _t2 = store.create_tab(&ws.workspace_id, "two", "").await.unwrap();

        store.select_tab(&ws.workspace_id, &t1.tab_id).await.unwrap();
        let ws = store
            .get_workspace_by_project("p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ws.active_tab_id, t1.tab_id);
    }

    #[tokio::test]
    async fn update_tab_run_visible_after_invalidation() {
        let store = facade();
        let ws = store.ensure_workspace("p1", "P1").await.unwrap();
        let tab = store.create_tab(&ws.workspace_id, "one", "").await.unwrap();
        // Warm the per-tab cache.
        assert!(store
            .get_tab(&ws.workspace_id, &tab.tab_id)
            .await
            .unwrap()
            .is_some());

        store
            .update_tab_run(&ws.workspace_id, &tab.tab_id, "run-3")
            .await
            .unwrap();
        let tab = store
            .get_tab(&ws.workspace_id, &tab.tab_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tab.run_id, "run-3");
    }

    #[tokio::test]
    async fn reverse_index_tracks_tab_owner() {
        let store = facade();
        let ws = store.ensure_workspace("p1", "P1").await.unwrap();
        let tab = store.create_tab(&ws.workspace_id, "one", "").await.unwrap();
        store
            .get_tab(&ws.workspace_id, &tab.tab_id)
            .await
            .unwrap();
        assert_eq!(
            store.workspace_for_tab(&tab.tab_id),
            Some(ws.workspace_id.clone())
        );
    }
}
