//! Gateway assembly
//!
//! The process-wide factory: builds every subsystem with its dependencies
//! injected, in leaf-first order, and tears them down in reverse at
//! shutdown. No component reaches for a global.

use crate::artifact::{ArtifactStore, FsArtifactStore};
use crate::cache::{CachedArtifactStore, CachedUiDocumentStore, CachedWorkspaceStore};
use crate::config::GatewayConfig;
use crate::error::GatewayResult;
use crate::interact::InteractionWaiter;
use crate::llm::{HttpLlmClient, LlmClient, StaticLlmClient};
use crate::project::{ProjectFileStore, RuntimeManager};
use crate::run::{RunExecutor, RunRegistry};
use crate::schedule::{direct_limiter, RateLimitBroker};
use crate::uidoc::{SledUiDocumentStore, UiDocumentService};
use crate::worker::WorkerResolver;
use crate::workspace::{SledWorkspaceStore, WorkspaceStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The assembled gateway component graph.
pub struct Gateway {
    /// Effective configuration
    pub config: GatewayConfig,
    /// Artifact store behind the cache facade
    pub artifacts: Arc<CachedArtifactStore>,
    /// Document service with conversation overlay
    pub documents: Arc<UiDocumentService>,
    /// Workspace store behind the cache facade
    pub workspaces: Arc<dyn WorkspaceStore>,
    /// Interaction waiter
    pub waiter: Arc<InteractionWaiter>,
    /// Run executor
    pub executor: Arc<RunExecutor>,
    db: sled::Db,
}

impl Gateway {
    /// Assemble the component graph from configuration and a pre-populated
    /// worker resolver.
    pub fn build(config: GatewayConfig, resolver: WorkerResolver) -> GatewayResult<Self> {
        config.validate()?;
        let cache_config = config.cache.normalized();

        let db = sled::open(&config.storage.database_path)?;

        // Artifact origin + facade.
        let origin: Arc<dyn ArtifactStore> =
            Arc::new(FsArtifactStore::new(config.storage.artifact_root.join("store"))?);
        let artifacts = Arc::new(CachedArtifactStore::new(origin, &cache_config));
        let artifacts_dyn: Arc<dyn ArtifactStore> = artifacts.clone();

        // UI documents: sled origin, cache facade, overlay service.
        let doc_origin = Arc::new(SledUiDocumentStore::new(&db)?);
        let doc_cache = Arc::new(CachedUiDocumentStore::new(doc_origin, cache_config.document));
        let documents = Arc::new(UiDocumentService::new(
            doc_cache,
            artifacts_dyn.clone(),
            config.interaction.conversation_path.clone(),
        ));

        // Workspaces: sled origin behind the cache facade.
        let ws_origin = Arc::new(SledWorkspaceStore::new(&db)?);
        let workspaces: Arc<dyn WorkspaceStore> = Arc::new(CachedWorkspaceStore::new(
            ws_origin,
            cache_config.workspace,
        ));

        let waiter = Arc::new(InteractionWaiter::new(
            artifacts_dyn.clone(),
            config.interaction.conversation_path.clone(),
        ));

        // Provider client: canned locally when no credential is configured.
        // Chunk reservations and individual provider calls share one
        // limiter, so pre-reserved work is never double-charged.
        let limiter = direct_limiter(config.llm.requests_per_second);
        let llm: Arc<dyn LlmClient> = if config.llm.api_key.is_empty() {
            Arc::new(StaticLlmClient::new(limiter.clone()))
        } else {
            Arc::new(HttpLlmClient::new(
                config.llm.base_url.clone(),
                config.llm.api_key.clone(),
                limiter.clone(),
            ))
        };
        let broker = Arc::new(RateLimitBroker::new(limiter));

        let runtimes = Arc::new(RuntimeManager::with_broker(
            &config,
            llm,
            Arc::new(resolver),
            broker,
        ));
        let projects = Arc::new(ProjectFileStore::new(&config.storage.project_file_path)?);

        let executor = Arc::new(RunExecutor::new(
            Arc::new(RunRegistry::new()),
            runtimes,
            waiter.clone(),
            documents.clone(),
            artifacts_dyn,
            workspaces.clone(),
            projects,
            Duration::from_secs(config.interaction.input_timeout_secs),
        ));

        info!(
            env = ?config.service.environment,
            port = config.server.port,
            "gateway assembled"
        );
        Ok(Self {
            config,
            artifacts,
            documents,
            workspaces,
            waiter,
            executor,
            db,
        })
    }

    /// REST application state over the assembled components
    #[cfg(feature = "http")]
    pub fn app_state(&self) -> Arc<crate::api::rest::AppState> {
        use crate::api::service::{
            DocumentService, InteractionService, RunService, WorkspaceService,
        };
        Arc::new(crate::api::rest::AppState {
            runs: RunService::new(self.executor.clone()),
            interactions: InteractionService::new(self.waiter.clone()),
            documents: DocumentService::new(self.documents.clone(), self.workspaces.clone()),
            workspaces: WorkspaceService::new(self.workspaces.clone()),
            artifact_cache: self.artifacts.clone(),
        })
    }

    /// Flush persistent state; called once on shutdown, reverse of build
    /// order (runs drain first at the server layer, then storage flushes).
    pub async fn shutdown(&self) -> GatewayResult<()> {
        self.db.flush_async().await?;
        info!("gateway shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.storage.artifact_root = dir.path().join("artifacts");
        config.storage.database_path = dir.path().join("gateway.db");
        config.storage.project_file_path = dir.path().join("projects.json");
        config.storage.strategy_cache_root = dir.path().join("strategy");
        config
    }

    #[tokio::test]
    async fn builds_and_shuts_down() {
        let dir = TempDir::new().unwrap();
        let gateway = Gateway::build(config(&dir), WorkerResolver::new()).unwrap();
        assert_eq!(gateway.artifacts.metrics().blob_hits, 0);
        gateway.shutdown().await.unwrap();
    }
}
