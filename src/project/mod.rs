//! Project runtimes
//!
//! A project runtime bundles everything a run needs: the LLM client, the
//! model registry, the worker resolver, safe filesystem roots, the
//! artifact output directory, and the strategy cache. Runtimes are built
//! lazily per project and reused.

mod store;

pub use store::{ArtifactMeta, ProjectFileStore, ProjectRecord};

use crate::config::{GatewayConfig, SchedulerConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::llm::{LlmClient, ModelRegistry};
use crate::schedule::{direct_limiter, PermitBroker, RateLimitBroker};
use crate::worker::{StrategyCache, WorkerResolver};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Everything a run needs from its project
pub struct ProjectRuntime {
    /// Owning project
    pub project_id: String,
    /// Provider client
    pub llm: Arc<dyn LlmClient>,
    /// Tier-to-model mapping
    pub models: ModelRegistry,
    /// Worker lookup
    pub resolver: Arc<WorkerResolver>,
    /// Directories workers may touch
    pub safe_roots: Vec<PathBuf>,
    /// Where workers drop artifacts for the post-run sync
    pub output_dir: PathBuf,
    /// Fingerprint cache for worker outputs
    pub strategy: Arc<StrategyCache>,
    /// Quota broker consulted per scheduled chunk
    pub broker: Arc<dyn PermitBroker>,
    /// Chunking and dispatch bounds for dependency scheduling
    pub scheduler: SchedulerConfig,
}

/// Lazily builds and retains one [`ProjectRuntime`] per project.
pub struct RuntimeManager {
    llm: Arc<dyn LlmClient>,
    resolver: Arc<WorkerResolver>,
    broker: Arc<dyn PermitBroker>,
    scheduler: SchedulerConfig,
    output_root: PathBuf,
    strategy_root: PathBuf,
    default_tier: String,
    runtimes: DashMap<String, Arc<ProjectRuntime>>,
}

impl RuntimeManager {
    /// Create a manager with a standalone token-bucket broker derived from
    /// the configured provider rate. Use [`RuntimeManager::with_broker`] to
    /// share the provider client's limiter instead.
    pub fn new(
        config: &GatewayConfig,
        llm: Arc<dyn LlmClient>,
        resolver: Arc<WorkerResolver>,
    ) -> Self {
        let broker: Arc<dyn PermitBroker> = Arc::new(RateLimitBroker::new(direct_limiter(
            config.llm.requests_per_second,
        )));
        Self::with_broker(config, llm, resolver, broker)
    }

    /// Create a manager with an explicit quota broker
    pub fn with_broker(
        config: &GatewayConfig,
        llm: Arc<dyn LlmClient>,
        resolver: Arc<WorkerResolver>,
        broker: Arc<dyn PermitBroker>,
    ) -> Self {
        Self {
            llm,
            resolver,
            broker,
            scheduler: config.scheduler.clone(),
            output_root: config.storage.artifact_root.join("outputs"),
            strategy_root: config.storage.strategy_cache_root.clone(),
            default_tier: config.llm.tier.clone(),
            runtimes: DashMap::new(),
        }
    }

    /// Fetch the project's runtime, building it on first reference.
    pub fn ensure(&self, project_id: &str) -> GatewayResult<Arc<ProjectRuntime>> {
        let project_id = project_id.trim();
        if project_id.is_empty() || project_id.contains('/') || project_id.contains("..") {
            return Err(GatewayError::InvalidArgument(format!(
                "invalid project id: {:?}",
                project_id
            )));
        }
        if let Some(runtime) = self.runtimes.get(project_id) {
            return Ok(runtime.clone());
        }

        let output_dir = self.output_root.join(project_id);
        std::fs::create_dir_all(&output_dir)?;
        let strategy = Arc::new(StrategyCache::open(self.strategy_root.join(project_id))?);

        let runtime = Arc::new(ProjectRuntime {
            project_id: project_id.to_string(),
            llm: self.llm.clone(),
            models: ModelRegistry::new(self.default_tier.clone()),
            resolver: self.resolver.clone(),
            safe_roots: vec![output_dir.clone()],
            output_dir,
            strategy,
            broker: self.broker.clone(),
            scheduler: self.scheduler.clone(),
        });
        info!(project_id, "project runtime built");
        self.runtimes
            .insert(project_id.to_string(), runtime.clone());
        Ok(runtime)
    }
}
