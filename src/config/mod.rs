//! Configuration management
//!
//! Provides configuration defaults, validation, and environment-based overrides.
//! The binary reads the process environment once at startup; none of the values
//! here alter component contracts, only tuning and wiring.

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    /// Local development
    Local,
    /// Staging
    Stage,
    /// Production
    Prod,
}

impl AppEnv {
    /// Parse from the `APP_ENV` variable
    pub fn parse(s: &str) -> GatewayResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "" => Ok(AppEnv::Local),
            "stage" => Ok(AppEnv::Stage),
            "prod" => Ok(AppEnv::Prod),
            other => Err(GatewayError::Config(format!(
                "Unknown APP_ENV value: {}",
                other
            ))),
        }
    }
}

impl Default for AppEnv {
    fn default() -> Self {
        AppEnv::Local
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    /// Service identity
    pub service: ServiceConfig,
    /// HTTP server
    pub server: ServerConfig,
    /// Cache tuning
    pub cache: CacheConfig,
    /// Storage paths
    pub storage: StorageConfig,
    /// Interaction handoff
    pub interaction: InteractionConfig,
    /// LLM provider
    pub llm: LlmConfig,
    /// DAG scheduler
    pub scheduler: SchedulerConfig,
}

impl GatewayConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> GatewayResult<Self> {
        let mut config = GatewayConfig::default();

        if let Ok(val) = std::env::var("APP_ENV") {
            config.service.environment = AppEnv::parse(&val)?;
        }
        if let Ok(val) = std::env::var("PORT") {
            config.server.port = val
                .parse()
                .map_err(|_| GatewayError::Config(format!("Invalid PORT value: {}", val)))?;
        }
        if let Ok(val) = std::env::var("LOOM_ARTIFACT_ROOT") {
            config.storage.artifact_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("LOOM_DATABASE_PATH") {
            config.storage.database_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("LOOM_PROJECT_FILE") {
            config.storage.project_file_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("LOOM_CONVERSATION_PATH") {
            config.interaction.conversation_path = val;
        }
        if let Ok(val) = std::env::var("LOOM_LLM_BASE_URL") {
            config.llm.base_url = val;
        }
        if let Ok(val) = std::env::var("LOOM_LLM_API_KEY") {
            config.llm.api_key = val;
        }
        if let Ok(val) = std::env::var("LOOM_LLM_TIER") {
            config.llm.tier = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the whole configuration tree
    pub fn validate(&self) -> GatewayResult<()> {
        self.service.validate()?;
        self.server.validate()?;
        self.interaction.validate()?;
        self.llm.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }
}

/// Service identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
    /// Deployment environment
    pub environment: AppEnv,
}

impl ServiceConfig {
    /// Validate service configuration
    pub fn validate(&self) -> GatewayResult<()> {
        if self.name.is_empty() {
            return Err(GatewayError::Config(
                "Service name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loom-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: AppEnv::Local,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> GatewayResult<()> {
        if self.port == 0 {
            return Err(GatewayError::Config("Port cannot be 0".to_string()));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Tuning for one cache instance. Non-positive values fall back to defaults
/// via [`CacheTuning::or_defaults`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheTuning {
    /// Per-entry time to live in milliseconds
    pub ttl_ms: i64,
    /// Maximum number of entries
    pub max_entries: i64,
    /// Maximum total bytes; 0 disables the byte bound
    pub max_bytes: i64,
}

impl CacheTuning {
    /// Replace any non-positive field with the supplied defaults. `max_bytes`
    /// keeps 0 as a valid "unbounded" setting but coerces negatives to the
    /// default.
    pub fn or_defaults(self, defaults: CacheTuning) -> CacheTuning {
        CacheTuning {
            ttl_ms: if self.ttl_ms > 0 {
                self.ttl_ms
            } else {
                defaults.ttl_ms
            },
            max_entries: if self.max_entries > 0 {
                self.max_entries
            } else {
                defaults.max_entries
            },
            max_bytes: if self.max_bytes >= 0 {
                self.max_bytes
            } else {
                defaults.max_bytes
            },
        }
    }

    /// TTL as a [`Duration`]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.max(0) as u64)
    }
}

/// Cache tuning for every cache the gateway carries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Artifact byte payloads
    pub blob: CacheTuning,
    /// Per-run artifact listings
    pub list: CacheTuning,
    /// Artifact URLs
    pub url: CacheTuning,
    /// UI documents
    pub document: CacheTuning,
    /// Workspaces and tabs
    pub workspace: CacheTuning,
}

impl CacheConfig {
    /// Default tuning for the blob cache: 5 min TTL, 1024 entries, 64 MiB
    pub fn blob_defaults() -> CacheTuning {
        CacheTuning {
            ttl_ms: 5 * 60 * 1000,
            max_entries: 1024,
            max_bytes: 64 * 1024 * 1024,
        }
    }

    /// Default tuning for the listing cache: 30 s TTL, 512 entries
    pub fn list_defaults() -> CacheTuning {
        CacheTuning {
            ttl_ms: 30 * 1000,
            max_entries: 512,
            max_bytes: 0,
        }
    }

    /// Default tuning for the URL cache: 5 min TTL, 1024 entries
    pub fn url_defaults() -> CacheTuning {
        CacheTuning {
            ttl_ms: 5 * 60 * 1000,
            max_entries: 1024,
            max_bytes: 0,
        }
    }

    /// Default tuning for the UI document cache: 2 min TTL, 2048 entries
    pub fn document_defaults() -> CacheTuning {
        CacheTuning {
            ttl_ms: 2 * 60 * 1000,
            max_entries: 2048,
            max_bytes: 0,
        }
    }

    /// Default tuning for the workspace caches: 2 min TTL, 2048 entries
    pub fn workspace_defaults() -> CacheTuning {
        CacheTuning {
            ttl_ms: 2 * 60 * 1000,
            max_entries: 2048,
            max_bytes: 0,
        }
    }

    /// Normalize all tunings, replacing non-positive values with defaults
    pub fn normalized(&self) -> CacheConfig {
        CacheConfig {
            blob: self.blob.or_defaults(Self::blob_defaults()),
            list: self.list.or_defaults(Self::list_defaults()),
            url: self.url.or_defaults(Self::url_defaults()),
            document: self.document.or_defaults(Self::document_defaults()),
            workspace: self.workspace.or_defaults(Self::workspace_defaults()),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            blob: Self::blob_defaults(),
            list: Self::list_defaults(),
            url: Self::url_defaults(),
            document: Self::document_defaults(),
            workspace: Self::workspace_defaults(),
        }
    }
}

/// Storage paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the file-backed artifact store
    pub artifact_root: PathBuf,
    /// Path for the sled database (UI documents, workspaces)
    pub database_path: PathBuf,
    /// Path for the project-file fallback store (single JSON array)
    pub project_file_path: PathBuf,
    /// Root directory for the disk cache used by the worker strategy layer
    pub strategy_cache_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("data/artifacts"),
            database_path: PathBuf::from("data/gateway.db"),
            project_file_path: PathBuf::from("data/projects.json"),
            strategy_cache_root: PathBuf::from("data/strategy-cache"),
        }
    }
}

/// Interaction handoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    /// Repo-relative path of the persisted conversation history, keyed by run
    pub conversation_path: String,
    /// How long a run blocks waiting for user input, in seconds
    pub input_timeout_secs: u64,
}

impl InteractionConfig {
    /// Validate interaction configuration
    pub fn validate(&self) -> GatewayResult<()> {
        if self.conversation_path.trim().is_empty() {
            return Err(GatewayError::Config(
                "Conversation path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            conversation_path: "conversation/history.json".to_string(),
            input_timeout_secs: 600,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider endpoint
    pub base_url: String,
    /// Provider credential
    pub api_key: String,
    /// Model tier hint ("fast", "balanced", "deep")
    pub tier: String,
    /// Token-bucket refill rate for provider calls
    pub requests_per_second: u32,
}

impl LlmConfig {
    /// Validate LLM configuration
    pub fn validate(&self) -> GatewayResult<()> {
        if self.requests_per_second == 0 {
            return Err(GatewayError::Config(
                "LLM requests_per_second must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.provider.invalid/v1".to_string(),
            api_key: String::new(),
            tier: "balanced".to_string(),
            requests_per_second: 10,
        }
    }
}

/// DAG scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Token budget per chunk
    pub chunk_capacity: u64,
    /// Maximum chunks in flight
    pub parallelism: usize,
}

impl SchedulerConfig {
    /// Validate scheduler configuration
    pub fn validate(&self) -> GatewayResult<()> {
        if self.chunk_capacity == 0 {
            return Err(GatewayError::Config(
                "Scheduler chunk_capacity must be positive".to_string(),
            ));
        }
        if self.parallelism == 0 {
            return Err(GatewayError::Config(
                "Scheduler parallelism must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: 8192,
            parallelism: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cache_tuning_coerces_non_positive() {
        let tuning = CacheTuning {
            ttl_ms: 0,
            max_entries: -5,
            max_bytes: -1,
        };
        let normalized = tuning.or_defaults(CacheConfig::blob_defaults());
        assert_eq!(normalized.ttl_ms, 5 * 60 * 1000);
        assert_eq!(normalized.max_entries, 1024);
        assert_eq!(normalized.max_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn cache_tuning_keeps_zero_max_bytes() {
        let tuning = CacheTuning {
            ttl_ms: 1000,
            max_entries: 10,
            max_bytes: 0,
        };
        let normalized = tuning.or_defaults(CacheConfig::blob_defaults());
        assert_eq!(normalized.max_bytes, 0);
    }

    #[test]
    fn app_env_parses_known_values() {
        assert_eq!(AppEnv::parse("local").unwrap(), AppEnv::Local);
        assert_eq!(AppEnv::parse("STAGE").unwrap(), AppEnv::Stage);
        assert_eq!(AppEnv::parse("prod").unwrap(), AppEnv::Prod);
        assert!(AppEnv::parse("qa").is_err());
    }
}
