//! LLM provider client
//!
//! The core consumes a narrow completion contract; the concrete HTTP client
//! is a thin `reqwest` wrapper behind it. Every provider call goes through
//! the quota middleware first: one pre-reserved chunk credit when the task
//! context carries any, otherwise the shared token-bucket limiter.

use crate::error::{GatewayError, GatewayResult};
use crate::schedule::{acquire_quota, DirectLimiter, TaskContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One chat message in a completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user", or "assistant"
    pub role: String,
    /// Message body
    pub content: String,
}

/// A completion request
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// Resolved model identifier
    pub model: String,
    /// Conversation so far
    pub messages: Vec<ChatMessage>,
    /// Completion budget
    pub max_tokens: u32,
}

/// A completion response
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// Completion text
    pub content: String,
}

/// Provider completion contract.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion. Transient provider failures may be retried by
    /// the caller; permanent ones (context overflow, malformed payloads)
    /// must not be.
    async fn complete(&self, ctx: &TaskContext, request: LlmRequest) -> GatewayResult<LlmResponse>;
}

/// Maps tier hints to concrete model identifiers.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, String>,
    default_tier: String,
}

impl ModelRegistry {
    /// Registry with the standard three tiers
    pub fn new(default_tier: impl Into<String>) -> Self {
        let mut models = HashMap::new();
        models.insert("fast".to_string(), "loom-fast-1".to_string());
        models.insert("balanced".to_string(), "loom-balanced-1".to_string());
        models.insert("deep".to_string(), "loom-deep-1".to_string());
        Self {
            models,
            default_tier: default_tier.into(),
        }
    }

    /// Register or override one tier
    pub fn insert(&mut self, tier: impl Into<String>, model: impl Into<String>) {
        self.models.insert(tier.into(), model.into());
    }

    /// Resolve a tier hint to a model id, falling back to the default tier
    pub fn resolve(&self, tier: Option<&str>) -> String {
        let tier = tier.unwrap_or(&self.default_tier);
        self.models
            .get(tier)
            .or_else(|| self.models.get(&self.default_tier))
            .cloned()
            .unwrap_or_else(|| "loom-balanced-1".to_string())
    }
}

/// HTTP client against the provider's completion endpoint.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: Arc<DirectLimiter>,
}

#[derive(Deserialize)]
struct ProviderCompletion {
    content: String,
}

impl HttpLlmClient {
    /// Create a client for `base_url`, throttled by `limiter`
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, limiter: Arc<DirectLimiter>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            limiter,
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> GatewayError {
        if body.to_ascii_lowercase().contains("context length exceeded") {
            return GatewayError::Permanent(format!("provider rejected request: {}", body));
        }
        if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
            return GatewayError::Permanent(format!("provider error {}: {}", status, body));
        }
        GatewayError::Transient(format!("provider error {}: {}", status, body))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, ctx: &TaskContext, request: LlmRequest) -> GatewayResult<LlmResponse> {
        acquire_quota(ctx.credits.as_deref(), &self.limiter, &ctx.cancel).await?;
        debug!(run_id = %ctx.run_id, model = %request.model, "provider completion");

        let response = self
            .http
            .post(format!("{}/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| GatewayError::Transient(format!("provider unreachable: {}", err)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| GatewayError::Transient(format!("provider read failed: {}", err)))?;
        if !status.is_success() {
            return Err(Self::classify_status(status, &body));
        }

        let completion: ProviderCompletion = serde_json::from_str(&body).map_err(|err| {
            GatewayError::Permanent(format!("malformed provider payload: {}", err))
        })?;
        Ok(LlmResponse {
            content: completion.content,
        })
    }
}

/// Canned client for local development and tests: echoes the last user
/// message through the quota middleware.
pub struct StaticLlmClient {
    limiter: Arc<DirectLimiter>,
}

impl StaticLlmClient {
    /// Create a canned client throttled by `limiter`
    pub fn new(limiter: Arc<DirectLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl LlmClient for StaticLlmClient {
    async fn complete(&self, ctx: &TaskContext, request: LlmRequest) -> GatewayResult<LlmResponse> {
        acquire_quota(ctx.credits.as_deref(), &self.limiter, &ctx.cancel).await?;
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(LlmResponse {
            content: format!("[{}] {}", request.model, last_user),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::direct_limiter;

    #[test]
    fn registry_resolves_tiers_with_fallback() {
        let registry = ModelRegistry::new("balanced");
        assert_eq!(registry.resolve(Some("fast")), "loom-fast-1");
        assert_eq!(registry.resolve(Some("unknown")), "loom-balanced-1");
        assert_eq!(registry.resolve(None), "loom-balanced-1");
    }

    #[test]
    fn context_overflow_is_permanent() {
        let err = HttpLlmClient::classify_status(
            reqwest::StatusCode::BAD_REQUEST,
            "context length exceeded",
        );
        assert!(matches!(err, GatewayError::Permanent(_)));
    }

    #[test]
    fn throttling_is_transient() {
        let err =
            HttpLlmClient::classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, GatewayError::Transient(_)));
    }

    #[tokio::test]
    async fn static_client_echoes_last_user_message() {
        let client = StaticLlmClient::new(direct_limiter(100));
        let ctx = TaskContext::new("run-1");
        let response = client
            .complete(
                &ctx,
                LlmRequest {
                    model: "loom-fast-1".to_string(),
                    messages: vec![ChatMessage {
                        role: "user".to_string(),
                        content: "ping".to_string(),
                    }],
                    max_tokens: 64,
                },
            )
            .await
            .unwrap();
        assert_eq!(response.content, "[loom-fast-1] ping");
    }
}
