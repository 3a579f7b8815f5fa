//! Worker contract
//!
//! A worker is a unit of server-side work that consumes inputs, optionally
//! calls the LLM provider, and emits a structured output plus a
//! client-facing view. Workers report progress through an [`EventSink`];
//! the run executor bridges those events to the wire-level run stream.

mod strategy;

pub use strategy::{StrategyCache, StrategyRecord};

use crate::error::GatewayResult;
use crate::schedule::TaskContext;
use crate::uidoc::UiNode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Internal runner event emitted by a worker while it executes
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// Free-form log line
    Log(String),
    /// Progress marker, optionally with a percentage
    Progress {
        /// Progress message
        message: String,
        /// Percent complete, 0..=100
        percent: Option<u8>,
    },
    /// One streamed LLM output chunk
    LlmChunk(String),
    /// Insert or replace a UI node
    UpsertNode(UiNode),
    /// Remove a UI node by id
    RemoveNode(String),
}

/// Receives a worker's runner events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event. Emission order is preserved per worker.
    async fn emit(&self, event: RunnerEvent);
}

/// The input a worker is invoked with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerInput {
    /// Caller-supplied parameters
    pub params: serde_json::Value,
    /// User inputs collected through the interaction waiter, oldest first
    pub user_inputs: Vec<String>,
    /// Outputs of the worker's declared dependencies, keyed by worker id
    pub dependencies: HashMap<String, serde_json::Value>,
}

/// What a worker invocation produced
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    /// The worker finished
    Complete {
        /// Structured output, persisted through the strategy cache
        output: serde_json::Value,
        /// The subset of the output intended for UI consumption
        client_view: serde_json::Value,
    },
    /// The worker needs another round of user input before it can finish
    NeedsInput {
        /// Prompt to surface to the user
        prompt: String,
    },
}

/// A unit of server-side work.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Stable worker identifier
    fn id(&self) -> &str;

    /// Ids of workers whose outputs this worker consumes
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Relative token weight used by the DAG chunker
    fn weight(&self) -> u64 {
        1
    }

    /// Execute the worker
    async fn invoke(
        &self,
        ctx: &TaskContext,
        sink: &dyn EventSink,
        input: WorkerInput,
    ) -> GatewayResult<WorkerOutcome>;
}

/// Maps worker ids to implementations.
#[derive(Default)]
pub struct WorkerResolver {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under its own id
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        self.workers.insert(worker.id().to_string(), worker);
    }

    /// Resolve a worker id
    pub fn resolve(&self, worker_id: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(worker_id.trim()).cloned()
    }

    /// Registered worker ids, sorted
    pub fn worker_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.keys().cloned().collect();
        ids.sort();
        ids
    }
}
