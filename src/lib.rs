//! Gateway core for LLM-driven worker runs
//!
//! This crate provides the runtime of a gateway that:
//! - Orchestrates worker runs over a weighted DAG with a token-budgeted
//!   chunker and a permit/credit quota protocol
//! - Streams per-run progress events to any number of subscribers
//! - Coordinates blocking user-input handoffs between workers and clients
//! - Serves a live, versioned UI document under optimistic concurrency
//! - Fronts pluggable origin stores with LRU+TTL caches and deep-copy
//!   boundaries

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod api;
pub mod artifact;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod gateway;
pub mod interact;
pub mod llm;
pub mod project;
pub mod run;
pub mod schedule;
pub mod uidoc;
pub mod worker;
pub mod workspace;

pub use artifact::ArtifactStore;
pub use cache::{DiskCache, MemoryCache};
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use interact::InteractionWaiter;
pub use run::{RunEvent, RunEventType, RunExecutor, RunRegistry};
pub use schedule::{Scheduler, TaskContext, TaskGraph, TaskNode};
pub use uidoc::{UiDocument, UiDocumentService, UiNode, UiOp};
pub use worker::{Worker, WorkerInput, WorkerOutcome, WorkerResolver};
pub use workspace::{Tab, Workspace, WorkspaceStore};
