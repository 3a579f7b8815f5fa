//! UI document store backends
//!
//! Two variants behind one trait: an in-memory map guarded by a per-store
//! write lock, and a sled-backed store that serializes writers per run with
//! a lock row that always exists.

use super::{apply_ops_to_state, DocState, UiDocument, UiOp};
use crate::error::GatewayResult;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

const DOCUMENT_TREE: &str = "ui_documents";

/// Versioned UI document storage.
///
/// `get_document` returns the empty document (version 0, no nodes) for an
/// unknown run. `apply_ops` returns the resulting document and a conflict
/// flag; a conflict is a response, never an error.
#[async_trait]
pub trait UiDocumentStore: Send + Sync {
    /// Current document for a run
    async fn get_document(&self, run_id: &str) -> GatewayResult<UiDocument>;

    /// Apply one op batch under optimistic concurrency
    async fn apply_ops(
        &self,
        run_id: &str,
        base_version: i64,
        ops: &[UiOp],
    ) -> GatewayResult<(UiDocument, bool)>;
}

/// Map-backed document store. A single store-wide write lock serializes
/// `apply_ops`, which directly provides the per-run linearization the
/// version check depends on.
#[derive(Default)]
pub struct InMemoryUiDocumentStore {
    docs: RwLock<HashMap<String, DocState>>,
}

impl InMemoryUiDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UiDocumentStore for InMemoryUiDocumentStore {
    async fn get_document(&self, run_id: &str) -> GatewayResult<UiDocument> {
        let docs = self.docs.read();
        Ok(docs
            .get(run_id)
            .map(|state| state.to_document(run_id))
            .unwrap_or_else(|| UiDocument::empty(run_id)))
    }

    async fn apply_ops(
        &self,
        run_id: &str,
        base_version: i64,
        ops: &[UiOp],
    ) -> GatewayResult<(UiDocument, bool)> {
        let mut docs = self.docs.write();
        let state = docs.entry(run_id.to_string()).or_default();
        apply_ops_to_state(state, run_id, base_version, ops)
    }
}

/// Sled-backed document store. Writers for the same run are serialized by a
/// per-run async mutex (the lock entry is created on first reference and
/// never removed, so the lock row always exists); independent runs proceed
/// concurrently.
pub struct SledUiDocumentStore {
    tree: sled::Tree,
    row_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SledUiDocumentStore {
    /// Open the document tree inside an existing sled database
    pub fn new(db: &sled::Db) -> GatewayResult<Self> {
        Ok(Self {
            tree: db.open_tree(DOCUMENT_TREE)?,
            row_locks: DashMap::new(),
        })
    }

    fn row_lock(&self, run_id: &str) -> Arc<Mutex<()>> {
        self.row_locks
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// A corrupt row yields the empty state; repairing stored bytes is not
    /// this layer's job.
    fn read_state(&self, run_id: &str) -> GatewayResult<DocState> {
        match self.tree.get(run_id.as_bytes())? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(state) => Ok(state),
                Err(err) => {
                    warn!(run_id, error = %err, "corrupt UI document row, serving empty");
                    Ok(DocState::default())
                }
            },
            None => Ok(DocState::default()),
        }
    }

    fn write_state(&self, run_id: &str, state: &DocState) -> GatewayResult<()> {
        let bytes = serde_json::to_vec(state)?;
        self.tree.insert(run_id.as_bytes(), bytes)?;
        Ok(())
    }
}

#[async_trait]
impl UiDocumentStore for SledUiDocumentStore {
    async fn get_document(&self, run_id: &str) -> GatewayResult<UiDocument> {
        Ok(self.read_state(run_id)?.to_document(run_id))
    }

    async fn apply_ops(
        &self,
        run_id: &str,
        base_version: i64,
        ops: &[UiOp],
    ) -> GatewayResult<(UiDocument, bool)> {
        let lock = self.row_lock(run_id);
        let _guard = lock.lock().await;

        let mut state = self.read_state(run_id)?;
        let before_version = state.version;
        let result = apply_ops_to_state(&mut state, run_id, base_version, ops)?;
        if state.version != before_version {
            self.write_state(run_id, &state)?;
        }
        Ok(result)
    }
}
