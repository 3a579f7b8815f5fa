//! Read-through / write-through UI document cache
//!
//! Wraps any [`UiDocumentStore`]. Cached documents are weighted by node
//! count rather than byte size, and every document crossing the boundary is
//! a structural clone.

use crate::cache::memory::MemoryCache;
use crate::config::CacheTuning;
use crate::error::GatewayResult;
use crate::uidoc::{UiDocument, UiDocumentStore, UiOp};
use async_trait::async_trait;
use std::sync::Arc;

/// Caching facade over a UI document store.
pub struct CachedUiDocumentStore {
    origin: Arc<dyn UiDocumentStore>,
    documents: MemoryCache<String, UiDocument>,
}

impl CachedUiDocumentStore {
    /// Wrap `origin` with a document cache tuned by `tuning`.
    pub fn new(origin: Arc<dyn UiDocumentStore>, tuning: CacheTuning) -> Self {
        Self {
            origin,
            documents: MemoryCache::with_tuning(tuning),
        }
    }

    /// Evict one run's cached document
    pub fn invalidate(&self, run_id: &str) {
        self.documents.delete(&run_id.to_string());
    }
}

#[async_trait]
impl UiDocumentStore for CachedUiDocumentStore {
    async fn get_document(&self, run_id: &str) -> GatewayResult<UiDocument> {
        let key = run_id.to_string();
        if let Some(doc) = self.documents.get(&key) {
            return Ok(doc);
        }
        let doc = self.origin.get_document(run_id).await?;
        self.documents
            .set(key, doc.clone(), doc.nodes.len() as i64);
        Ok(doc)
    }

    async fn apply_ops(
        &self,
        run_id: &str,
        base_version: i64,
        ops: &[UiOp],
    ) -> GatewayResult<(UiDocument, bool)> {
        match self.origin.apply_ops(run_id, base_version, ops).await {
            Ok((doc, conflict)) => {
                // The origin's returned document is authoritative either
                // way: the new state on accept, the current state on
                // conflict.
                self.documents
                    .set(run_id.to_string(), doc.clone(), doc.nodes.len() as i64);
                Ok((doc, conflict))
            }
            Err(err) => {
                // The write failed before any state change; drop the cached
                // entry rather than risk serving a stale document.
                self.documents.delete(&run_id.to_string());
                Err(err)
            }
        }
    }
}
