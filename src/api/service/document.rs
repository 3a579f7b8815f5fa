//! Document service
//!
//! Service layer for UI document reads, op application, and restore.

use crate::api::models::{
    requests::{ApplyOpsRequest, RestoreRequest},
    responses::{ApplyOpsResponse, GetDocumentResponse, RestoreResponse},
    ApiError, ApiResult,
};
use crate::uidoc::UiDocumentService;
use crate::workspace::WorkspaceStore;
use std::sync::Arc;

/// UI document operations
pub struct DocumentService {
    documents: Arc<UiDocumentService>,
    workspaces: Arc<dyn WorkspaceStore>,
}

impl DocumentService {
    /// Create a document service
    pub fn new(documents: Arc<UiDocumentService>, workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self {
            documents,
            workspaces,
        }
    }

    /// Current document for a run
    pub async fn get_document(&self, run_id: &str) -> ApiResult<GetDocumentResponse> {
        let run_id = run_id.trim();
        if run_id.is_empty() {
            return Err(ApiError::new("INVALID_ARGUMENT", "run_id must not be empty"));
        }
        let document = self
            .documents
            .get_document(run_id)
            .await
            .map_err(ApiError::from)?;
        Ok(GetDocumentResponse { document })
    }

    /// Apply an op batch; a version conflict is reported as a response
    /// field, not an error
    pub async fn apply_ops(&self, request: ApplyOpsRequest) -> ApiResult<ApplyOpsResponse> {
        let run_id = request.run_id.trim();
        if run_id.is_empty() {
            return Err(ApiError::new("INVALID_ARGUMENT", "run_id must not be empty"));
        }
        let (document, conflict) = self
            .documents
            .apply_ops(run_id, request.base_version, &request.ops)
            .await
            .map_err(ApiError::from)?;
        Ok(ApplyOpsResponse { document, conflict })
    }

    /// Resolve the document to restore for a project
    pub async fn restore(&self, request: RestoreRequest) -> ApiResult<RestoreResponse> {
        let project_id = request.project_id.trim();
        if project_id.is_empty() {
            return Err(ApiError::new(
                "INVALID_ARGUMENT",
                "project_id must not be empty",
            ));
        }
        let outcome = self
            .documents
            .restore(
                self.workspaces.as_ref(),
                project_id,
                request.tab_id.as_deref(),
            )
            .await;
        Ok(RestoreResponse { outcome })
    }
}
