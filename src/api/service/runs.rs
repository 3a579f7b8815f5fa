//! Run service
//!
//! Service layer for starting, listing, cancelling, and watching runs.

use crate::api::models::{
    requests::StartRunRequest,
    responses::{ListRunsResponse, StartRunResponse},
    ApiError, ApiResult,
};
use crate::concurrency::DropOldestQueue;
use crate::run::{RunEvent, RunExecutor};
use std::sync::Arc;

/// Run management operations
pub struct RunService {
    executor: Arc<RunExecutor>,
}

impl RunService {
    /// Create a run service
    pub fn new(executor: Arc<RunExecutor>) -> Self {
        Self { executor }
    }

    /// Start a worker run; returns the run id synchronously
    pub async fn start_run(&self, request: StartRunRequest) -> ApiResult<StartRunResponse> {
        let run_id = self
            .executor
            .start_run(&request.project_id, &request.worker_id, request.params)
            .await
            .map_err(ApiError::from)?;
        Ok(StartRunResponse { run_id })
    }

    /// Subscribe to a run's event stream. The queue is drop-oldest under a
    /// slow consumer and closes after a terminal event or when the run's
    /// channel closes.
    pub fn watch_run(&self, run_id: &str) -> ApiResult<DropOldestQueue<RunEvent>> {
        self.executor
            .registry()
            .subscribe(run_id)
            .map_err(ApiError::from)
    }

    /// List registered runs
    pub fn list_runs(&self) -> ListRunsResponse {
        ListRunsResponse {
            runs: self.executor.registry().list(),
        }
    }

    /// Request cancellation of a live run
    pub fn cancel_run(&self, run_id: &str) -> ApiResult<()> {
        self.executor
            .registry()
            .cancel_run(run_id)
            .map_err(ApiError::from)
    }

    /// Number of registered runs, for health reporting
    pub fn active_runs(&self) -> usize {
        self.executor.registry().list().len()
    }
}
