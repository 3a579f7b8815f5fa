//! Interaction service
//!
//! Service layer for the user-input handoff: send input, query wait state,
//! subscribe to interaction events.

use crate::api::models::{
    requests::{SendInputRequest, WaitRequest},
    responses::{SendInputResponse, WaitResponse},
    ApiError, ApiResult,
};
use crate::concurrency::{CancelToken, DropOldestQueue};
use crate::interact::{InteractionEvent, InteractionWaiter};
use std::sync::Arc;

/// Interaction handoff operations
pub struct InteractionService {
    waiter: Arc<InteractionWaiter>,
}

impl InteractionService {
    /// Create an interaction service
    pub fn new(waiter: Arc<InteractionWaiter>) -> Self {
        Self { waiter }
    }

    /// Queue user input for a blocked run
    pub fn send_input(&self, request: SendInputRequest) -> ApiResult<SendInputResponse> {
        let run_id = request.run_id.trim();
        if run_id.is_empty() {
            return Err(ApiError::new("INVALID_ARGUMENT", "run_id must not be empty"));
        }
        let accepted = self.waiter.send(
            run_id,
            &request.input,
            request.interaction_id.as_deref(),
        );
        Ok(SendInputResponse { accepted })
    }

    /// Current wait state, optionally blocking for a change
    pub async fn wait(&self, request: WaitRequest) -> ApiResult<WaitResponse> {
        let run_id = request.run_id.trim();
        if run_id.is_empty() {
            return Err(ApiError::new("INVALID_ARGUMENT", "run_id must not be empty"));
        }
        let state = self.waiter.wait(run_id, request.timeout_ms).await;
        Ok(WaitResponse { state })
    }

    /// Subscribe to a run's interaction events; the queue closes when the
    /// token cancels
    pub fn subscribe(
        &self,
        token: CancelToken,
        run_id: &str,
    ) -> ApiResult<DropOldestQueue<InteractionEvent>> {
        let run_id = run_id.trim();
        if run_id.is_empty() {
            return Err(ApiError::new("INVALID_ARGUMENT", "run_id must not be empty"));
        }
        Ok(self.waiter.subscribe(token, run_id))
    }
}
