//! REST transport
//!
//! Thin `axum` edge over the service layer. Request/response streaming RPCs
//! (watch-run, interaction subscribe) are exposed as Server-Sent Events;
//! all logic lives in the services.

use crate::api::models::requests::{
    ApplyOpsRequest, CreateTabRequest, RestoreRequest, SelectTabRequest, SendInputRequest,
    StartRunRequest, UpdateTabRunRequest, WaitRequest,
};
use crate::api::models::responses::{CacheStatsResponse, HealthResponse};
use crate::api::models::{ApiError, ApiResult};
use crate::api::service::{DocumentService, InteractionService, RunService, WorkspaceService};
use crate::cache::CachedArtifactStore;
use crate::concurrency::{CancelToken, DropOldestQueue};
use crate::run::RunEvent;
use crate::uidoc::UiOp;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state behind every handler
pub struct AppState {
    /// Run management
    pub runs: RunService,
    /// Interaction handoff
    pub interactions: InteractionService,
    /// UI documents
    pub documents: DocumentService,
    /// Workspaces and tabs
    pub workspaces: WorkspaceService,
    /// Artifact cache facade, for the stats surface
    pub artifact_cache: Arc<CachedArtifactStore>,
}

/// Build the gateway router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/runs", post(start_run).get(list_runs))
        .route("/runs/{run_id}/events", get(watch_run))
        .route("/runs/{run_id}/cancel", post(cancel_run))
        .route("/runs/{run_id}/input", post(send_input))
        .route("/runs/{run_id}/wait", get(wait_state))
        .route("/runs/{run_id}/interaction/events", get(subscribe_interaction))
        .route("/runs/{run_id}/document", get(get_document))
        .route("/runs/{run_id}/document/ops", post(apply_ops))
        .route("/restore", post(restore))
        .route("/workspaces/{project_id}", post(ensure_workspace))
        .route("/tabs", post(create_tab))
        .route("/tabs/select", post(select_tab))
        .route("/tabs/run", post(update_tab_run))
        .route("/stats/cache", get(cache_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn respond<T: serde::Serialize>(result: ApiResult<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: ApiError) -> Response {
    let status = err.to_http_status();
    (status, Json(err)).into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_runs: state.runs.active_runs(),
    })
    .into_response()
}

#[derive(Deserialize)]
struct StartRunBody {
    project_id: String,
    worker_id: String,
    #[serde(default)]
    params: serde_json::Value,
}

async fn start_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartRunBody>,
) -> Response {
    let request = StartRunRequest {
        project_id: body.project_id,
        worker_id: body.worker_id,
        params: body.params,
    };
    respond(state.runs.start_run(request).await)
}

async fn list_runs(State(state): State<Arc<AppState>>) -> Response {
    Json(state.runs.list_runs()).into_response()
}

async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Response {
    respond(state.runs.cancel_run(&run_id).map(|_| serde_json::json!({"cancelled": true})))
}

/// Stream run events as SSE, ending after a terminal event or channel close.
async fn watch_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Response {
    match state.runs.watch_run(&run_id) {
        Ok(queue) => Sse::new(run_event_stream(queue))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(err) => error_response(err),
    }
}

fn run_event_stream(
    queue: DropOldestQueue<RunEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold((queue, false), |(queue, done)| async move {
        if done {
            return None;
        }
        let event = queue.recv().await?;
        let terminal = event.is_terminal();
        let sse = Event::default()
            .event("run")
            .json_data(&event)
            .unwrap_or_else(|_| Event::default().data("{}"));
        Some((Ok(sse), (queue, terminal)))
    })
}

#[derive(Deserialize)]
struct SendInputBody {
    input: String,
    #[serde(default)]
    interaction_id: Option<String>,
}

async fn send_input(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    Json(body): Json<SendInputBody>,
) -> Response {
    respond(state.interactions.send_input(SendInputRequest {
        run_id,
        input: body.input,
        interaction_id: body.interaction_id,
    }))
}

#[derive(Deserialize)]
struct WaitQuery {
    #[serde(default)]
    timeout_ms: i64,
}

async fn wait_state(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    Query(query): Query<WaitQuery>,
) -> Response {
    respond(
        state
            .interactions
            .wait(WaitRequest {
                run_id,
                timeout_ms: query.timeout_ms,
            })
            .await,
    )
}

/// Cancels the subscription token when the SSE stream is dropped.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn subscribe_interaction(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Response {
    let token = CancelToken::new();
    match state.interactions.subscribe(token.clone(), &run_id) {
        Ok(queue) => {
            let guard = CancelOnDrop(token);
            let stream = futures::stream::unfold((queue, guard), |(queue, guard)| async move {
                let event = queue.recv().await?;
                let sse = Event::default()
                    .event("interaction")
                    .json_data(&event)
                    .unwrap_or_else(|_| Event::default().data("{}"));
                Some((Ok::<_, Infallible>(sse), (queue, guard)))
            });
            Sse::new(stream)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Response {
    respond(state.documents.get_document(&run_id).await)
}

#[derive(Deserialize)]
struct ApplyOpsBody {
    #[serde(default)]
    base_version: i64,
    ops: Vec<UiOp>,
}

async fn apply_ops(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    Json(body): Json<ApplyOpsBody>,
) -> Response {
    respond(
        state
            .documents
            .apply_ops(ApplyOpsRequest {
                run_id,
                base_version: body.base_version,
                ops: body.ops,
            })
            .await,
    )
}

async fn restore(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RestoreRequest>,
) -> Response {
    respond(state.documents.restore(request).await)
}

async fn ensure_workspace(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Response {
    respond(state.workspaces.ensure_workspace(&project_id).await)
}

async fn create_tab(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTabRequest>,
) -> Response {
    respond(state.workspaces.create_tab(request).await)
}

async fn select_tab(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectTabRequest>,
) -> Response {
    respond(state.workspaces.select_tab(request).await)
}

async fn update_tab_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateTabRunRequest>,
) -> Response {
    respond(state.workspaces.update_tab_run(request).await)
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Response {
    Json(CacheStatsResponse {
        artifact_store: state.artifact_cache.metrics(),
    })
    .into_response()
}
