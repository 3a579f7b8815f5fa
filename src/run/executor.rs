//! Run executor
//!
//! Starts runs, bridges worker runner events to the wire-level run stream,
//! coordinates blocking user-input handoffs through the interaction waiter,
//! and syncs produced artifacts into the artifact store when the worker
//! finishes.

use super::events::RunEvent;
use super::registry::RunRegistry;
use crate::artifact::ArtifactStore;
use crate::error::{GatewayError, GatewayResult};
use crate::interact::InteractionWaiter;
use crate::project::{ArtifactMeta, ProjectFileStore, ProjectRecord, ProjectRuntime, RuntimeManager};
use crate::schedule::{Chunk, ChunkRunner, Scheduler, TaskContext, TaskGraph, TaskNode};
use crate::uidoc::{UiDocumentService, UiOp};
use crate::worker::{
    EventSink, RunnerEvent, StrategyCache, StrategyRecord, Worker, WorkerInput, WorkerOutcome,
};
use crate::workspace::WorkspaceStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Deadline for the background artifact sync, independent of any client
const ARTIFACT_SYNC_DEADLINE: Duration = Duration::from_secs(600);

/// Bridges a worker's runner events to the run stream and the UI document.
///
/// The document mutation for a node event completes before the `NODE_READY`
/// progress event is emitted, so a client that sees `NODE_READY` and then
/// fetches the document observes the node.
struct RunEventBridge {
    run_id: String,
    events: mpsc::Sender<RunEvent>,
    documents: Arc<UiDocumentService>,
}

impl RunEventBridge {
    async fn forward(&self, event: RunEvent) {
        // A closed channel means every consumer is gone; nothing to do.
        let _ = self.events.send(event).await;
    }
}

#[async_trait]
impl EventSink for RunEventBridge {
    async fn emit(&self, event: RunnerEvent) {
        match event {
            RunnerEvent::Log(message) => self.forward(RunEvent::log(message)).await,
            RunnerEvent::Progress { message, percent } => {
                self.forward(RunEvent::progress(message, percent)).await
            }
            RunnerEvent::LlmChunk(chunk) => self.forward(RunEvent::log(chunk)).await,
            RunnerEvent::UpsertNode(node) => {
                let op = UiOp::UpsertNode { node };
                match self.documents.apply_ops(&self.run_id, 0, &[op]).await {
                    Ok(_) => self.forward(RunEvent::node_ready()).await,
                    Err(err) => {
                        warn!(run_id = %self.run_id, error = %err, "node upsert failed");
                        self.forward(RunEvent::log(format!("ui node update failed: {}", err)))
                            .await;
                    }
                }
            }
            RunnerEvent::RemoveNode(node_id) => {
                let op = UiOp::DeleteNode { node_id };
                match self.documents.apply_ops(&self.run_id, 0, &[op]).await {
                    Ok(_) => self.forward(RunEvent::node_ready()).await,
                    Err(err) => {
                        warn!(run_id = %self.run_id, error = %err, "node removal failed");
                        self.forward(RunEvent::log(format!("ui node update failed: {}", err)))
                            .await;
                    }
                }
            }
        }
    }
}

/// Executes dependency workers chunk by chunk. The chunk's task context
/// carries the credits its permit reservation granted; dependency workers
/// cannot block on user input, only the target worker may.
struct DependencyChunkRunner {
    workers: Vec<Arc<dyn Worker>>,
    params: serde_json::Value,
    strategy: Arc<StrategyCache>,
    outputs: tokio::sync::Mutex<HashMap<String, serde_json::Value>>,
    bridge: Arc<RunEventBridge>,
}

#[async_trait]
impl ChunkRunner for DependencyChunkRunner {
    async fn run_chunk(&self, ctx: TaskContext, chunk: &Chunk) -> GatewayResult<()> {
        for &index in &chunk.nodes {
            let worker = &self.workers[index];
            let dependencies = {
                let outputs = self.outputs.lock().await;
                worker
                    .dependencies()
                    .into_iter()
                    .filter_map(|dep| outputs.get(&dep).map(|v| (dep, v.clone())))
                    .collect()
            };
            let input = WorkerInput {
                params: self.params.clone(),
                user_inputs: Vec::new(),
                dependencies,
            };
            let fingerprint = StrategyCache::fingerprint(worker.id(), &input);
            if let Ok(Some(record)) = self.strategy.load(&fingerprint) {
                self.outputs
                    .lock()
                    .await
                    .insert(worker.id().to_string(), record.output);
                continue;
            }

            match worker.invoke(&ctx, self.bridge.as_ref(), input).await? {
                WorkerOutcome::Complete {
                    output,
                    client_view,
                } => {
                    let record = StrategyRecord {
                        output: output.clone(),
                        client_view,
                    };
                    if let Err(err) = self.strategy.store(&fingerprint, &record) {
                        warn!(worker = worker.id(), error = %err, "strategy cache write failed");
                    }
                    if let Err(err) = self.strategy.store_latest(worker.id(), &record) {
                        warn!(worker = worker.id(), error = %err, "latest-output write failed");
                    }
                    self.outputs
                        .lock()
                        .await
                        .insert(worker.id().to_string(), output);
                }
                WorkerOutcome::NeedsInput { .. } => {
                    return Err(GatewayError::Permanent(format!(
                        "worker {} requires user input but runs as a dependency",
                        worker.id()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Resolves project runtimes, invokes workers, and owns each run's stream.
pub struct RunExecutor {
    registry: Arc<RunRegistry>,
    runtimes: Arc<RuntimeManager>,
    waiter: Arc<InteractionWaiter>,
    documents: Arc<UiDocumentService>,
    artifacts: Arc<dyn ArtifactStore>,
    workspaces: Arc<dyn WorkspaceStore>,
    projects: Arc<ProjectFileStore>,
    input_timeout: Duration,
}

impl RunExecutor {
    /// Wire an executor from its collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<RunRegistry>,
        runtimes: Arc<RuntimeManager>,
        waiter: Arc<InteractionWaiter>,
        documents: Arc<UiDocumentService>,
        artifacts: Arc<dyn ArtifactStore>,
        workspaces: Arc<dyn WorkspaceStore>,
        projects: Arc<ProjectFileStore>,
        input_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            runtimes,
            waiter,
            documents,
            artifacts,
            workspaces,
            projects,
            input_timeout,
        }
    }

    /// The registry backing this executor
    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// Start a run: allocate the identifier, register the event channel,
    /// attach the run to the project's active tab so clients can discover
    /// it, and spawn the execution task. Returns the run id synchronously.
    pub async fn start_run(
        self: &Arc<Self>,
        project_id: &str,
        worker_id: &str,
        params: serde_json::Value,
    ) -> GatewayResult<String> {
        let project_id = project_id.trim().to_string();
        let worker_id = worker_id.trim().to_string();
        if project_id.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "project id must not be empty".to_string(),
            ));
        }
        if worker_id.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "worker id must not be empty".to_string(),
            ));
        }

        let run_id = self.registry.allocate();
        let (events, cancel) = self.registry.register(&run_id);

        if let Err(err) = self.attach_run_to_tab(&project_id, &worker_id, &run_id).await {
            warn!(%run_id, error = %err, "failed to attach run to workspace tab");
        }

        let executor = self.clone();
        let spawn_run_id = run_id.clone();
        tokio::spawn(async move {
            executor
                .execute_run(spawn_run_id, project_id, worker_id, params, events, cancel)
                .await;
        });
        info!(%run_id, "run started");
        Ok(run_id)
    }

    /// Bind the new run to the project's currently-active tab, creating the
    /// workspace and a tab when the project has neither.
    async fn attach_run_to_tab(
        &self,
        project_id: &str,
        worker_id: &str,
        run_id: &str,
    ) -> GatewayResult<()> {
        let workspace = self
            .workspaces
            .ensure_workspace(project_id, project_id)
            .await?;
        if workspace.active_tab_id.is_empty() {
            self.workspaces
                .create_tab(&workspace.workspace_id, worker_id, run_id)
                .await?;
        } else {
            self.workspaces
                .update_tab_run(&workspace.workspace_id, &workspace.active_tab_id, run_id)
                .await?;
        }
        Ok(())
    }

    async fn execute_run(
        self: Arc<Self>,
        run_id: String,
        project_id: String,
        worker_id: String,
        params: serde_json::Value,
        events: mpsc::Sender<RunEvent>,
        cancel: crate::concurrency::CancelToken,
    ) {
        let runtime = match self.runtimes.ensure(&project_id) {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(%run_id, error = %err, "project runtime unavailable");
                self.waiter.publish_output(
                    &run_id,
                    None,
                    &format!("run failed to start: {}", err),
                );
                let _ = events.send(RunEvent::error(err.to_string())).await;
                self.waiter.close(&run_id, None);
                return;
            }
        };

        let worker = match runtime.resolver.resolve(&worker_id) {
            Some(worker) => worker,
            None => {
                let _ = events
                    .send(RunEvent::error(format!("worker {} not found", worker_id)))
                    .await;
                self.waiter.close(&run_id, None);
                return;
            }
        };

        let bridge = Arc::new(RunEventBridge {
            run_id: run_id.clone(),
            events: events.clone(),
            documents: self.documents.clone(),
        });
        let mut ctx = TaskContext::new(run_id.clone());
        ctx.cancel = cancel;
        ctx.model_tier = Some(runtime.models.resolve(None));

        // Dependencies of the target worker run first, chunked under the
        // token budget with per-chunk permit reservations.
        let dep_outputs = self
            .run_dependency_graph(&runtime, &worker, &params, &ctx, &bridge, &events)
            .await;

        let mut user_inputs: Vec<String> = Vec::new();
        loop {
            let input = WorkerInput {
                params: params.clone(),
                user_inputs: user_inputs.clone(),
                dependencies: self.collect_dependencies(
                    &runtime.strategy,
                    &worker.dependencies(),
                    &dep_outputs,
                ),
            };
            let fingerprint = StrategyCache::fingerprint(&worker_id, &input);

            match runtime.strategy.load(&fingerprint) {
                Ok(Some(record)) => {
                    debug!(%run_id, "serving run from strategy cache");
                    let _ = events.send(RunEvent::complete(record.client_view)).await;
                    break;
                }
                Ok(None) => {}
                Err(err) => warn!(%run_id, error = %err, "strategy cache read failed"),
            }

            match worker.invoke(&ctx, bridge.as_ref(), input).await {
                Ok(WorkerOutcome::Complete {
                    output,
                    client_view,
                }) => {
                    let record = StrategyRecord {
                        output,
                        client_view: client_view.clone(),
                    };
                    if let Err(err) = runtime.strategy.store(&fingerprint, &record) {
                        warn!(%run_id, error = %err, "strategy cache write failed");
                    }
                    if let Err(err) = runtime.strategy.store_latest(&worker_id, &record) {
                        warn!(%run_id, error = %err, "latest-output write failed");
                    }
                    let _ = events.send(RunEvent::complete(client_view)).await;
                    break;
                }
                Ok(WorkerOutcome::NeedsInput { prompt }) => {
                    let interaction_id = Uuid::new_v4().to_string();
                    self.waiter
                        .publish_output(&run_id, Some(&interaction_id), &prompt);
                    let _ = events.send(RunEvent::input_required(&interaction_id)).await;

                    let wait = tokio::time::timeout(
                        self.input_timeout,
                        self.waiter.wait_for_input(&ctx.cancel, &run_id),
                    )
                    .await;
                    match wait {
                        Ok(Ok(input)) => {
                            user_inputs.push(input);
                            continue;
                        }
                        Ok(Err(err)) => {
                            let _ = events.send(RunEvent::error(err.to_string())).await;
                            break;
                        }
                        Err(_) => {
                            let _ = events
                                .send(RunEvent::error("timed out waiting for user input"))
                                .await;
                            break;
                        }
                    }
                }
                Err(err) => {
                    warn!(%run_id, error = %err, "worker invocation failed");
                    let _ = events.send(RunEvent::error(err.to_string())).await;
                    break;
                }
            }
        }

        self.waiter.close(&run_id, None);

        // Sync produced artifacts on an independent deadline so a client
        // disconnect cannot orphan them.
        let executor = self.clone();
        let output_dir = runtime.output_dir.clone();
        tokio::spawn(async move {
            let sync = executor.sync_artifacts(&run_id, &project_id, &worker_id, &output_dir);
            match tokio::time::timeout(ARTIFACT_SYNC_DEADLINE, sync).await {
                Ok(Ok(count)) => debug!(%run_id, count, "artifact sync finished"),
                Ok(Err(err)) => warn!(%run_id, error = %err, "artifact sync failed"),
                Err(_) => warn!(%run_id, "artifact sync deadline exceeded"),
            }
        });
    }

    /// Run the target worker's transitive dependencies through the DAG
    /// scheduler and return their outputs keyed by worker id. Failures are
    /// surfaced as log events; the target still runs and decides whether a
    /// missing dependency is fatal.
    async fn run_dependency_graph(
        &self,
        runtime: &Arc<ProjectRuntime>,
        target: &Arc<dyn Worker>,
        params: &serde_json::Value,
        ctx: &TaskContext,
        bridge: &Arc<RunEventBridge>,
        events: &mpsc::Sender<RunEvent>,
    ) -> HashMap<String, serde_json::Value> {
        let dep_ids = target.dependencies();
        if dep_ids.is_empty() {
            return HashMap::new();
        }

        // Collect the transitive dependency workers breadth-first,
        // assigning each a node index.
        let mut ids: Vec<String> = Vec::new();
        let mut index_of: HashMap<String, usize> = HashMap::new();
        let mut workers: Vec<Arc<dyn Worker>> = Vec::new();
        let mut queue: std::collections::VecDeque<String> = dep_ids.iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            if index_of.contains_key(&id) {
                continue;
            }
            let Some(dep_worker) = runtime.resolver.resolve(&id) else {
                let _ = events
                    .send(RunEvent::log(format!("dependency worker {} not found", id)))
                    .await;
                continue;
            };
            index_of.insert(id.clone(), workers.len());
            ids.push(id);
            queue.extend(dep_worker.dependencies());
            workers.push(dep_worker);
        }
        if workers.is_empty() {
            return HashMap::new();
        }

        let nodes = workers
            .iter()
            .map(|w| {
                TaskNode::with_deps(
                    w.weight(),
                    w.dependencies()
                        .iter()
                        .filter_map(|d| index_of.get(d).copied())
                        .collect(),
                )
            })
            .collect();
        let graph = TaskGraph::new(nodes);
        let targets: Vec<usize> = dep_ids
            .iter()
            .filter_map(|d| index_of.get(d).copied())
            .collect();

        let runner = Arc::new(DependencyChunkRunner {
            workers,
            params: params.clone(),
            strategy: runtime.strategy.clone(),
            outputs: tokio::sync::Mutex::new(HashMap::new()),
            bridge: bridge.clone(),
        });
        let scheduler = Scheduler::new(
            runtime.scheduler.chunk_capacity,
            runtime.scheduler.parallelism,
        )
        .with_broker(runtime.broker.clone());

        match scheduler.execute(ctx, &graph, &targets, runner.clone()).await {
            Ok(outcome) => {
                for (node, note) in &outcome.node_notes {
                    let dep = ids.get(*node).map(String::as_str).unwrap_or("unknown");
                    let _ = events
                        .send(RunEvent::log(format!("dependency {} failed: {}", dep, note)))
                        .await;
                }
            }
            Err(err) => {
                let _ = events
                    .send(RunEvent::log(format!("dependency scheduling failed: {}", err)))
                    .await;
            }
        }
        runner.outputs.lock().await.clone()
    }

    /// Dependency outputs for the target worker: scheduled results first,
    /// falling back to the latest cached output per worker.
    fn collect_dependencies(
        &self,
        strategy: &StrategyCache,
        dependency_ids: &[String],
        scheduled: &HashMap<String, serde_json::Value>,
    ) -> HashMap<String, serde_json::Value> {
        let mut dependencies = HashMap::new();
        for dep in dependency_ids {
            if let Some(output) = scheduled.get(dep) {
                dependencies.insert(dep.clone(), output.clone());
                continue;
            }
            match strategy.load_latest(dep) {
                Ok(Some(record)) => {
                    dependencies.insert(dep.clone(), record.output);
                }
                Ok(None) => {}
                Err(err) => warn!(dependency = %dep, error = %err, "dependency load failed"),
            }
        }
        dependencies
    }

    /// Walk the runtime output directory and write every file into the
    /// artifact store under this run, recording metadata in the project
    /// store.
    async fn sync_artifacts(
        &self,
        run_id: &str,
        project_id: &str,
        worker_id: &str,
        output_dir: &Path,
    ) -> GatewayResult<usize> {
        if !output_dir.is_dir() {
            return Ok(0);
        }
        let mut metas = Vec::new();
        let mut pending = vec![output_dir.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                let rel = match path.strip_prefix(output_dir) {
                    Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                    Err(_) => continue,
                };
                let bytes = tokio::fs::read(&path).await?;
                self.artifacts.put(run_id, &rel, &bytes).await?;
                metas.push(ArtifactMeta {
                    path: rel,
                    size_bytes: bytes.len() as u64,
                });
            }
        }

        let count = metas.len();
        self.projects.upsert(ProjectRecord {
            project_id: project_id.to_string(),
            run_id: run_id.to_string(),
            worker_id: worker_id.to_string(),
            artifacts: metas,
            updated_at_unix_ms: Utc::now().timestamp_millis(),
        })?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::InMemoryArtifactStore;
    use crate::config::GatewayConfig;
    use crate::llm::StaticLlmClient;
    use crate::schedule::direct_limiter;
    use crate::uidoc::InMemoryUiDocumentStore;
    use crate::worker::{Worker, WorkerResolver};
    use crate::workspace::InMemoryWorkspaceStore;
    use tempfile::TempDir;
    use tokio::time::timeout;

    struct EchoWorker;

    #[async_trait]
    impl Worker for EchoWorker {
        fn id(&self) -> &str {
            "echo"
        }

        async fn invoke(
            &self,
            _ctx: &TaskContext,
            sink: &dyn EventSink,
            input: WorkerInput,
        ) -> GatewayResult<WorkerOutcome> {
            sink.emit(RunnerEvent::Log("starting".to_string())).await;
            sink.emit(RunnerEvent::Progress {
                message: "halfway".to_string(),
                percent: Some(50),
            })
            .await;
            Ok(WorkerOutcome::Complete {
                output: input.params.clone(),
                client_view: input.params,
            })
        }
    }

    fn executor(dir: &TempDir, resolver: WorkerResolver) -> Arc<RunExecutor> {
        let mut config = GatewayConfig::default();
        config.storage.artifact_root = dir.path().join("artifacts");
        config.storage.strategy_cache_root = dir.path().join("strategy");
        config.storage.project_file_path = dir.path().join("projects.json");

        let artifacts: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
        let waiter = Arc::new(InteractionWaiter::new(
            artifacts.clone(),
            "conversation/history.json",
        ));
        let documents = Arc::new(UiDocumentService::new(
            Arc::new(InMemoryUiDocumentStore::new()),
            artifacts.clone(),
            "conversation/history.json",
        ));
        let runtimes = Arc::new(RuntimeManager::new(
            &config,
            Arc::new(StaticLlmClient::new(direct_limiter(100))),
            Arc::new(resolver),
        ));
        Arc::new(RunExecutor::new(
            Arc::new(RunRegistry::new()),
            runtimes,
            waiter,
            documents,
            artifacts,
            Arc::new(InMemoryWorkspaceStore::new()),
            Arc::new(ProjectFileStore::new(&config.storage.project_file_path).unwrap()),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn run_streams_events_then_completes() {
        let dir = TempDir::new().unwrap();
        let mut resolver = WorkerResolver::new();
        resolver.register(Arc::new(EchoWorker));
        let executor = executor(&dir, resolver);

        let run_id = executor
            .start_run("p1", "echo", serde_json::json!({"q": "hi"}))
            .await
            .unwrap();
        let rx = executor.registry().subscribe(&run_id).unwrap();

        let mut saw_log = false;
        let mut terminal = None;
        while let Ok(Some(event)) = timeout(Duration::from_secs(2), rx.recv()).await {
            match event.event_type {
                super::super::events::RunEventType::Log => saw_log = true,
                _ if event.is_terminal() => {
                    terminal = Some(event);
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_log);
        let terminal = terminal.expect("terminal event");
        assert_eq!(
            terminal.client_view,
            Some(serde_json::json!({"q": "hi"}))
        );
    }

    #[tokio::test]
    async fn unknown_worker_emits_error() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, WorkerResolver::new());
        let run_id = executor
            .start_run("p1", "ghost", serde_json::json!({}))
            .await
            .unwrap();
        let rx = executor.registry().subscribe(&run_id).unwrap();

        let mut terminal = None;
        while let Ok(Some(event)) = timeout(Duration::from_secs(2), rx.recv()).await {
            if event.is_terminal() {
                terminal = Some(event);
                break;
            }
        }
        let terminal = terminal.expect("terminal event");
        assert_eq!(
            terminal.event_type,
            super::super::events::RunEventType::Error
        );
    }

    #[tokio::test]
    async fn start_run_attaches_run_to_active_tab() {
        let dir = TempDir::new().unwrap();
        let mut resolver = WorkerResolver::new();
        resolver.register(Arc::new(EchoWorker));
        let executor = executor(&dir, resolver);

        let run_id = executor
            .start_run("p1", "echo", serde_json::json!({}))
            .await
            .unwrap();
        let ws = executor
            .workspaces
            .get_workspace_by_project("p1")
            .await
            .unwrap()
            .unwrap();
        let tabs = executor.workspaces.list_tabs(&ws.workspace_id).await.unwrap();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].run_id, run_id);
        assert_eq!(ws.active_tab_id, tabs[0].tab_id);
    }

    #[tokio::test]
    async fn empty_identifiers_are_rejected() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, WorkerResolver::new());
        assert!(executor
            .start_run("  ", "echo", serde_json::json!({}))
            .await
            .is_err());
        assert!(executor
            .start_run("p1", "", serde_json::json!({}))
            .await
            .is_err());
    }
}
