//! Weighted DAG scheduler
//!
//! Chunks a DAG of worker tasks under a token budget, reserves permits from
//! a broker per chunk, injects the reserved credits into each chunk's task
//! context, and dispatches chunks with bounded parallelism. Chunks on
//! independent DAG branches overlap; a chunk waits only for the chunks its
//! nodes depend on.

mod chunk;
mod permit;

pub use chunk::{plan_chunks, Chunk, TaskGraph, TaskNode};
pub use permit::{
    acquire_quota, direct_limiter, CreditPool, DirectLimiter, PermitBroker, PermitLease,
    RateLimitBroker,
};

use crate::concurrency::CancelToken;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Per-task execution context threaded through workers and middleware
#[derive(Clone)]
pub struct TaskContext {
    /// Owning run
    pub run_id: String,
    /// Cancellation scope for this task tree
    pub cancel: CancelToken,
    /// Pre-reserved quota credits, when a chunk reservation applies
    pub credits: Option<Arc<CreditPool>>,
    /// Model tier hint forwarded to the provider client
    pub model_tier: Option<String>,
}

impl TaskContext {
    /// Root context for a run
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            cancel: CancelToken::new(),
            credits: None,
            model_tier: None,
        }
    }

    /// Derive a context carrying a credit pool
    pub fn with_credits(&self, credits: Arc<CreditPool>) -> Self {
        let mut ctx = self.clone();
        ctx.credits = Some(credits);
        ctx
    }

    /// Derive a context carrying a model tier hint
    pub fn with_model_tier(&self, tier: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.model_tier = Some(tier.into());
        ctx
    }

    /// Atomically consume one pre-reserved credit; false when none remain
    pub fn take_credit(&self) -> bool {
        self.credits.as_deref().map(CreditPool::take).unwrap_or(false)
    }
}

/// Executes one packed chunk of task nodes.
#[async_trait]
pub trait ChunkRunner: Send + Sync {
    /// Run every node in `chunk`. The context carries the chunk's credits.
    async fn run_chunk(&self, ctx: TaskContext, chunk: &Chunk) -> GatewayResult<()>;
}

/// Computes the permit count to reserve for a chunk; defaults to its length
pub type ReserveWith = Arc<dyn Fn(&Chunk) -> u32 + Send + Sync>;

/// Outcome of one scheduled DAG execution
#[derive(Debug, Default)]
pub struct ScheduleOutcome {
    /// Number of chunks dispatched
    pub chunks: usize,
    /// Per-node failure notes; a chunk-runner error is recorded against
    /// every node in the chunk
    pub node_notes: HashMap<usize, String>,
}

impl ScheduleOutcome {
    /// Whether every chunk completed without error
    pub fn is_clean(&self) -> bool {
        self.node_notes.is_empty()
    }
}

/// Chunking, permit, and dispatch policy for one DAG execution.
pub struct Scheduler {
    capacity: u64,
    parallelism: usize,
    broker: Option<Arc<dyn PermitBroker>>,
    reserve_with: Option<ReserveWith>,
}

impl Scheduler {
    /// Create a scheduler with a chunk capacity and parallelism bound
    pub fn new(capacity: u64, parallelism: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            parallelism: parallelism.max(1),
            broker: None,
            reserve_with: None,
        }
    }

    /// Attach a permit broker consulted once per chunk
    pub fn with_broker(mut self, broker: Arc<dyn PermitBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Override the per-chunk permit computation (default: chunk length)
    pub fn with_reserve_with(mut self, f: ReserveWith) -> Self {
        self.reserve_with = Some(f);
        self
    }

    /// Execute the dependency closure of `targets` through `runner`.
    ///
    /// Failure policy: a chunk-runner error is noted against every node in
    /// the chunk and independent branches continue; nodes whose
    /// prerequisites failed are still scheduled, leaving it to downstream
    /// workers to decide whether the missing dependency is fatal.
    pub async fn execute(
        &self,
        ctx: &TaskContext,
        graph: &TaskGraph,
        targets: &[usize],
        runner: Arc<dyn ChunkRunner>,
    ) -> GatewayResult<ScheduleOutcome> {
        let chunks = plan_chunks(graph, targets, self.capacity)?;
        let mut outcome = ScheduleOutcome {
            chunks: chunks.len(),
            ..Default::default()
        };
        if chunks.is_empty() {
            return Ok(outcome);
        }

        // Map nodes to their chunk, then lift node dependencies to
        // chunk-level dependencies.
        let mut chunk_of: HashMap<usize, usize> = HashMap::new();
        for (index, chunk) in chunks.iter().enumerate() {
            for &node in &chunk.nodes {
                chunk_of.insert(node, index);
            }
        }
        let mut chunk_deps: Vec<HashSet<usize>> = vec![HashSet::new(); chunks.len()];
        for (index, chunk) in chunks.iter().enumerate() {
            for &node in &chunk.nodes {
                for dep in &graph.nodes[node].deps {
                    if let Some(&dep_chunk) = chunk_of.get(dep) {
                        if dep_chunk != index {
                            chunk_deps[index].insert(dep_chunk);
                        }
                    }
                }
            }
        }

        let mut done: HashSet<usize> = HashSet::new();
        let mut dispatched: HashSet<usize> = HashSet::new();
        let mut in_flight: JoinSet<(usize, GatewayResult<()>)> = JoinSet::new();

        while done.len() < chunks.len() {
            if ctx.cancel.is_cancelled() {
                in_flight.abort_all();
                return Err(GatewayError::Cancelled);
            }

            // Dispatch every ready chunk up to the parallelism bound.
            while in_flight.len() < self.parallelism {
                let ready = (0..chunks.len()).find(|index| {
                    !dispatched.contains(index)
                        && chunk_deps[*index].iter().all(|dep| done.contains(dep))
                });
                let Some(index) = ready else { break };
                dispatched.insert(index);

                let chunk = chunks[index].clone();
                let runner = runner.clone();
                let broker = self.broker.clone();
                let reserve_with = self.reserve_with.clone();
                let ctx = ctx.clone();
                in_flight.spawn(async move {
                    let result = run_one_chunk(ctx, chunk, runner, broker, reserve_with).await;
                    (index, result)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                // Nothing in flight and nothing ready: only possible if the
                // chunk graph lost a dependency, which plan_chunks rules out.
                break;
            };
            match joined {
                Ok((index, result)) => {
                    done.insert(index);
                    if let Err(err) = result {
                        if matches!(err, GatewayError::Cancelled) {
                            in_flight.abort_all();
                            return Err(GatewayError::Cancelled);
                        }
                        warn!(chunk = index, error = %err, "chunk execution failed");
                        for &node in &chunks[index].nodes {
                            outcome.node_notes.insert(node, err.to_string());
                        }
                    } else {
                        debug!(chunk = index, "chunk completed");
                    }
                }
                Err(join_err) => {
                    return Err(GatewayError::Internal(format!(
                        "chunk task panicked: {}",
                        join_err
                    )));
                }
            }
        }
        Ok(outcome)
    }
}

async fn run_one_chunk(
    ctx: TaskContext,
    chunk: Chunk,
    runner: Arc<dyn ChunkRunner>,
    broker: Option<Arc<dyn PermitBroker>>,
    reserve_with: Option<ReserveWith>,
) -> GatewayResult<()> {
    let ctx = match broker {
        Some(broker) => {
            let permits = reserve_with
                .map(|f| f(&chunk))
                .unwrap_or(chunk.len() as u32);
            let lease = broker.reserve(&ctx.cancel, permits).await?;
            ctx.with_credits(lease.credits())
        }
        None => ctx,
    };
    runner.run_chunk(ctx, &chunk).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingRunner {
        order: Mutex<Vec<Vec<usize>>>,
        fail_chunks_containing: Option<usize>,
    }

    #[async_trait]
    impl ChunkRunner for RecordingRunner {
        async fn run_chunk(&self, _ctx: TaskContext, chunk: &Chunk) -> GatewayResult<()> {
            self.order.lock().push(chunk.nodes.clone());
            if let Some(poison) = self.fail_chunks_containing {
                if chunk.nodes.contains(&poison) {
                    return Err(GatewayError::Transient("poisoned".to_string()));
                }
            }
            Ok(())
        }
    }

    fn diamond() -> TaskGraph {
        TaskGraph::new(vec![
            TaskNode::leaf(1),
            TaskNode::with_deps(1, vec![0]),
            TaskNode::with_deps(1, vec![0]),
            TaskNode::with_deps(1, vec![1, 2]),
        ])
    }

    #[tokio::test]
    async fn runs_every_node_in_dependency_order() {
        let runner = Arc::new(RecordingRunner {
            order: Mutex::new(Vec::new()),
            fail_chunks_containing: None,
        });
        let scheduler = Scheduler::new(1, 2);
        let ctx = TaskContext::new("run-1");
        let outcome = scheduler
            .execute(&ctx, &diamond(), &[3], runner.clone())
            .await
            .unwrap();

        assert!(outcome.is_clean());
        let order = runner.order.lock();
        let position = |node: usize| {
            order
                .iter()
                .position(|chunk| chunk.contains(&node))
                .unwrap()
        };
        assert!(position(0) < position(1));
        assert!(position(0) < position(2));
        assert!(position(1) < position(3));
        assert!(position(2) < position(3));
    }

    #[tokio::test]
    async fn failed_chunk_notes_nodes_and_continues() {
        let runner = Arc::new(RecordingRunner {
            order: Mutex::new(Vec::new()),
            fail_chunks_containing: Some(1),
        });
        // Capacity 1 forces one node per chunk.
        let scheduler = Scheduler::new(1, 1);
        let ctx = TaskContext::new("run-1");
        let outcome = scheduler
            .execute(&ctx, &diamond(), &[3], runner.clone())
            .await
            .unwrap();

        assert_eq!(outcome.node_notes.len(), 1);
        assert!(outcome.node_notes.contains_key(&1));
        // Node 3 still ran despite its failed prerequisite.
        assert!(runner.order.lock().iter().any(|c| c.contains(&3)));
    }

    struct CountingBroker {
        reservations: AtomicU32,
    }

    #[async_trait]
    impl PermitBroker for CountingBroker {
        async fn reserve(&self, _token: &CancelToken, n: u32) -> GatewayResult<PermitLease> {
            self.reservations.fetch_add(1, Ordering::SeqCst);
            Ok(PermitLease::new(n))
        }
    }

    struct CreditCheckingRunner;

    #[async_trait]
    impl ChunkRunner for CreditCheckingRunner {
        async fn run_chunk(&self, ctx: TaskContext, chunk: &Chunk) -> GatewayResult<()> {
            // One credit per node was pre-reserved for this chunk.
            for _ in &chunk.nodes {
                if !ctx.take_credit() {
                    return Err(GatewayError::Internal("missing credit".to_string()));
                }
            }
            if ctx.take_credit() {
                return Err(GatewayError::Internal("excess credit".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn broker_reserves_once_per_chunk_with_len_credits() {
        let broker = Arc::new(CountingBroker {
            reservations: AtomicU32::new(0),
        });
        let scheduler = Scheduler::new(10, 2).with_broker(broker.clone());
        let ctx = TaskContext::new("run-1");
        let graph = TaskGraph::new(vec![TaskNode::leaf(1), TaskNode::leaf(1)]);
        let outcome = scheduler
            .execute(&ctx, &graph, &[0, 1], Arc::new(CreditCheckingRunner))
            .await
            .unwrap();

        assert!(outcome.is_clean(), "notes: {:?}", outcome.node_notes);
        // Both nodes fit one chunk, so exactly one reservation.
        assert_eq!(broker.reservations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_context_aborts_execution() {
        let runner = Arc::new(RecordingRunner {
            order: Mutex::new(Vec::new()),
            fail_chunks_containing: None,
        });
        let scheduler = Scheduler::new(1, 1);
        let ctx = TaskContext::new("run-1");
        ctx.cancel.cancel();
        let err = scheduler
            .execute(&ctx, &diamond(), &[3], runner)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled));
    }
}
