//! Scheduler properties: closure coverage, capacity, ordering, credits.

use async_trait::async_trait;
use loom_gateway::schedule::{
    plan_chunks, ChunkRunner, PermitBroker, PermitLease, Scheduler, TaskContext,
};
use loom_gateway::{GatewayResult, TaskGraph, TaskNode};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Random DAG: node i may only depend on nodes < i, so it is acyclic by
/// construction.
fn dag_strategy() -> impl Strategy<Value = TaskGraph> {
    prop::collection::vec((1u64..20, prop::collection::vec(any::<prop::sample::Index>(), 0..3)), 1..24)
        .prop_map(|shape| {
            let nodes = shape
                .iter()
                .enumerate()
                .map(|(i, (weight, dep_picks))| {
                    let deps: Vec<usize> = if i == 0 {
                        Vec::new()
                    } else {
                        let mut deps: Vec<usize> =
                            dep_picks.iter().map(|pick| pick.index(i)).collect();
                        deps.sort_unstable();
                        deps.dedup();
                        deps
                    };
                    TaskNode::with_deps(*weight, deps)
                })
                .collect();
            TaskGraph::new(nodes)
        })
}

proptest! {
    /// Every node in closure(targets) appears in exactly one chunk; every
    /// chunk's weight fits the capacity except singleton oversize chunks;
    /// dependencies precede their dependents.
    #[test]
    fn chunk_plan_invariants(
        graph in dag_strategy(),
        capacity in 1u64..40,
        target_picks in prop::collection::vec(any::<prop::sample::Index>(), 1..4),
    ) {
        let targets: Vec<usize> = {
            let mut t: Vec<usize> = target_picks
                .iter()
                .map(|pick| pick.index(graph.nodes.len()))
                .collect();
            t.sort_unstable();
            t.dedup();
            t
        };
        let chunks = plan_chunks(&graph, &targets, capacity).unwrap();

        // Exactly-once coverage of the closure.
        let closure = graph.closure(&targets).unwrap();
        let mut seen = HashSet::new();
        for chunk in &chunks {
            for &node in &chunk.nodes {
                prop_assert!(closure.contains(&node));
                prop_assert!(seen.insert(node), "node {} scheduled twice", node);
            }
        }
        prop_assert_eq!(seen.len(), closure.len());

        // Capacity, except single oversize nodes.
        for chunk in &chunks {
            if chunk.len() > 1 {
                prop_assert!(chunk.weight <= capacity);
            }
        }

        // Dependencies appear in strictly earlier chunks.
        let mut chunk_of = std::collections::HashMap::new();
        for (index, chunk) in chunks.iter().enumerate() {
            for &node in &chunk.nodes {
                chunk_of.insert(node, index);
            }
        }
        for (&node, &chunk_index) in &chunk_of {
            for dep in &graph.nodes[node].deps {
                if closure.contains(dep) {
                    prop_assert!(chunk_of[dep] < chunk_index);
                }
            }
        }
    }
}

struct CountingRunner {
    ran: Mutex<Vec<usize>>,
}

#[async_trait]
impl ChunkRunner for CountingRunner {
    async fn run_chunk(
        &self,
        _ctx: TaskContext,
        chunk: &loom_gateway::schedule::Chunk,
    ) -> GatewayResult<()> {
        self.ran.lock().extend(chunk.nodes.iter().copied());
        Ok(())
    }
}

#[tokio::test]
async fn execution_covers_closure_with_parallel_dispatch() {
    let graph = TaskGraph::new(vec![
        TaskNode::leaf(3),
        TaskNode::leaf(4),
        TaskNode::with_deps(2, vec![0]),
        TaskNode::with_deps(2, vec![1]),
        TaskNode::with_deps(1, vec![2, 3]),
    ]);
    let runner = Arc::new(CountingRunner {
        ran: Mutex::new(Vec::new()),
    });
    let outcome = Scheduler::new(4, 3)
        .execute(&TaskContext::new("run-1"), &graph, &[4], runner.clone())
        .await
        .unwrap();

    assert!(outcome.is_clean());
    let mut ran = runner.ran.lock().clone();
    ran.sort_unstable();
    assert_eq!(ran, vec![0, 1, 2, 3, 4]);
}

struct StrictBroker;

#[async_trait]
impl PermitBroker for StrictBroker {
    async fn reserve(
        &self,
        _token: &loom_gateway::concurrency::CancelToken,
        n: u32,
    ) -> GatewayResult<PermitLease> {
        Ok(PermitLease::new(n))
    }
}

struct CreditAuditRunner;

#[async_trait]
impl ChunkRunner for CreditAuditRunner {
    async fn run_chunk(
        &self,
        ctx: TaskContext,
        chunk: &loom_gateway::schedule::Chunk,
    ) -> GatewayResult<()> {
        // The custom reserve function granted 2 credits per node.
        for _ in 0..(chunk.len() * 2) {
            if !ctx.take_credit() {
                return Err(loom_gateway::GatewayError::Internal(
                    "credit shortfall".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn reserve_with_overrides_permit_count() {
    let graph = TaskGraph::new(vec![TaskNode::leaf(1), TaskNode::leaf(1), TaskNode::leaf(1)]);
    let scheduler = Scheduler::new(10, 2)
        .with_broker(Arc::new(StrictBroker))
        .with_reserve_with(Arc::new(|chunk| (chunk.len() * 2) as u32));
    let outcome = scheduler
        .execute(
            &TaskContext::new("run-1"),
            &graph,
            &[0, 1, 2],
            Arc::new(CreditAuditRunner),
        )
        .await
        .unwrap();
    assert!(outcome.is_clean(), "notes: {:?}", outcome.node_notes);
}
