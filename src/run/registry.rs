//! Run registry and event fan-out
//!
//! Allocates run identifiers, owns the per-run event channel, and fans
//! events out to any number of streaming subscribers. The per-run channel
//! is written by exactly one producer (the executor task), which owns
//! close and blocks when the buffer is full; subscriber channels are
//! drop-oldest, so a slow or stalled client loses its oldest events
//! instead of stalling the producer or its sibling subscribers. When the
//! producer finishes, subscribers are closed and the run is removed from
//! the table after a grace period.

use super::events::RunEvent;
use crate::concurrency::{CancelToken, DropOldestQueue};
use crate::error::{GatewayError, GatewayResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Per-run event channel capacity; the producer blocks when it is full
pub const RUN_EVENT_BUFFER: usize = 128;
/// Subscriber queue capacity; on overflow the oldest event is dropped
const SUBSCRIBER_BUFFER: usize = 128;
/// How long a finished run stays discoverable in the table
const CLEANUP_GRACE: Duration = Duration::from_secs(5);

/// Fan-out state shared between the forwarding task and subscribers.
///
/// The bounded history enables resume-from-sequence for late subscribers:
/// a new subscriber first receives every retained event, then live ones,
/// with no gap because both paths hold the same lock.
struct FanOut {
    history: Vec<RunEvent>,
    subscribers: Vec<DropOldestQueue<RunEvent>>,
}

struct RunHandle {
    fan_out: Arc<Mutex<FanOut>>,
    finished: Arc<AtomicBool>,
    cancel: CancelToken,
}

/// Table of live runs keyed by run identifier.
pub struct RunRegistry {
    counter: AtomicU64,
    runs: RwLock<HashMap<String, RunHandle>>,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate the next run identifier
    pub fn allocate(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("run-{}", n)
    }

    /// Register a run: creates the buffered event channel and spawns the
    /// fan-out task. Returns the producer side and the run's cancellation
    /// token; dropping the producer ends the stream.
    pub fn register(self: &Arc<Self>, run_id: &str) -> (mpsc::Sender<RunEvent>, CancelToken) {
        let (tx, mut rx) = mpsc::channel::<RunEvent>(RUN_EVENT_BUFFER);
        let fan_out = Arc::new(Mutex::new(FanOut {
            history: Vec::new(),
            subscribers: Vec::new(),
        }));
        let finished = Arc::new(AtomicBool::new(false));
        let cancel = CancelToken::new();

        self.runs.write().insert(
            run_id.to_string(),
            RunHandle {
                fan_out: fan_out.clone(),
                finished: finished.clone(),
                cancel: cancel.clone(),
            },
        );

        let registry = self.clone();
        let run_id = run_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let mut shared = fan_out.lock();
                if shared.history.len() == RUN_EVENT_BUFFER {
                    shared.history.remove(0);
                }
                shared.history.push(event.clone());

                // Drop-oldest pushes never block, so one stalled consumer
                // cannot hold up the others or backpressure the producer.
                for sub in &shared.subscribers {
                    sub.push(event.clone());
                }
            }
            finished.store(true, Ordering::SeqCst);
            {
                let mut shared = fan_out.lock();
                for sub in shared.subscribers.drain(..) {
                    sub.close();
                }
            }
            debug!(%run_id, "run event channel closed");

            tokio::time::sleep(CLEANUP_GRACE).await;
            registry.runs.write().remove(&run_id);
        });

        (tx, cancel)
    }

    /// Subscribe to a run's event stream. The retained history is replayed
    /// first, then live events follow with no gap; a finished run yields
    /// its history and closes. An unknown run is an error.
    pub fn subscribe(&self, run_id: &str) -> GatewayResult<DropOldestQueue<RunEvent>> {
        let (fan_out, finished) = {
            let runs = self.runs.read();
            let handle = runs
                .get(run_id)
                .ok_or_else(|| GatewayError::RunNotFound(run_id.to_string()))?;
            (handle.fan_out.clone(), handle.finished.clone())
        };

        // History is bounded by the queue capacity, so the replay fits.
        let queue: DropOldestQueue<RunEvent> = DropOldestQueue::new(SUBSCRIBER_BUFFER);
        let mut shared = fan_out.lock();
        for event in &shared.history {
            queue.push(event.clone());
        }
        if finished.load(Ordering::SeqCst) {
            queue.close();
        } else {
            shared.subscribers.push(queue.clone());
        }
        Ok(queue)
    }

    /// Cancellation token of a live run
    pub fn cancel_token(&self, run_id: &str) -> GatewayResult<CancelToken> {
        let runs = self.runs.read();
        runs.get(run_id)
            .map(|handle| handle.cancel.clone())
            .ok_or_else(|| GatewayError::RunNotFound(run_id.to_string()))
    }

    /// Request cancellation of a live run
    pub fn cancel_run(&self, run_id: &str) -> GatewayResult<()> {
        self.cancel_token(run_id)?.cancel();
        Ok(())
    }

    /// Whether the run is still registered
    pub fn contains(&self, run_id: &str) -> bool {
        self.runs.read().contains_key(run_id)
    }

    /// Identifiers of all registered runs, sorted
    pub fn list(&self) -> Vec<String> {
        let mut runs: Vec<String> = self.runs.read().keys().cloned().collect();
        runs.sort();
        runs
    }
}
