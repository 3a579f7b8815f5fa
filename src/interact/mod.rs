//! Interaction waiter
//!
//! Coordinates cooperative handoffs between a worker (producer of prompts,
//! consumer of user input) and external clients (producers of input,
//! consumers of output) within a single run. Per-run state is created
//! lazily on first reference and never auto-destroyed; `close` marks it
//! terminal.
//!
//! A single mutex guards all per-run state. The change broadcast is a
//! close-and-rearm [`Signal`]: notifying swaps in a fresh handle and fires
//! the prior one, and consumers clone the current handle under the lock
//! before re-checking state, so no notification can be lost.

mod conversation;

pub use conversation::{ConversationMessage, ConversationSnapshot, Role};

use crate::artifact::ArtifactStore;
use crate::concurrency::{CancelToken, DropOldestQueue, Signal};
use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Subscriber channel capacity; on overflow the oldest event is dropped
const SUBSCRIBER_BUFFER: usize = 8;

/// Snapshot of a run's wait state
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WaitState {
    /// Whether the worker is blocked on user input (false once closed)
    pub waiting: bool,
    /// Current interaction id
    pub interaction_id: String,
    /// Whether the run's interaction state is terminal
    pub closed: bool,
}

/// One worker-produced output message
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OutputMessage {
    /// Interaction the message belongs to
    pub interaction_id: String,
    /// Assistant message body
    pub message: String,
}

/// Event emitted to interaction subscribers
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionEvent {
    /// Wait-state changed (or initial state on subscribe)
    State(WaitState),
    /// Assistant output message
    Assistant(OutputMessage),
}

struct RunInteraction {
    interaction_id: String,
    closed: bool,
    waiting: bool,
    inputs: VecDeque<String>,
    outputs: VecDeque<OutputMessage>,
    conversation: Vec<ConversationMessage>,
    next_seq: u64,
    changed: Arc<Signal>,
    updated_at: DateTime<Utc>,
}

impl RunInteraction {
    fn new() -> Self {
        Self {
            interaction_id: String::new(),
            closed: false,
            waiting: false,
            inputs: VecDeque::new(),
            outputs: VecDeque::new(),
            conversation: Vec::new(),
            next_seq: 0,
            changed: Arc::new(Signal::new()),
            updated_at: Utc::now(),
        }
    }

    fn wait_state(&self) -> WaitState {
        WaitState {
            waiting: self.waiting && !self.closed,
            interaction_id: self.interaction_id.clone(),
            closed: self.closed,
        }
    }

    /// Swap in a fresh signal and fire the prior one, waking everyone who
    /// grabbed a handle before this change.
    fn broadcast(&mut self) {
        let fired = std::mem::replace(&mut self.changed, Arc::new(Signal::new()));
        fired.fire();
        self.updated_at = Utc::now();
    }

    fn append_message(&mut self, role: Role, content: String, interaction_id: String) {
        self.conversation.push(ConversationMessage {
            seq: self.next_seq,
            role,
            content,
            interaction_id,
            created_at_unix_ms: Utc::now().timestamp_millis(),
        });
        self.next_seq += 1;
    }

    fn snapshot(&self, run_id: &str) -> ConversationSnapshot {
        ConversationSnapshot {
            run_id: run_id.to_string(),
            messages: self.conversation.clone(),
        }
    }
}

/// Per-run coordination point for user-input handoffs.
pub struct InteractionWaiter {
    artifacts: Arc<dyn ArtifactStore>,
    conversation_path: String,
    runs: Mutex<HashMap<String, RunInteraction>>,
    // Serializes background snapshot writes per run; the guarded value is
    // the message count of the last persisted snapshot, so a stale write
    // can never clobber a newer one.
    persist_locks: dashmap::DashMap<String, Arc<tokio::sync::Mutex<usize>>>,
}

impl InteractionWaiter {
    /// Create a waiter persisting conversation snapshots through `artifacts`
    /// at the configured repo-relative path.
    pub fn new(artifacts: Arc<dyn ArtifactStore>, conversation_path: impl Into<String>) -> Self {
        Self {
            artifacts,
            conversation_path: conversation_path.into(),
            runs: Mutex::new(HashMap::new()),
            persist_locks: dashmap::DashMap::new(),
        }
    }

    /// Block until user input arrives for `run_id`.
    ///
    /// Sets the waiting flag, then repeatedly pops the input queue (skipping
    /// empty strings). Returns [`GatewayError::Cancelled`] if the run closes
    /// or the token cancels; cancellation also unsets the waiting flag.
    pub async fn wait_for_input(&self, token: &CancelToken, run_id: &str) -> GatewayResult<String> {
        loop {
            let signal = {
                let mut runs = self.runs.lock();
                let state = runs
                    .entry(run_id.to_string())
                    .or_insert_with(RunInteraction::new);
                state.waiting = true;

                while let Some(input) = state.inputs.pop_front() {
                    if input.is_empty() {
                        continue;
                    }
                    state.waiting = false;
                    state.broadcast();
                    return Ok(input);
                }
                if state.closed {
                    state.waiting = false;
                    return Err(GatewayError::Cancelled);
                }
                // Clone the current handle before releasing the lock so a
                // broadcast between unlock and await cannot be missed.
                state.changed.clone()
            };

            tokio::select! {
                _ = signal.wait() => {}
                _ = token.cancelled() => {
                    let mut runs = self.runs.lock();
                    if let Some(state) = runs.get_mut(run_id) {
                        state.waiting = false;
                    }
                    return Err(GatewayError::Cancelled);
                }
            }
        }
    }

    /// Enqueue user input for a run. Returns false when the run's
    /// interaction state is already closed.
    ///
    /// The input is trimmed before it is queued and logged; the trimmed form
    /// is the canonical persisted content.
    pub fn send(&self, run_id: &str, input: &str, interaction_id: Option<&str>) -> bool {
        let snapshot = {
            let mut runs = self.runs.lock();
            let state = runs
                .entry(run_id.to_string())
                .or_insert_with(RunInteraction::new);
            if state.closed {
                return false;
            }

            let interaction_id = match interaction_id.map(str::trim).filter(|s| !s.is_empty()) {
                Some(id) => id.to_string(),
                None => mint_interaction_id(),
            };
            state.interaction_id = interaction_id.clone();

            let trimmed = input.trim().to_string();
            state.inputs.push_back(trimmed.clone());
            state.append_message(Role::User, trimmed, interaction_id);
            state.waiting = false;
            state.broadcast();
            state.snapshot(run_id)
        };
        self.persist(snapshot);
        true
    }

    /// Publish an assistant message to subscribers and the conversation log.
    pub fn publish_output(&self, run_id: &str, interaction_id: Option<&str>, message: &str) {
        let snapshot = {
            let mut runs = self.runs.lock();
            let state = runs
                .entry(run_id.to_string())
                .or_insert_with(RunInteraction::new);

            let interaction_id = match interaction_id.map(str::trim).filter(|s| !s.is_empty()) {
                Some(id) => id.to_string(),
                None if !state.interaction_id.is_empty() => state.interaction_id.clone(),
                None => mint_interaction_id(),
            };

            state.outputs.push_back(OutputMessage {
                interaction_id: interaction_id.clone(),
                message: message.to_string(),
            });
            state.append_message(Role::Assistant, message.to_string(), interaction_id);
            state.broadcast();
            state.snapshot(run_id)
        };
        self.persist(snapshot);
    }

    /// Current wait state, optionally blocking up to `timeout_ms` for it to
    /// change. On timeout the then-current snapshot is returned with
    /// `waiting` forced false.
    pub async fn wait(&self, run_id: &str, timeout_ms: i64) -> WaitState {
        let (state, signal) = {
            let mut runs = self.runs.lock();
            let s = runs
                .entry(run_id.to_string())
                .or_insert_with(RunInteraction::new);
            (s.wait_state(), s.changed.clone())
        };
        if timeout_ms <= 0 {
            return state;
        }

        let window = Duration::from_millis(timeout_ms as u64);
        match tokio::time::timeout(window, signal.wait()).await {
            Ok(()) => {
                let runs = self.runs.lock();
                runs.get(run_id)
                    .map(|s| s.wait_state())
                    .unwrap_or(state)
            }
            Err(_) => {
                let runs = self.runs.lock();
                let mut current = runs
                    .get(run_id)
                    .map(|s| s.wait_state())
                    .unwrap_or(state);
                current.waiting = false;
                current
            }
        }
    }

    /// Subscribe to a run's interaction events.
    ///
    /// Emits the initial wait state, then on each broadcast re-emits the
    /// wait state and drains pending assistant messages. The channel buffers
    /// eight events with a drop-oldest overflow policy and closes when the
    /// token cancels.
    pub fn subscribe(
        self: &Arc<Self>,
        token: CancelToken,
        run_id: &str,
    ) -> DropOldestQueue<InteractionEvent> {
        let queue: DropOldestQueue<InteractionEvent> = DropOldestQueue::new(SUBSCRIBER_BUFFER);
        let waiter = self.clone();
        let run_id = run_id.to_string();
        let out = queue.clone();

        tokio::spawn(async move {
            // Initial state.
            let signal = {
                let mut runs = waiter.runs.lock();
                let state = runs
                    .entry(run_id.clone())
                    .or_insert_with(RunInteraction::new);
                out.push(InteractionEvent::State(state.wait_state()));
                state.changed.clone()
            };
            let mut signal = signal;

            loop {
                tokio::select! {
                    _ = signal.wait() => {}
                    _ = token.cancelled() => {
                        out.close();
                        return;
                    }
                }
                let (state, outputs, next) = {
                    let mut runs = waiter.runs.lock();
                    let s = runs
                        .entry(run_id.clone())
                        .or_insert_with(RunInteraction::new);
                    let outputs: Vec<OutputMessage> = s.outputs.drain(..).collect();
                    (s.wait_state(), outputs, s.changed.clone())
                };
                out.push(InteractionEvent::State(state));
                for message in outputs {
                    out.push(InteractionEvent::Assistant(message));
                }
                signal = next;
            }
        });
        queue
    }

    /// Mark a run's interaction state terminal and wake everyone.
    pub fn close(&self, run_id: &str, interaction_id: Option<&str>) {
        let mut runs = self.runs.lock();
        let state = runs
            .entry(run_id.to_string())
            .or_insert_with(RunInteraction::new);
        if let Some(id) = interaction_id.map(str::trim).filter(|s| !s.is_empty()) {
            state.interaction_id = id.to_string();
        }
        state.closed = true;
        state.waiting = false;
        state.broadcast();
    }

    /// When the run last changed
    pub fn updated_at(&self, run_id: &str) -> Option<DateTime<Utc>> {
        self.runs.lock().get(run_id).map(|s| s.updated_at)
    }

    /// Persist a conversation snapshot in the background. Failures are
    /// logged and never surfaced to the originating call.
    fn persist(&self, snapshot: ConversationSnapshot) {
        let artifacts = self.artifacts.clone();
        let path = self.conversation_path.clone();
        let lock = self
            .persist_locks
            .entry(snapshot.run_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(0)))
            .clone();
        tokio::spawn(async move {
            let run_id = snapshot.run_id.clone();
            let mut persisted = lock.lock().await;
            if snapshot.messages.len() <= *persisted {
                return;
            }
            let bytes = snapshot.to_bytes();
            match artifacts.put(&run_id, &path, &bytes).await {
                Ok(()) => {
                    *persisted = snapshot.messages.len();
                    debug!(%run_id, "conversation snapshot persisted");
                }
                Err(err) => {
                    warn!(%run_id, error = %err, "conversation snapshot persist failed")
                }
            }
        });
    }
}

fn mint_interaction_id() -> String {
    Uuid::new_v4().to_string()
}
