//! Concurrency primitives
//!
//! Cooperative cancellation tokens, the close-and-rearm signal used by the
//! interaction waiter, and a bounded drop-oldest queue for slow stream
//! subscribers.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A token for cooperative task cancellation.
///
/// The token can be cloned and shared across tasks. When cancelled, all
/// instances and all child tokens are notified.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelTokenInner>,
}

#[derive(Default)]
struct CancelTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    children: RwLock<Vec<CancelToken>>,
}

impl CancelToken {
    /// Create a new cancellation token
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child token. Cancelling the parent cancels all children;
    /// cancelling a child leaves the parent untouched.
    pub fn child_token(&self) -> Self {
        let child = CancelToken::new();
        if self.is_cancelled() {
            child.cancel();
        } else {
            self.inner.children.write().push(child.clone());
        }
        child
    }

    /// Cancel this token and all children
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        let children = self.inner.children.read().clone();
        for child in children {
            child.cancel();
        }
    }

    /// Check whether this token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for this token to be cancelled. Returns immediately if already
    /// cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register interest before checking the flag so a concurrent cancel
        // between check and await cannot be missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// A closeable one-shot signal.
///
/// Firing wakes every task that obtained the handle before the fire and is
/// permanent: late waiters return immediately. Consumers of a rearming
/// broadcast clone the *current* handle under the owner's lock before
/// re-checking state; the owner swaps in a fresh [`Signal`] and fires the
/// old one, which makes notifications race-free without spurious wakeups.
#[derive(Default)]
pub struct Signal {
    fired: AtomicBool,
    notify: Notify,
}

impl Signal {
    /// Create an unfired signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, waking all current and future waiters
    pub fn fire(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether the signal has fired
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Wait for the signal to fire
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.has_fired() {
            return;
        }
        notified.await;
    }
}

/// Bounded queue that drops its oldest element when full.
///
/// The push side never blocks: when the buffer holds `capacity` elements,
/// the head is popped before the new element is appended. This preserves
/// latest-state semantics under slow consumers.
pub struct DropOldestQueue<T> {
    inner: Arc<QueueInner<T>>,
}

struct QueueInner<T> {
    buf: Mutex<VecDeque<T>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
}

impl<T> Clone for DropOldestQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> DropOldestQueue<T> {
    /// Create a queue holding at most `capacity` elements
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                buf: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Append an element, discarding the oldest one if the queue is full.
    /// Pushes after close are ignored.
    pub fn push(&self, item: T) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut buf = self.inner.buf.lock();
            if buf.len() == self.inner.capacity {
                buf.pop_front();
            }
            buf.push_back(item);
        }
        self.inner.notify.notify_waiters();
    }

    /// Receive the next element, or `None` once the queue is closed and
    /// drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.inner.buf.lock().pop_front() {
                return Some(item);
            }
            if self.inner.closed.load(Ordering::SeqCst) {
                return None;
            }
            notified.await;
        }
    }

    /// Close the queue; pending elements remain receivable
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Current queue depth
    pub fn len(&self) -> usize {
        self.inner.buf.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
