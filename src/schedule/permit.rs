//! Permits and credits
//!
//! The scheduler pre-pays the cost of an entire chunk in one reservation
//! against the external quota system, then attaches the reserved amount to
//! the chunk's task context as atomically-decrementable credits. Rate-limit
//! middleware consumes a credit before falling back to the shared
//! token-bucket limiter, so pre-reserved work is never double-charged.

use crate::concurrency::CancelToken;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared direct (unkeyed) token-bucket limiter
pub type DirectLimiter = governor::DefaultDirectRateLimiter;

/// Build the process-wide provider limiter from a refill rate.
pub fn direct_limiter(requests_per_second: u32) -> Arc<DirectLimiter> {
    let rate = NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_second(rate)))
}

/// A pool of pre-reserved quota credits
#[derive(Debug)]
pub struct CreditPool {
    remaining: AtomicU32,
}

impl CreditPool {
    /// Create a pool holding `n` credits
    pub fn new(n: u32) -> Self {
        Self {
            remaining: AtomicU32::new(n),
        }
    }

    /// Atomically take one credit; false when the pool is empty
    pub fn take(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            })
            .is_ok()
    }

    /// Credits left in the pool
    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }
}

/// A granted reservation of `n` permits
#[derive(Debug)]
pub struct PermitLease {
    permits: u32,
}

impl PermitLease {
    /// Create a lease over `n` permits
    pub fn new(permits: u32) -> Self {
        Self { permits }
    }

    /// Number of permits in the lease
    pub fn permits(&self) -> u32 {
        self.permits
    }

    /// Materialize the lease as a credit pool for a task context
    pub fn credits(&self) -> Arc<CreditPool> {
        Arc::new(CreditPool::new(self.permits))
    }
}

/// External quota reservation.
#[async_trait]
pub trait PermitBroker: Send + Sync {
    /// Reserve `n` permits, blocking until the quota system grants them.
    /// Cancellation aborts the wait with [`GatewayError::Cancelled`].
    async fn reserve(&self, token: &CancelToken, n: u32) -> GatewayResult<PermitLease>;
}

/// Broker backed by the shared token-bucket limiter: a reservation drains
/// `n` cells from the same bucket individual calls would otherwise hit.
pub struct RateLimitBroker {
    limiter: Arc<DirectLimiter>,
}

impl RateLimitBroker {
    /// Create a broker over an existing limiter
    pub fn new(limiter: Arc<DirectLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl PermitBroker for RateLimitBroker {
    async fn reserve(&self, token: &CancelToken, n: u32) -> GatewayResult<PermitLease> {
        let n = n.max(1);
        let cells = NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN);
        tokio::select! {
            result = self.limiter.until_n_ready(cells) => match result {
                Ok(()) => Ok(PermitLease::new(n)),
                Err(err) => Err(GatewayError::InvalidArgument(format!(
                    "reservation of {} permits exceeds limiter burst: {}",
                    n, err
                ))),
            },
            _ = token.cancelled() => Err(GatewayError::Cancelled),
        }
    }
}

/// Consume one credit from the context pool if present, otherwise wait on
/// the shared limiter. This is the single entry point rate-limited
/// middleware goes through before a provider call.
pub async fn acquire_quota(
    credits: Option<&CreditPool>,
    limiter: &DirectLimiter,
    token: &CancelToken,
) -> GatewayResult<()> {
    if let Some(pool) = credits {
        if pool.take() {
            return Ok(());
        }
    }
    tokio::select! {
        _ = limiter.until_ready() => Ok(()),
        _ = token.cancelled() => Err(GatewayError::Cancelled),
    }
}
