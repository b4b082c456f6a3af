//! Per-backend token-bucket rate limiter.
//!
//! Waits are cancellable: a cancelled token unblocks the waiter with
//! `Error::Cancelled` instead of holding it until a slot frees up.

use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::Error;

type DirectLimiter = GovLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Token bucket scoped to one outbound backend.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    name: String,
    limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    /// Create a limiter allowing `per_sec` requests per second.
    ///
    /// A zero rate is a configuration error.
    pub fn per_second(name: &str, per_sec: u32) -> Result<Self, Error> {
        let rate = NonZeroU32::new(per_sec).ok_or_else(|| {
            Error::Config(format!("rate limit for {name} must be > 0 requests/sec"))
        })?;

        Ok(Self {
            name: name.to_string(),
            limiter: Arc::new(GovLimiter::direct(Quota::per_second(rate))),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until a slot is available or the token is cancelled.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), Error> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(limiter = %self.name, "Rate limit wait cancelled");
                Err(Error::Cancelled)
            }
            _ = self.limiter.until_ready() => Ok(()),
        }
    }

    /// Try to take a slot without waiting. Returns true if acquired.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}
