//! Inter-call pacing for rate-limited services

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::time::Duration;
use tracing::trace;

/// Spaces consecutive calls at least `delay` apart.
///
/// The first call goes through immediately. A zero delay disables pacing.
pub struct Pacer {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    delay: Duration,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        let limiter = Quota::with_period(delay)
            .map(|quota| RateLimiter::direct(quota.allow_burst(nonzero!(1u32))));
        Self { limiter, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait until the next call is allowed
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            trace!("Pacing: up to {:?}", self.delay);
            limiter.until_ready().await;
        }
    }
}
