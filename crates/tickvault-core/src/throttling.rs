use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide request budget shared by every worker that talks to the provider.
#[derive(Clone)]
pub struct RequestThrottle {
    limiter: Option<Arc<DirectRateLimiter>>,
}

impl RequestThrottle {
    /// Allows `per_second` requests per second with a burst of the same size.
    pub fn per_second(per_second: u32) -> Self {
        let Some(rate) = NonZeroU32::new(per_second) else {
            return Self::unlimited();
        };
        Self {
            limiter: Some(Arc::new(RateLimiter::direct(
                Quota::per_second(rate).allow_burst(rate),
            ))),
        }
    }

    pub fn unlimited() -> Self {
        Self { limiter: None }
    }

    /// Waits until one request worth of budget is available.
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Takes one unit of budget if immediately available.
    pub fn try_acquire(&self) -> bool {
        self.limiter
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }
}

impl Default for RequestThrottle {
    fn default() -> Self {
        Self::per_second(100)
    }
}

impl std::fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestThrottle")
            .field("limited", &self.limiter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_bounded_by_rate() {
        let throttle = RequestThrottle::per_second(2);

        assert!(throttle.try_acquire());
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());
    }

    #[test]
    fn zero_rate_means_unlimited() {
        let throttle = RequestThrottle::per_second(0);
        for _ in 0..1_000 {
            assert!(throttle.try_acquire());
        }
    }

    #[tokio::test]
    async fn unlimited_throttle_never_waits() {
        let throttle = RequestThrottle::unlimited();
        for _ in 0..100 {
            throttle.until_ready().await;
        }
    }
}
