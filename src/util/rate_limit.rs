//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Per-peer budget for server calls arriving at the authority
#[derive(Clone)]
pub struct PeerCallLimiter {
    call_limiter: Arc<Limiter>,
}

impl PeerCallLimiter {
    pub fn new(calls_per_second: u32) -> Self {
        Self {
            call_limiter: create_limiter(calls_per_second),
        }
    }

    /// Check if another server call is allowed (returns true if allowed)
    pub fn check_call(&self) -> bool {
        self.call_limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_quota_is_refused() {
        let limiter = PeerCallLimiter::new(3);
        assert!(limiter.check_call());
        assert!(limiter.check_call());
        assert!(limiter.check_call());
        assert!(!limiter.check_call());
    }
}
