use crate::TokenBucket;
use std::sync::Mutex;

/// Thread safe rate limiter on top of [`TokenBucket`]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(limit: usize) -> Self {
        Self::with_burst_ratio(limit, 1.0)
    }

    pub fn with_burst_ratio(limit: usize, limit_burst_ratio: f64) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(
                (limit as f64 * limit_burst_ratio) as usize,
                limit,
            )),
        }
    }

    pub fn should_pass(&self, cost: usize) -> bool {
        self.bucket.lock().unwrap().try_consume(cost)
    }

    pub fn reset(&self, limit: usize, limit_burst_ratio: f64) {
        self.bucket
            .lock()
            .unwrap()
            .reset((limit as f64 * limit_burst_ratio) as usize, limit)
    }
}
