#[cfg(test)]
use mock_instant::thread_local::Instant;
#[cfg(not(test))]
use std::time::Instant;

/// Refill-on-demand token bucket. Tokens accrue continuously at
/// `refill_rate` per second and cap out at `capacity`, which bounds how
/// large a burst can get. A zero capacity or rate disables limiting.
pub struct TokenBucket {
    limit: Option<Limit>,
}

struct Limit {
    capacity: f64,
    refill_rate: f64,
    available: f64,
    updated: Instant,
}

impl TokenBucket {
    pub fn new(capacity: usize, refill_rate: usize) -> Self {
        let mut bucket = Self { limit: None };
        bucket.reset(capacity, refill_rate);
        bucket
    }

    /// Takes `cost` tokens out of the bucket if they are available
    pub fn try_consume(&mut self, cost: usize) -> bool {
        let Some(limit) = &mut self.limit else {
            return true;
        };

        limit.refill();
        if limit.available < cost as f64 {
            return false;
        }
        limit.available -= cost as f64;
        true
    }

    /// Replaces the bucket parameters. The new bucket starts out full.
    pub fn reset(&mut self, capacity: usize, refill_rate: usize) {
        self.limit = if capacity == 0 || refill_rate == 0 {
            None
        } else {
            Some(Limit {
                capacity: capacity as f64,
                refill_rate: refill_rate as f64,
                available: capacity as f64,
                updated: Instant::now(),
            })
        };
    }
}

impl Limit {
    fn refill(&mut self) {
        let now = Instant::now();
        let accrued = now.duration_since(self.updated).as_secs_f64() * self.refill_rate;
        self.available = (self.available + accrued).min(self.capacity);
        self.updated = now;
    }
}
