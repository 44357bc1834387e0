use std::collections::VecDeque;

/// Ratio of successful pulls below which the service is considered throttled
const LOWER_WATERMARK: f64 = 1.0 / 16.0;

/// Tracks whether the most recent pull responses carried new blocks.
/// The window has to be completely filled before throttling kicks in, so a
/// freshly started or resized throttle never stalls the workers.
pub struct Throttle {
    samples: VecDeque<bool>,
    successes: usize,
    capacity: usize,
}

impl Throttle {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            samples: VecDeque::with_capacity(capacity),
            successes: 0,
            capacity,
        }
    }

    pub fn add(&mut self, success: bool) {
        if self.samples.len() >= self.capacity {
            self.pop();
        }
        self.samples.push_back(success);
        if success {
            self.successes += 1;
        }
    }

    pub fn throttled(&self) -> bool {
        self.samples.len() == self.capacity
            && (self.successes as f64) < self.capacity as f64 * LOWER_WATERMARK
    }

    /// Keeps the most recent samples when shrinking
    pub fn resize(&mut self, capacity: usize) {
        debug_assert!(capacity > 0);
        self.capacity = capacity;
        while self.samples.len() > capacity {
            self.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn successes(&self) -> usize {
        self.successes
    }

    fn pop(&mut self) {
        if let Some(oldest) = self.samples.pop_front() {
            if oldest {
                self.successes -= 1;
            }
        }
    }
}
