//! Rolling window of recent attempt outcomes.

use std::collections::VecDeque;

/// The last `capacity` outcomes as success flags, with a running success count.
#[derive(Debug, Clone)]
pub struct SuccessWindow {
    samples: VecDeque<bool>,
    capacity: usize,
    successes: usize,
}

impl SuccessWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            successes: 0,
        }
    }

    /// Adds a sample, evicting the oldest one when full.
    pub fn push(&mut self, success: bool) {
        if self.samples.len() == self.capacity {
            if let Some(true) = self.samples.pop_front() {
                self.successes -= 1;
            }
        }
        self.samples.push_back(success);
        if success {
            self.successes += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Success fraction in [0.0, 1.0]; `None` while empty.
    pub fn rate(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.successes as f64 / self.samples.len() as f64)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.successes = 0;
    }
}
