//! Progress snapshots for the batch (items done, success share, rate).
//!
//! Sent by the scheduler after every item that reaches a terminal status;
//! consumers decide how often to print.

/// Snapshot of batch progress (CLI-friendly).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    /// Items that reached a terminal status.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
    /// Permitted slots at the time of the snapshot.
    pub concurrency: usize,
    /// Identities issued so far (one per attempt).
    pub sessions_created: u64,
    /// Elapsed time since the batch started (seconds).
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Share of processed items that succeeded, in [0.0, 1.0].
    pub fn success_ratio(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.processed as f64
    }

    /// Processed items per minute (0 if elapsed is 0).
    pub fn items_per_minute(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.processed as f64 / self.elapsed_secs * 60.0
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios() {
        let p = ProgressStats {
            processed: 10,
            succeeded: 8,
            failed: 2,
            total: 20,
            concurrency: 4,
            sessions_created: 13,
            elapsed_secs: 30.0,
        };
        assert!((p.success_ratio() - 0.8).abs() < 1e-9);
        assert!((p.items_per_minute() - 20.0).abs() < 1e-9);
        assert!(!p.is_complete());
    }
}
