//! Final accounting for a batch run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use super::item::{ItemStatus, WorkItem};
use crate::concurrency::SlotTransition;

/// Terminal record of one item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub url: String,
    pub status: ItemStatus,
    pub attempts: u32,
    /// Reason of the last failure (failed items only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl From<&WorkItem> for ItemReport {
    fn from(item: &WorkItem) -> Self {
        Self {
            url: item.url().to_string(),
            status: item.status(),
            attempts: item.attempts(),
            failure: item.failure().map(ToString::to_string),
        }
    }
}

/// Run-wide counters collected by the scheduler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Proxy identities issued (one per attempt).
    pub sessions_created: u64,
    pub total_attempts: u64,
    pub concurrency_adjustments: usize,
    /// Highest permitted slot count during the run.
    pub peak_concurrency: usize,
    pub final_concurrency: usize,
    /// Highest number of attempts actually running at once.
    pub peak_in_flight: usize,
    pub transitions: Vec<SlotTransition>,
    pub elapsed_secs: f64,
}

/// Result of a batch: one entry per input URL, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// True when the run was stopped before every item finished on its own.
    pub cancelled: bool,
    pub items: Vec<ItemReport>,
    pub stats: RunStats,
}

impl BatchReport {
    pub(crate) fn from_items(items: &[WorkItem], cancelled: bool, stats: RunStats) -> Self {
        let items: Vec<ItemReport> = items.iter().map(ItemReport::from).collect();
        let succeeded = items
            .iter()
            .filter(|i| i.status == ItemStatus::Succeeded)
            .count();
        let failed = items
            .iter()
            .filter(|i| i.status == ItemStatus::Failed)
            .count();
        Self {
            total: items.len(),
            succeeded,
            failed,
            cancelled,
            items,
            stats,
        }
    }

    /// Share of items that succeeded. An empty batch counts as fully successful.
    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.total as f64
    }

    pub fn meets_threshold(&self, min_success_ratio: f64) -> bool {
        self.success_ratio() >= min_success_ratio
    }

    pub fn failed_items(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::Failed)
    }

    /// Terminal items per minute of wall time (0 if elapsed is 0).
    pub fn items_per_minute(&self) -> f64 {
        if self.stats.elapsed_secs <= 0.0 {
            return 0.0;
        }
        (self.succeeded + self.failed) as f64 / self.stats.elapsed_secs * 60.0
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize batch report")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("write report to {}", path.display()))
    }
}
