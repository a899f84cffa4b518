//! Work items and their lifecycle.

use serde::Serialize;

use crate::fetch::FailureReason;

/// Lifecycle state of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Succeeded | ItemStatus::Failed)
    }
}

/// One source URL tracked from seeding to a terminal status.
#[derive(Debug, Clone)]
pub struct WorkItem {
    url: String,
    attempts: u32,
    status: ItemStatus,
    failure: Option<FailureReason>,
}

impl WorkItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attempts: 0,
            status: ItemStatus::Pending,
            failure: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Attempts dispatched so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    /// Reason of the terminal failure, if the item failed.
    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    /// Pending → InFlight; counts the attempt.
    pub(crate) fn begin_attempt(&mut self) {
        debug_assert_eq!(self.status, ItemStatus::Pending, "dispatching {}", self.url);
        self.status = ItemStatus::InFlight;
        self.attempts += 1;
    }

    /// InFlight → Pending (waiting for its backoff to expire).
    pub(crate) fn requeue(&mut self) {
        debug_assert_eq!(self.status, ItemStatus::InFlight);
        self.status = ItemStatus::Pending;
    }

    pub(crate) fn succeed(&mut self) {
        debug_assert!(!self.status.is_terminal());
        self.status = ItemStatus::Succeeded;
        self.failure = None;
    }

    pub(crate) fn fail(&mut self, reason: FailureReason) {
        debug_assert!(!self.status.is_terminal());
        self.status = ItemStatus::Failed;
        self.failure = Some(reason);
    }
}
