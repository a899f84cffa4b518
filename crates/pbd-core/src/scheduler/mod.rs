//! Batch scheduler.
//!
//! Drives a whole batch to completion: FIFO queue of work items, adaptive
//! slot gating, one fresh proxy identity per dispatch, retry with backoff
//! that never holds a slot, and a final report. A single dispatch task owns
//! the queue, the item table and the concurrency controller; fetches run as
//! independent tasks and only hand back their outcome.

mod item;
mod progress;
mod report;
mod run;

pub use item::{ItemStatus, WorkItem};
pub use progress::ProgressStats;
pub use report::{BatchReport, ItemReport, RunStats};
pub use run::BatchScheduler;
