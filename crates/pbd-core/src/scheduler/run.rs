//! Dispatch loop: FIFO queue, slot gating, backoff queue and completion handling.
//!
//! Everything mutable lives on the task that calls [`BatchScheduler::run`].
//! Attempts are spawned into a `JoinSet` and report back only their outcome,
//! so each completion is fully handled before its slot can be handed out again.

use anyhow::Result;
use std::collections::{HashSet, VecDeque};
use std::future::poll_fn;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;

use super::item::WorkItem;
use super::progress::ProgressStats;
use super::report::{BatchReport, RunStats};
use crate::concurrency::ConcurrencyController;
use crate::fetch::{FailureReason, Fetcher, Outcome};
use crate::identity::{IdentitySource, ProxyIdentity};
use crate::retry::{RetryDecision, RetryPolicy};

/// Slack on top of the fetch timeout before an attempt is abandoned. The fetcher
/// enforces the deadline itself; this only guards against a fetcher that hangs.
const ATTEMPT_GRACE: Duration = Duration::from_secs(5);

/// One dispatch of one item under one identity. Dropped after completion handling.
#[derive(Debug)]
struct Attempt {
    index: usize,
    identity: ProxyIdentity,
    started: Instant,
    outcome: Outcome,
}

/// Mutable state of a single run; owned by the dispatch loop.
struct RunState {
    items: Vec<WorkItem>,
    pending: VecDeque<usize>,
    backoff: DelayQueue<usize>,
    in_flight: JoinSet<Attempt>,
    /// Session ids of attempts currently running.
    live_sessions: HashSet<String>,
    finished: usize,
    succeeded: usize,
    total_attempts: u64,
    peak_in_flight: usize,
    cancelled: bool,
    /// Whether a snapshot with every item processed reached the progress channel.
    final_delivered: bool,
    started: Instant,
}

impl RunState {
    fn is_done(&self) -> bool {
        if !self.in_flight.is_empty() {
            return false;
        }
        self.cancelled || (self.pending.is_empty() && self.backoff.is_empty())
    }
}

/// Runs a batch of URLs to completion with adaptive concurrency and retries.
pub struct BatchScheduler<F, I> {
    fetcher: Arc<F>,
    identities: I,
    retry: RetryPolicy,
    controller: ConcurrencyController,
    fetch_timeout: Duration,
    progress: Option<mpsc::Sender<ProgressStats>>,
    cancel: CancellationToken,
}

impl<F: Fetcher, I: IdentitySource> BatchScheduler<F, I> {
    pub fn new(
        fetcher: Arc<F>,
        identities: I,
        retry: RetryPolicy,
        controller: ConcurrencyController,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            identities,
            retry,
            controller,
            fetch_timeout,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Send a progress snapshot after every item that reaches a terminal status.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressStats>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Stop dispatching when `token` is cancelled; running attempts are still awaited.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Receiver that observes every change of the permitted slot count.
    pub fn slot_watch(&self) -> watch::Receiver<usize> {
        self.controller.subscribe()
    }

    /// Process every URL until each item is Succeeded or Failed.
    ///
    /// Per-item failures only show up in the report; an error here means the
    /// scheduler itself broke (an attempt task panicked).
    pub async fn run(mut self, urls: impl IntoIterator<Item = String>) -> Result<BatchReport> {
        let items: Vec<WorkItem> = urls.into_iter().map(WorkItem::new).collect();
        let total = items.len();
        let mut state = RunState {
            pending: (0..total).collect(),
            items,
            backoff: DelayQueue::new(),
            in_flight: JoinSet::new(),
            live_sessions: HashSet::new(),
            finished: 0,
            succeeded: 0,
            total_attempts: 0,
            peak_in_flight: 0,
            cancelled: false,
            final_delivered: false,
            started: Instant::now(),
        };
        let cancel = self.cancel.clone();
        let (min, max) = self.controller.bounds();
        tracing::info!(
            total,
            slots = self.controller.slots(),
            min,
            max,
            max_attempts = self.retry.max_attempts,
            "batch started"
        );

        loop {
            if !state.cancelled {
                self.fill_slots(&mut state);
            }
            if state.is_done() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !state.cancelled => {
                    state.cancelled = true;
                    let waiting = state.pending.len() + state.backoff.len();
                    tracing::warn!(
                        in_flight = state.in_flight.len(),
                        waiting,
                        "cancelled: no further dispatches"
                    );
                    state.pending.clear();
                    state.backoff.clear();
                }
                Some(joined) = state.in_flight.join_next() => {
                    let attempt = joined.map_err(|e| anyhow::anyhow!("attempt task join: {}", e))?;
                    self.complete(&mut state, attempt);
                }
                Some(expired) = poll_fn(|cx| state.backoff.poll_expired(cx)) => {
                    state.pending.push_back(expired.into_inner());
                }
                else => break,
            }
        }

        for item in state.items.iter_mut().filter(|i| !i.status().is_terminal()) {
            item.fail(FailureReason::Cancelled);
            state.finished += 1;
        }
        if !state.final_delivered {
            if let Some(tx) = &self.progress {
                // Intermediate snapshots may be dropped, the closing one is awaited.
                let _ = tx.send(self.snapshot(&state)).await;
            }
        }

        let stats = RunStats {
            sessions_created: self.identities.issued(),
            total_attempts: state.total_attempts,
            concurrency_adjustments: self.controller.transitions().len(),
            peak_concurrency: self.controller.peak(),
            final_concurrency: self.controller.slots(),
            peak_in_flight: state.peak_in_flight,
            transitions: self.controller.transitions().to_vec(),
            elapsed_secs: state.started.elapsed().as_secs_f64(),
        };
        let report = BatchReport::from_items(&state.items, state.cancelled, stats);
        tracing::info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            attempts = report.stats.total_attempts,
            adjustments = report.stats.concurrency_adjustments,
            cancelled = report.cancelled,
            "batch finished"
        );
        Ok(report)
    }

    /// Dispatch from the front of the queue while slots are free.
    fn fill_slots(&mut self, state: &mut RunState) {
        while state.in_flight.len() < self.controller.slots() {
            let Some(index) = state.pending.pop_front() else {
                break;
            };
            self.dispatch(state, index);
        }
    }

    fn dispatch(&mut self, state: &mut RunState, index: usize) {
        debug_assert!(state.in_flight.len() < self.controller.slots());
        let identity = self.identities.next();
        let fresh = state.live_sessions.insert(identity.session_id().to_string());
        debug_assert!(fresh, "session {} already in flight", identity.session_id());

        let item = &mut state.items[index];
        item.begin_attempt();
        state.total_attempts += 1;
        tracing::debug!(
            url = item.url(),
            attempt = item.attempts(),
            session = identity.session_id(),
            "dispatch"
        );

        let fetcher = Arc::clone(&self.fetcher);
        let url = item.url().to_string();
        let timeout = self.fetch_timeout;
        state.in_flight.spawn(async move {
            let started = Instant::now();
            let fetch = fetcher.fetch(&url, &identity, timeout);
            let outcome = match tokio::time::timeout(timeout + ATTEMPT_GRACE, fetch).await {
                Ok(outcome) => outcome,
                Err(_) => Outcome::Retryable(FailureReason::Timeout),
            };
            Attempt {
                index,
                identity,
                started,
                outcome,
            }
        });
        state.peak_in_flight = state.peak_in_flight.max(state.in_flight.len());
    }

    fn complete(&mut self, state: &mut RunState, attempt: Attempt) {
        let Attempt {
            index,
            identity,
            started,
            outcome,
        } = attempt;
        state.live_sessions.remove(identity.session_id());
        self.controller.record(&outcome);

        let item = &mut state.items[index];
        let took_ms = started.elapsed().as_millis() as u64;
        let decision = self.retry.decide(item, &outcome);
        match (outcome, decision) {
            (Outcome::Success, _) => {
                item.succeed();
                state.succeeded += 1;
                tracing::debug!(url = item.url(), attempt = item.attempts(), took_ms, "succeeded");
            }
            (Outcome::Retryable(reason), RetryDecision::Retry(delay)) if !state.cancelled => {
                item.requeue();
                tracing::info!(
                    url = item.url(),
                    attempt = item.attempts(),
                    session = identity.session_id(),
                    reason = %reason,
                    delay_ms = delay.as_millis() as u64,
                    "retrying with a new session"
                );
                state.backoff.insert(index, delay);
            }
            (Outcome::Retryable(reason) | Outcome::Fatal(reason), _) => {
                tracing::warn!(
                    url = item.url(),
                    attempts = item.attempts(),
                    reason = %reason,
                    "giving up"
                );
                item.fail(reason);
            }
        }

        if state.items[index].status().is_terminal() {
            state.finished += 1;
            self.send_progress(state);
        }
    }

    fn send_progress(&self, state: &mut RunState) {
        let Some(tx) = &self.progress else {
            return;
        };
        let stats = self.snapshot(state);
        let complete = stats.is_complete();
        // A slow or absent consumer must never stall dispatching.
        if tx.try_send(stats).is_ok() && complete {
            state.final_delivered = true;
        }
    }

    fn snapshot(&self, state: &RunState) -> ProgressStats {
        ProgressStats {
            processed: state.finished,
            succeeded: state.succeeded,
            failed: state.finished - state.succeeded,
            total: state.items.len(),
            concurrency: self.controller.slots(),
            sessions_created: self.identities.issued(),
            elapsed_secs: state.started.elapsed().as_secs_f64(),
        }
    }
}
