//! Watermark-driven slot controller.

use serde::Serialize;
use tokio::sync::watch;

use super::window::SuccessWindow;
use crate::config::ConcurrencyConfig;
use crate::fetch::Outcome;

/// One change of the permitted slot count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotTransition {
    pub from: usize,
    pub to: usize,
    /// Window success rate that triggered the change.
    pub success_rate: f64,
    /// Outcomes recorded so far when the change happened.
    pub after_outcomes: u64,
}

/// Owns the permitted number of in-flight attempts.
///
/// Evaluated after every recorded outcome. Once the window holds `window_size`
/// samples: at or above the high watermark the count grows by `step`, at or
/// below the low watermark it shrinks by `step`, otherwise it holds. The window
/// is cleared after each change so the next decision only sees outcomes
/// produced at the new level. Shrinking never touches running attempts; it
/// only delays new dispatches until occupancy falls below the new count.
#[derive(Debug)]
pub struct ConcurrencyController {
    min: usize,
    max: usize,
    step: usize,
    low_watermark: f64,
    high_watermark: f64,
    slots: usize,
    peak: usize,
    window: SuccessWindow,
    outcomes: u64,
    transitions: Vec<SlotTransition>,
    slots_tx: watch::Sender<usize>,
}

impl ConcurrencyController {
    pub fn new(cfg: &ConcurrencyConfig) -> Self {
        let min = cfg.min.max(1);
        let max = cfg.max.max(min);
        let slots = cfg.initial_slots().clamp(min, max);
        let (slots_tx, _) = watch::channel(slots);
        Self {
            min,
            max,
            step: cfg.step.max(1),
            low_watermark: cfg.low_watermark,
            high_watermark: cfg.high_watermark,
            slots,
            peak: slots,
            window: SuccessWindow::new(cfg.window_size),
            outcomes: 0,
            transitions: Vec::new(),
            slots_tx,
        }
    }

    /// Currently permitted number of in-flight attempts.
    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn bounds(&self) -> (usize, usize) {
        (self.min, self.max)
    }

    /// Highest slot count reached so far.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Success rate of the current window, if it has any samples.
    pub fn success_rate(&self) -> Option<f64> {
        self.window.rate()
    }

    pub fn transitions(&self) -> &[SlotTransition] {
        &self.transitions
    }

    /// Receiver that observes every slot count change.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.slots_tx.subscribe()
    }

    /// Record one attempt outcome and re-evaluate. Returns the transition, if any.
    pub fn record(&mut self, outcome: &Outcome) -> Option<SlotTransition> {
        self.outcomes += 1;
        self.window.push(outcome.is_success());
        if !self.window.is_full() {
            return None;
        }
        let rate = self.window.rate()?;

        let target = if rate >= self.high_watermark && self.slots < self.max {
            (self.slots + self.step).min(self.max)
        } else if rate <= self.low_watermark && self.slots > self.min {
            self.slots.saturating_sub(self.step).max(self.min).max(1)
        } else {
            return None;
        };

        let transition = SlotTransition {
            from: self.slots,
            to: target,
            success_rate: rate,
            after_outcomes: self.outcomes,
        };
        if target > self.slots {
            tracing::info!(
                "scaling up: success rate {:.1}% - concurrency {} -> {}",
                rate * 100.0,
                self.slots,
                target
            );
        } else {
            tracing::info!(
                "scaling down: success rate {:.1}% - concurrency {} -> {}",
                rate * 100.0,
                self.slots,
                target
            );
        }
        self.slots = target;
        self.peak = self.peak.max(target);
        self.window.clear();
        self.transitions.push(transition);
        self.slots_tx.send_replace(target);
        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FailureReason;

    fn cfg(min: usize, max: usize, initial: usize) -> ConcurrencyConfig {
        ConcurrencyConfig {
            min,
            max,
            initial: Some(initial),
            step: 2,
            window_size: 10,
            low_watermark: 0.5,
            high_watermark: 0.9,
        }
    }

    fn ok() -> Outcome {
        Outcome::Success
    }

    fn fail() -> Outcome {
        Outcome::Retryable(FailureReason::Throttled(429))
    }

    #[test]
    fn holds_until_window_full() {
        let mut c = ConcurrencyController::new(&cfg(2, 10, 4));
        for _ in 0..9 {
            assert!(c.record(&ok()).is_none());
        }
        assert_eq!(c.slots(), 4);
        let t = c.record(&ok()).expect("full window of successes scales up");
        assert_eq!((t.from, t.to), (4, 6));
        assert_eq!(c.slots(), 6);
        assert_eq!(c.success_rate(), None, "window cleared after a change");
    }

    #[test]
    fn scales_down_on_failures_and_never_below_min() {
        let mut c = ConcurrencyController::new(&cfg(3, 10, 8));
        for _ in 0..100 {
            c.record(&fail());
        }
        assert_eq!(c.slots(), 3);
        assert_eq!(c.transitions().len(), 3, "8 -> 6 -> 4 -> 3");
        assert_eq!(c.transitions()[2].to, 3);
    }

    #[test]
    fn never_above_max() {
        let mut c = ConcurrencyController::new(&cfg(2, 5, 2));
        for _ in 0..100 {
            c.record(&ok());
        }
        assert_eq!(c.slots(), 5);
        assert_eq!(c.peak(), 5);
    }

    #[test]
    fn holds_between_watermarks() {
        let mut c = ConcurrencyController::new(&cfg(2, 10, 6));
        // 70% success: between 50% and 90%.
        for i in 0..100 {
            let o = if i % 10 < 7 { ok() } else { fail() };
            c.record(&o);
        }
        assert_eq!(c.slots(), 6);
        assert!(c.transitions().is_empty());
    }

    #[test]
    fn sustained_forty_percent_converges_to_min_and_stays() {
        let mut c = ConcurrencyController::new(&cfg(2, 10, 10));
        let mut reached_min_at = None;
        for i in 0..500 {
            let o = if i % 5 < 2 { ok() } else { fail() };
            c.record(&o);
            if c.slots() == 2 && reached_min_at.is_none() {
                reached_min_at = Some(i);
            }
            if reached_min_at.is_some() {
                assert_eq!(c.slots(), 2, "no oscillation above min");
            }
        }
        assert!(reached_min_at.is_some());
        assert!(c.transitions().iter().all(|t| t.to < t.from));
    }

    #[test]
    fn subscribers_see_changes() {
        let mut c = ConcurrencyController::new(&cfg(2, 10, 2));
        let rx = c.subscribe();
        assert_eq!(*rx.borrow(), 2);
        for _ in 0..10 {
            c.record(&ok());
        }
        assert_eq!(*rx.borrow(), 4);
    }

    #[test]
    fn initial_is_clamped_into_bounds() {
        let c = ConcurrencyController::new(&cfg(2, 10, 50));
        assert_eq!(c.slots(), 10);
        assert_eq!(c.bounds(), (2, 10));
    }
}
