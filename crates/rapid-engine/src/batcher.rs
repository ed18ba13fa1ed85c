//! Component I, the Alert Batcher (§4.I): amortizes the O(edges·K) alert
//! fan-out of a multi-edge view change into at most one broadcast per
//! `batchingWindow` by collapsing every alert enqueued since the last tick
//! into a single `BatchedAlertMessage`.

use rapid_core::Alert;

#[derive(Default)]
pub struct AlertBatcher {
    queued: Vec<Alert>,
    deadline_elapsed_since_last_tick: bool,
}

impl AlertBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each enqueue marks the batch ready to flush on the next tick — this
    /// is the "deadline" of §4.I, expressed as a boolean rather than a
    /// `Duration` away from the owning timer.
    pub fn enqueue(&mut self, alert: Alert) {
        self.queued.push(alert);
        self.deadline_elapsed_since_last_tick = true;
    }

    /// Called on every `batchingWindow` tick. Drains and returns the queue
    /// if anything was enqueued since the previous tick, `None` otherwise
    /// (nothing to broadcast).
    pub fn tick(&mut self) -> Option<Vec<Alert>> {
        if !self.deadline_elapsed_since_last_tick {
            return None;
        }
        self.deadline_elapsed_since_last_tick = false;
        Some(std::mem::take(&mut self.queued))
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }
}
