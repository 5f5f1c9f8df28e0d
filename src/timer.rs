use std::time::{Duration, Instant};

use crate::catalog::Decision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Running { remaining: u32 },
    Expired,
}

/// Countdown armed for one displayed decision.
///
/// The timer is bound to the item it was armed for (its index in the session
/// and the decision id) so the owner can refuse to resolve any other item with
/// it. Remaining time drops by one for every whole second elapsed since the
/// item was displayed.
#[derive(Debug, Clone)]
pub struct ArmedTimer {
    item_index: usize,
    decision_id: u32,
    time_limit: u32,
    started_at: Instant,
    ticks: u32,
}

impl ArmedTimer {
    pub fn arm(item_index: usize, decision: &Decision, now: Instant) -> Self {
        Self {
            item_index,
            decision_id: decision.id,
            time_limit: decision.time_limit,
            started_at: now,
            ticks: 0,
        }
    }

    pub fn is_bound_to(&self, item_index: usize, decision_id: u32) -> bool {
        self.item_index == item_index && self.decision_id == decision_id
    }

    pub fn item_index(&self) -> usize {
        self.item_index
    }

    pub fn time_limit(&self) -> u32 {
        self.time_limit
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn remaining(&self) -> u32 {
        self.time_limit.saturating_sub(self.ticks)
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Fraction of the allowance still left, in `0.0..=1.0`
    pub fn fraction_remaining(&self) -> f64 {
        self.remaining() as f64 / self.time_limit.max(1) as f64
    }

    /// Apply every whole-second tick due by `now`
    pub fn poll(&mut self, now: Instant) -> TimerStatus {
        let due = self.elapsed(now).as_secs().min(self.time_limit as u64) as u32;

        self.ticks = self.ticks.max(due);

        match self.remaining() {
            0 => TimerStatus::Expired,
            remaining => TimerStatus::Running { remaining },
        }
    }
}
