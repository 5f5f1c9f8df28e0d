use crate::session::DecisionResult;
use crate::util::{mean, percentage};

/// Aggregates shown on the results screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    pub total: usize,
    pub decided: usize,
    pub timed_out: usize,
    /// percentage of results that were not timeouts, rounded
    pub decision_rate: u32,
    /// mean time spent in seconds, rounded to one decimal
    pub average_time: f64,
}

impl SessionSummary {
    pub fn from_results(results: &[DecisionResult]) -> Self {
        let total = results.len();
        let decided = results.iter().filter(|r| !r.timed_out).count();

        let times: Vec<f64> = results.iter().map(|r| r.time_spent).collect();
        let average_time = mean(&times)
            .map(|avg| (avg * 10.0).round() / 10.0)
            .unwrap_or(0.0);

        Self {
            total,
            decided,
            timed_out: total - decided,
            decision_rate: percentage(decided, total),
            average_time,
        }
    }

    pub fn average_time_label(&self) -> String {
        format!("{:.1}s", self.average_time)
    }

    pub fn decision_rate_label(&self) -> String {
        format!("{}%", self.decision_rate)
    }
}
