use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{Decision, DifficultyFilter};

pub const NO_DECISION: &str = "No decision";

pub const DEFAULT_SESSION_LENGTH: usize = 5;

/// Settings read from the menu at the moment a session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub difficulty: DifficultyFilter,
    pub length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            difficulty: DifficultyFilter::All,
            length: DEFAULT_SESSION_LENGTH,
        }
    }
}

/// What the user ended up with for one decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Picked(String),
    NoDecision,
}

impl Choice {
    pub fn label(&self) -> &str {
        match self {
            Choice::Picked(option) => option,
            Choice::NoDecision => NO_DECISION,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionResult {
    pub decision: Decision,
    pub chosen: Choice,
    /// seconds between display and resolution
    pub time_spent: f64,
    pub timed_out: bool,
}

impl DecisionResult {
    pub fn picked(decision: Decision, option: String, time_spent: f64) -> Self {
        Self {
            decision,
            chosen: Choice::Picked(option),
            time_spent,
            timed_out: false,
        }
    }

    pub fn timed_out(decision: Decision) -> Self {
        let time_spent = decision.time_limit as f64;
        Self {
            decision,
            chosen: Choice::NoDecision,
            time_spent,
            timed_out: true,
        }
    }
}

/// One run from "start training" to the results view
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub config: SessionConfig,
    selected: Vec<Decision>,
    current_index: usize,
    results: Vec<DecisionResult>,
}

impl Session {
    pub fn new(config: SessionConfig, selected: Vec<Decision>) -> Self {
        Self {
            config,
            selected,
            current_index: 0,
            results: Vec::new(),
        }
    }

    pub fn selected(&self) -> &[Decision] {
        &self.selected
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> Option<&Decision> {
        self.selected.get(self.current_index)
    }

    pub fn is_last(&self) -> bool {
        self.current_index + 1 >= self.selected.len()
    }

    pub fn results(&self) -> &[DecisionResult] {
        &self.results
    }

    pub fn last_result(&self) -> Option<&DecisionResult> {
        self.results.last()
    }

    /// True once the current item has a recorded result
    pub fn is_current_resolved(&self) -> bool {
        self.results.len() > self.current_index
    }

    pub(crate) fn record(&mut self, result: DecisionResult) {
        self.results.push(result);
    }

    /// Move to the next item; returns false when already at the last one
    pub(crate) fn step(&mut self) -> bool {
        if self.is_last() {
            return false;
        }
        self.current_index += 1;
        true
    }
}
