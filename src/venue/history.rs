//! Bounded per-(venue, symbol) outcome history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One recorded execution outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub latency_ms: Option<f64>,
    pub at: DateTime<Utc>,
}

/// Rolling outcome window plus lifetime counters
#[derive(Debug, Clone)]
pub struct OutcomeLog {
    outcomes: VecDeque<Outcome>,
    capacity: usize,
    routed: u64,
    recorded: u64,
    successes: u64,
    last_used: Option<DateTime<Utc>>,
}

impl OutcomeLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
            routed: 0,
            recorded: 0,
            successes: 0,
            last_used: None,
        }
    }

    /// Count a routing decision that picked this venue
    pub fn mark_routed(&mut self, at: DateTime<Utc>) {
        self.routed += 1;
        self.last_used = Some(at);
    }

    /// Append an outcome, evicting the oldest past capacity
    pub fn record(&mut self, outcome: Outcome) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(outcome);
        self.recorded += 1;
        if outcome.success {
            self.successes += 1;
        }
        self.last_used = Some(self.last_used.map_or(outcome.at, |last| last.max(outcome.at)));
    }

    /// Success rate over the last `window` outcomes, if any were recorded
    pub fn recent_success_rate(&self, window: usize) -> Option<f64> {
        let recent: Vec<&Outcome> = self.outcomes.iter().rev().take(window).collect();
        if recent.is_empty() {
            return None;
        }
        let successes = recent.iter().filter(|o| o.success).count();
        Some(successes as f64 / recent.len() as f64)
    }

    pub fn lifetime_success_rate(&self) -> Option<f64> {
        if self.recorded == 0 {
            None
        } else {
            Some(self.successes as f64 / self.recorded as f64)
        }
    }

    pub fn routed(&self) -> u64 {
        self.routed
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.last_used
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
