//! Per-breaker call accounting.
//!
//! Counters live inside the breaker's own state and are only ever mutated in
//! the same critical section as the transition they accompany. External
//! observers read them through [`MetricsSnapshot`].

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::breaker::CircuitState;

/// Most recent transitions retained per breaker.
pub(crate) const TRANSITION_LOG_CAP: usize = 32;

/// One state change, kept in the breaker's bounded transition log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub at: DateTime<Utc>,
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Owned counters; the breaker is the only writer.
#[derive(Debug, Default)]
pub(crate) struct MetricsRecord {
    pub(crate) total_calls: u64,
    pub(crate) successful_calls: u64,
    pub(crate) failed_calls: u64,
    pub(crate) rejected_calls: u64,
    pub(crate) circuit_opened_count: u64,
    pub(crate) last_failure_time: Option<DateTime<Utc>>,
    pub(crate) last_success_time: Option<DateTime<Utc>>,
    pub(crate) transitions: VecDeque<TransitionEvent>,
}

impl MetricsRecord {
    pub(crate) fn record_success(&mut self, at: DateTime<Utc>) {
        self.total_calls += 1;
        self.successful_calls += 1;
        self.last_success_time = Some(at);
    }

    /// Timeouts are recorded through here as well; they count as failures.
    pub(crate) fn record_failure(&mut self, at: DateTime<Utc>) {
        self.total_calls += 1;
        self.failed_calls += 1;
        self.last_failure_time = Some(at);
    }

    pub(crate) fn record_rejection(&mut self) {
        self.total_calls += 1;
        self.rejected_calls += 1;
    }

    pub(crate) fn record_opened(&mut self) {
        self.circuit_opened_count += 1;
    }

    pub(crate) fn record_transition(
        &mut self,
        at: DateTime<Utc>,
        from: CircuitState,
        to: CircuitState,
    ) {
        if self.transitions.len() == TRANSITION_LOG_CAP {
            self.transitions.pop_front();
        }
        self.transitions.push_back(TransitionEvent { at, from, to });
    }

    pub(crate) fn success_rate(&self) -> f64 {
        self.successful_calls as f64 / std::cmp::max(1, self.total_calls) as f64
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_calls: self.total_calls,
            successful_calls: self.successful_calls,
            failed_calls: self.failed_calls,
            rejected_calls: self.rejected_calls,
            circuit_opened_count: self.circuit_opened_count,
            success_rate: self.success_rate(),
            last_failure_time: self.last_failure_time,
            last_success_time: self.last_success_time,
            recent_transitions: self.transitions.iter().copied().collect(),
        }
    }
}

/// Point-in-time copy of a breaker's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Calls turned away without invoking the operation.
    pub rejected_calls: u64,
    /// Lifetime trip count; reopening from half-open does not bump it.
    pub circuit_opened_count: u64,
    /// `successful_calls / max(1, total_calls)`.
    pub success_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_time: Option<DateTime<Utc>>,
    /// Most recent state changes, oldest first, bounded.
    pub recent_transitions: Vec<TransitionEvent>,
}
