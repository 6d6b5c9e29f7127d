//! Read-only status projection for monitoring surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::breaker::CircuitState;
use crate::metrics::MetricsSnapshot;

/// Point-in-time view of one breaker, shaped for an external monitoring or
/// HTTP layer. Pure projection of breaker state; carries no logic of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub name: String,
    pub state: CircuitState,
    /// Failures currently inside the sliding window.
    pub failures_in_window: usize,
    pub failure_threshold: u32,
    /// When the breaker last tripped; cleared once it closes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    pub metrics: MetricsSnapshot,
}
