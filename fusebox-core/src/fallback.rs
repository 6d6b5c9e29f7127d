//! Fallback payloads returned in place of a real result.
//!
//! When a call is rejected outright or times out, the caller receives a
//! structured substitute instead of an error, so graceful degradation does
//! not require matching on error types. Genuine operation failures are never
//! converted; those are re-raised as-is.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a fallback was returned instead of the operation's own result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The breaker was open (or a half-open trial was already in flight);
    /// the operation was never invoked.
    CircuitOpen,
    /// The operation was invoked but exceeded the configured call timeout.
    Timeout,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::CircuitOpen => write!(f, "circuit_open"),
            FallbackReason::Timeout => write!(f, "timeout"),
        }
    }
}

/// Configured shape of the substitute result.
///
/// `message_key` is a stable localization key; calling layers with a
/// localization table render per-locale text from it and the payload's
/// structured fields. `message` is the default rendering for callers
/// without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSpec {
    /// Kind tag describing the degraded mode, e.g. `service_unavailable`.
    pub kind: String,
    /// Default human-readable text.
    pub message: String,
    /// Localization key for per-locale rendering.
    pub message_key: String,
    /// Suggested client wait before retrying.
    pub retry_after: Duration,
}

impl FallbackSpec {
    /// Builds the payload handed to callers, stamped with the reason the
    /// breaker chose the fallback path.
    pub fn payload(&self, reason: FallbackReason) -> FallbackPayload {
        FallbackPayload {
            success: false,
            reason,
            kind: self.kind.clone(),
            message: self.message.clone(),
            message_key: self.message_key.clone(),
            retry_after_seconds: self.retry_after.as_secs(),
        }
    }
}

impl Default for FallbackSpec {
    fn default() -> Self {
        Self {
            kind: "service_unavailable".to_string(),
            message: "Service temporarily unavailable, please retry shortly.".to_string(),
            message_key: "fallback.service_unavailable".to_string(),
            retry_after: Duration::from_secs(30),
        }
    }
}

/// The substitute result returned when a call is rejected or times out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackPayload {
    /// Always `false`; present so the payload is self-describing on the wire.
    pub success: bool,
    /// `circuit_open` or `timeout`, for callers that need to differentiate.
    pub reason: FallbackReason,
    pub kind: String,
    pub message: String,
    pub message_key: String,
    pub retry_after_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reason_codes_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&FallbackReason::CircuitOpen).unwrap(),
            "\"circuit_open\""
        );
        assert_eq!(
            serde_json::to_string(&FallbackReason::Timeout).unwrap(),
            "\"timeout\""
        );
    }

    #[test]
    fn test_payload_shape() {
        let spec = FallbackSpec {
            kind: "auth_unavailable".to_string(),
            message: "Authentication is temporarily unavailable.".to_string(),
            message_key: "fallback.auth_unavailable".to_string(),
            retry_after: Duration::from_secs(60),
        };

        let payload = spec.payload(FallbackReason::CircuitOpen);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "reason": "circuit_open",
                "kind": "auth_unavailable",
                "message": "Authentication is temporarily unavailable.",
                "message_key": "fallback.auth_unavailable",
                "retry_after_seconds": 60,
            })
        );
    }

    #[test]
    fn test_payload_reason_differentiates_timeout() {
        let payload = FallbackSpec::default().payload(FallbackReason::Timeout);
        assert!(!payload.success);
        assert_eq!(payload.reason, FallbackReason::Timeout);
        assert_eq!(payload.retry_after_seconds, 30);
    }

    #[test]
    fn test_spec_serialization_round_trip() {
        let spec = FallbackSpec::default();
        let json = serde_json::to_string(&spec).unwrap();
        let deserialized: FallbackSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, deserialized);
    }

    #[test]
    fn test_reason_display_matches_wire_code() {
        assert_eq!(FallbackReason::CircuitOpen.to_string(), "circuit_open");
        assert_eq!(FallbackReason::Timeout.to_string(), "timeout");
    }
}
