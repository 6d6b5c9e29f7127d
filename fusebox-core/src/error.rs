//! Construction-time configuration errors.

use thiserror::Error;

/// Errors raised when a circuit breaker is built from an invalid config.
///
/// Validation happens once, at construction. A breaker that was successfully
/// created never raises these during traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A threshold field was zero.
    #[error("circuit breaker '{name}': {field} must be at least 1")]
    ZeroThreshold { name: String, field: &'static str },

    /// A duration field was zero.
    #[error("circuit breaker '{name}': {field} must be a positive duration")]
    ZeroDuration { name: String, field: &'static str },
}
