//! Circuit breaker configuration.
//!
//! A [`BreakerConfig`] is immutable once a breaker is built from it. All
//! numeric fields must be strictly positive; this is checked when the breaker
//! is constructed, never during traffic.

use std::time::Duration;

use crate::error::ConfigError;
use crate::fallback::FallbackSpec;

/// Tunables for one named circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Registry key; one breaker exists per name.
    pub name: String,
    /// Failures inside the window needed to trip the breaker.
    pub failure_threshold: u32,
    /// Sliding window over which failures are counted.
    pub failure_window: Duration,
    /// How long an open breaker waits before admitting a probe.
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes needed to close.
    pub success_threshold: u32,
    /// Deadline applied to each wrapped operation.
    pub call_timeout: Duration,
    /// Substitute result for rejected and timed-out calls.
    pub fallback: FallbackSpec,
}

impl BreakerConfig {
    /// Creates a configuration with house defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: 5,
            failure_window: Duration::from_secs(10),
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            call_timeout: Duration::from_secs(10),
            fallback: FallbackSpec::default(),
        }
    }

    /// Preset for authentication-grade dependencies: trips fast on a small
    /// window and probes again after a moderate pause.
    pub fn strict(name: impl Into<String>) -> Self {
        Self {
            failure_threshold: 3,
            failure_window: Duration::from_secs(10),
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 3,
            call_timeout: Duration::from_secs(3),
            ..Self::new(name)
        }
    }

    /// Preset for best-effort external calls: tolerates more failures over a
    /// longer window and gives the dependency more time to recover.
    pub fn lenient(name: impl Into<String>) -> Self {
        Self {
            failure_threshold: 10,
            failure_window: Duration::from_secs(60),
            recovery_timeout: Duration::from_secs(120),
            success_threshold: 3,
            call_timeout: Duration::from_secs(30),
            fallback: FallbackSpec {
                retry_after: Duration::from_secs(120),
                ..FallbackSpec::default()
            },
            ..Self::new(name)
        }
    }

    /// Sets the number of windowed failures that trips the breaker.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the sliding window over which failures are counted.
    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    /// Sets how long the breaker stays open before admitting a probe.
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Sets the consecutive half-open successes needed to close.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Sets the deadline applied to each wrapped operation.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the fallback returned for rejected and timed-out calls.
    pub fn with_fallback(mut self, fallback: FallbackSpec) -> Self {
        self.fallback = fallback;
        self
    }

    /// Checks that every numeric field is strictly positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroThreshold {
                name: self.name.clone(),
                field: "failure_threshold",
            });
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::ZeroThreshold {
                name: self.name.clone(),
                field: "success_threshold",
            });
        }
        if self.failure_window.is_zero() {
            return Err(ConfigError::ZeroDuration {
                name: self.name.clone(),
                field: "failure_window",
            });
        }
        if self.recovery_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                name: self.name.clone(),
                field: "recovery_timeout",
            });
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                name: self.name.clone(),
                field: "call_timeout",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        assert!(BreakerConfig::new("db").validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(BreakerConfig::strict("auth").validate().is_ok());
        assert!(BreakerConfig::lenient("weather-api").validate().is_ok());
    }

    #[test]
    fn test_strict_trips_faster_than_lenient() {
        let strict = BreakerConfig::strict("auth");
        let lenient = BreakerConfig::lenient("weather-api");

        assert!(strict.failure_threshold < lenient.failure_threshold);
        assert!(strict.failure_window < lenient.failure_window);
        assert!(strict.recovery_timeout < lenient.recovery_timeout);
    }

    #[test]
    fn test_builders_override_fields() {
        let config = BreakerConfig::new("db")
            .with_failure_threshold(2)
            .with_failure_window(Duration::from_secs(5))
            .with_recovery_timeout(Duration::from_secs(15))
            .with_success_threshold(1)
            .with_call_timeout(Duration::from_millis(250));

        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.failure_window, Duration::from_secs(5));
        assert_eq!(config.recovery_timeout, Duration::from_secs(15));
        assert_eq!(config.success_threshold, 1);
        assert_eq!(config.call_timeout, Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::failure_threshold(BreakerConfig::new("t").with_failure_threshold(0))]
    #[case::success_threshold(BreakerConfig::new("t").with_success_threshold(0))]
    #[case::failure_window(BreakerConfig::new("t").with_failure_window(Duration::ZERO))]
    #[case::recovery_timeout(BreakerConfig::new("t").with_recovery_timeout(Duration::ZERO))]
    #[case::call_timeout(BreakerConfig::new("t").with_call_timeout(Duration::ZERO))]
    fn test_zero_fields_are_rejected(#[case] config: BreakerConfig) {
        assert!(config.validate().is_err());
    }
}
