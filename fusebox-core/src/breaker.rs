//! Circuit breaker for guarding calls to unreliable dependencies.
//!
//! A breaker counts failures over a sliding time window and stops invoking
//! the dependency once the count crosses a threshold, giving it time to
//! recover instead of piling more load on it.
//!
//! # States
//!
//! - **Closed**: normal operation, calls pass through
//! - **Open**: the failure threshold was crossed inside the window; calls are
//!   rejected with the configured fallback until the recovery timeout elapses
//! - **HalfOpen**: a single trial call probes the dependency; everyone else
//!   is still rejected until the trial resolves
//!
//! # Example
//!
//! ```no_run
//! use fusebox_core::{BreakerConfig, CallOutcome, CircuitBreaker};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new(BreakerConfig::strict("auth"))?;
//!
//! match breaker.call(|| async { Ok::<_, std::io::Error>(42) }).await {
//!     Ok(CallOutcome::Success(value)) => println!("result: {}", value),
//!     Ok(CallOutcome::Fallback(payload)) => println!("degraded: {}", payload.message),
//!     Err(e) => eprintln!("operation failed: {}", e),
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::BreakerConfig;
use crate::error::ConfigError;
use crate::fallback::{FallbackPayload, FallbackReason};
use crate::metrics::{MetricsRecord, MetricsSnapshot};
use crate::operation::Operation;
use crate::status::StatusSnapshot;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Too many recent failures, calls are rejected
    Open,
    /// Testing whether the dependency has recovered
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// What a gated call hands back when it does not re-raise an operation error.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    /// The operation ran and returned its value.
    Success(T),
    /// The call was short-circuited; the configured fallback stands in.
    Fallback(FallbackPayload),
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, CallOutcome::Fallback(_))
    }

    /// Returns the operation's value, discarding a fallback.
    pub fn success(self) -> Option<T> {
        match self {
            CallOutcome::Success(value) => Some(value),
            CallOutcome::Fallback(_) => None,
        }
    }

    /// Returns the fallback payload, discarding a real value.
    pub fn fallback(self) -> Option<FallbackPayload> {
        match self {
            CallOutcome::Success(_) => None,
            CallOutcome::Fallback(payload) => Some(payload),
        }
    }

    /// Converts into a `Result`, mapping a fallback through `err`.
    pub fn into_result<E>(self, err: impl FnOnce(FallbackPayload) -> E) -> Result<T, E> {
        match self {
            CallOutcome::Success(value) => Ok(value),
            CallOutcome::Fallback(payload) => Err(err(payload)),
        }
    }
}

/// Mutable breaker state. Everything here is only touched behind the
/// instance's single lock; metrics move in the same critical section as the
/// transition they accompany.
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_timestamps: VecDeque<Instant>,
    successes_in_half_open: u32,
    opened_at: Option<Instant>,
    opened_at_utc: Option<DateTime<Utc>>,
    probe_in_flight: bool,
    metrics: MetricsRecord,
}

/// Gating decision taken under the state lock.
enum Admission {
    Proceed { probe: bool },
    Reject(FallbackPayload),
}

/// A named circuit breaker guarding one unreliable dependency.
///
/// All mutable state sits behind a single `RwLock` scoped to this instance,
/// so breakers never contend with each other. The lock is only held for
/// bookkeeping; the wrapped operation runs with the lock released.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: RwLock<BreakerState>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Creates a breaker from `config`, validating it first.
    ///
    /// This is the only point at which configuration can fail; a breaker
    /// that was constructed successfully never raises `ConfigError`.
    pub fn new(config: BreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new_unchecked(config))
    }

    /// Builds from a config that has already been validated.
    pub(crate) fn new_unchecked(config: BreakerConfig) -> Self {
        info!("Creating circuit breaker: {}", config.name);
        let breaker = Self {
            name: config.name.clone(),
            state: RwLock::new(BreakerState {
                state: CircuitState::Closed,
                failure_timestamps: VecDeque::new(),
                successes_in_half_open: 0,
                opened_at: None,
                opened_at_utc: None,
                probe_in_flight: false,
                metrics: MetricsRecord::default(),
            }),
            config,
        };
        breaker.set_state_gauge(CircuitState::Closed);
        breaker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Runs `operation` through the breaker.
    ///
    /// - Rejected outright (open, or a half-open trial already in flight):
    ///   the operation is never invoked and the fallback payload comes back
    ///   with reason `circuit_open`.
    /// - Invoked but past `call_timeout`: counted as a failure, fallback
    ///   returned with reason `timeout`; the timeout is not surfaced as an
    ///   error.
    /// - Invoked and failed: counted, then the operation's own error is
    ///   re-raised unchanged.
    /// - Invoked and succeeded: the value comes back as
    ///   [`CallOutcome::Success`].
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<CallOutcome<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_gated(operation).await
    }

    /// Runs an [`Operation`] through the breaker; same semantics as
    /// [`CircuitBreaker::call`].
    pub async fn invoke<Op>(&self, operation: &mut Op) -> Result<CallOutcome<Op::Output>, Op::Error>
    where
        Op: Operation + Send,
    {
        self.run_gated(|| operation.invoke()).await
    }

    /// The single gated call path; `call` and `invoke` both land here.
    async fn run_gated<F, Fut, T, E>(&self, operation: F) -> Result<CallOutcome<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let probe = match self.before_call().await {
            Admission::Reject(payload) => return Ok(CallOutcome::Fallback(payload)),
            Admission::Proceed { probe } => probe,
        };

        match timeout(self.config.call_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.on_success(probe).await;
                Ok(CallOutcome::Success(value))
            }
            Ok(Err(error)) => {
                self.on_failure(probe, false).await;
                Err(error)
            }
            Err(_) => {
                self.on_failure(probe, true).await;
                Ok(CallOutcome::Fallback(
                    self.config.fallback.payload(FallbackReason::Timeout),
                ))
            }
        }
    }

    /// Evaluates the transition table and decides whether this call passes,
    /// probes, or is rejected. One write-lock section; no awaits inside.
    async fn before_call(&self) -> Admission {
        let mut state = self.state.write().await;
        let now = Instant::now();
        self.prune_window(&mut state, now);

        match state.state {
            CircuitState::Closed => Admission::Proceed { probe: false },
            CircuitState::Open => match state.opened_at {
                Some(at) if now.duration_since(at) < self.config.recovery_timeout => {
                    self.reject(&mut state)
                }
                _ => {
                    state.successes_in_half_open = 0;
                    state.probe_in_flight = true;
                    self.transition(&mut state, CircuitState::HalfOpen);
                    self.increment_metric("half_open");
                    info!("Circuit breaker {} transitioning to half-open", self.name);
                    Admission::Proceed { probe: true }
                }
            },
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    self.reject(&mut state)
                } else {
                    state.probe_in_flight = true;
                    Admission::Proceed { probe: true }
                }
            }
        }
    }

    /// Success accounting. Only the half-open trial call moves the state
    /// machine; straggler completions from earlier states count in metrics
    /// alone.
    async fn on_success(&self, probe: bool) {
        let mut state = self.state.write().await;
        state.metrics.record_success(Utc::now());
        self.increment_metric("success");
        if probe {
            state.probe_in_flight = false;
        }

        if state.state == CircuitState::HalfOpen && probe {
            state.successes_in_half_open += 1;
            if state.successes_in_half_open >= self.config.success_threshold {
                state.failure_timestamps.clear();
                state.successes_in_half_open = 0;
                state.opened_at = None;
                state.opened_at_utc = None;
                self.transition(&mut state, CircuitState::Closed);
                self.increment_metric("closed");
                info!(
                    "Circuit breaker {} closing after {} successes",
                    self.name, self.config.success_threshold
                );
            }
        }
    }

    /// Failure accounting; timeouts land here too.
    async fn on_failure(&self, probe: bool, timed_out: bool) {
        let mut state = self.state.write().await;
        let now = Instant::now();
        state.metrics.record_failure(Utc::now());
        self.increment_metric(if timed_out { "timeout" } else { "failure" });
        if timed_out {
            debug!(
                "Circuit breaker {} treating call timeout (>{:?}) as failure",
                self.name, self.config.call_timeout
            );
        }
        if probe {
            state.probe_in_flight = false;
        }

        match state.state {
            CircuitState::Closed => {
                state.failure_timestamps.push_back(now);
                self.prune_window(&mut state, now);
                if state.failure_timestamps.len() >= self.config.failure_threshold as usize {
                    let failures = state.failure_timestamps.len();
                    self.open(&mut state, now);
                    warn!(
                        "Circuit breaker {} opening after {} failures within {:?}",
                        self.name, failures, self.config.failure_window
                    );
                }
            }
            CircuitState::HalfOpen if probe => {
                self.open(&mut state, now);
                warn!(
                    "Circuit breaker {} re-opening after a failed trial call",
                    self.name
                );
            }
            // Already open, or a straggler resolving after the trial began:
            // the failure is on the books, the probe decides the rest.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    /// Rejects the current call. Caller holds the write lock.
    fn reject(&self, state: &mut BreakerState) -> Admission {
        state.metrics.record_rejection();
        self.increment_metric("rejected");
        debug!(
            "Circuit breaker {} rejecting call while {}",
            self.name, state.state
        );
        Admission::Reject(self.config.fallback.payload(FallbackReason::CircuitOpen))
    }

    /// Enters OPEN from the current state and restarts the recovery timer.
    /// Only a trip from CLOSED counts toward `circuit_opened_count`.
    fn open(&self, state: &mut BreakerState, now: Instant) {
        state.opened_at = Some(now);
        state.opened_at_utc = Some(Utc::now());
        if state.state == CircuitState::Closed {
            state.metrics.record_opened();
        }
        self.transition(state, CircuitState::Open);
        self.increment_metric("opened");
    }

    /// Flips the state and records the transition event and gauge.
    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.state;
        state.state = to;
        state.metrics.record_transition(Utc::now(), from, to);
        self.set_state_gauge(to);
    }

    /// Drops window entries whose age reached `failure_window`.
    fn prune_window(&self, state: &mut BreakerState, now: Instant) {
        while let Some(oldest) = state.failure_timestamps.front() {
            if now.duration_since(*oldest) >= self.config.failure_window {
                state.failure_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.read().await.state
    }

    /// Counters as of now.
    pub async fn metrics(&self) -> MetricsSnapshot {
        self.state.read().await.metrics.snapshot()
    }

    /// Failures currently inside the sliding window.
    pub async fn failures_in_window(&self) -> usize {
        let state = self.state.read().await;
        Self::count_in_window(&state, self.config.failure_window, Instant::now())
    }

    /// Read-only projection for monitoring surfaces.
    pub async fn status(&self) -> StatusSnapshot {
        let state = self.state.read().await;
        StatusSnapshot {
            name: self.name.clone(),
            state: state.state,
            failures_in_window: Self::count_in_window(
                &state,
                self.config.failure_window,
                Instant::now(),
            ),
            failure_threshold: self.config.failure_threshold,
            opened_at: state.opened_at_utc,
            metrics: state.metrics.snapshot(),
        }
    }

    /// Forces the breaker to CLOSED and clears the failure window. Lifetime
    /// counters are kept.
    pub async fn reset(&self) {
        info!("Manually resetting circuit breaker: {}", self.name);
        let mut state = self.state.write().await;
        state.failure_timestamps.clear();
        state.successes_in_half_open = 0;
        state.opened_at = None;
        state.opened_at_utc = None;
        state.probe_in_flight = false;
        if state.state != CircuitState::Closed {
            self.transition(&mut state, CircuitState::Closed);
            self.increment_metric("closed");
        }
    }

    fn count_in_window(state: &BreakerState, window: Duration, now: Instant) -> usize {
        state
            .failure_timestamps
            .iter()
            .filter(|&&at| now.duration_since(at) < window)
            .count()
    }

    fn increment_metric(&self, key: &str) {
        counter!(
            format!("circuit_breaker_{}", key),
            &[("name", self.name.clone())]
        )
        .increment(1);
    }

    fn set_state_gauge(&self, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        };
        gauge!("circuit_breaker_state", &[("name", self.name.clone())]).set(value);
    }
}

/// Runs `operation` through `breaker`; shorthand for [`CircuitBreaker::call`].
pub async fn with_breaker<F, Fut, T, E>(
    breaker: &CircuitBreaker,
    operation: F,
) -> Result<CallOutcome<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    breaker.call(operation).await
}
