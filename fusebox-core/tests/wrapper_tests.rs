use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fusebox_core::{
    guard, BreakerConfig, BreakerRegistry, CallOutcome, CircuitState, FallbackReason, Operation,
};

// ===== Helpers =====

/// A dependency that fails a fixed number of times before recovering.
struct FlakyDependency {
    attempts: usize,
    failures_before_success: usize,
}

#[async_trait]
impl Operation for FlakyDependency {
    type Output = usize;
    type Error = String;

    async fn invoke(&mut self) -> Result<usize, String> {
        self.attempts += 1;
        if self.attempts <= self.failures_before_success {
            Err(format!("attempt {} failed", self.attempts))
        } else {
            Ok(self.attempts)
        }
    }
}

async fn invoke_generic<Op>(op: &mut Op) -> Result<Op::Output, Op::Error>
where
    Op: Operation + Send,
{
    op.invoke().await
}

// ===== Wrapping =====

#[tokio::test]
async fn test_stateful_operation_keeps_state_across_invocations() {
    let registry = Arc::new(BreakerRegistry::new());
    let config = BreakerConfig::new("flaky").with_failure_threshold(10);
    let dependency = FlakyDependency {
        attempts: 0,
        failures_before_success: 2,
    };

    let mut guarded = guard(registry, config, dependency).unwrap();

    // genuine failures come back as the operation's own error
    assert_eq!(guarded.invoke().await, Err("attempt 1 failed".to_string()));
    assert_eq!(guarded.invoke().await, Err("attempt 2 failed".to_string()));
    assert_eq!(guarded.invoke().await, Ok(CallOutcome::Success(3)));
}

#[tokio::test]
async fn test_open_breaker_short_circuits_the_inner_operation() {
    let registry = Arc::new(BreakerRegistry::new());
    let config = BreakerConfig::new("down").with_failure_threshold(1);

    let invocations = Arc::new(AtomicUsize::new(0));
    let spy = invocations.clone();
    let mut guarded = guard(registry, config, move || {
        let spy = spy.clone();
        async move {
            spy.fetch_add(1, Ordering::SeqCst);
            Err::<(), &str>("down")
        }
    })
    .unwrap();

    assert_eq!(guarded.invoke().await, Err("down"));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    match guarded.invoke().await {
        Ok(CallOutcome::Fallback(payload)) => {
            assert_eq!(payload.reason, FallbackReason::CircuitOpen);
        }
        other => panic!("expected fallback, got {:?}", other),
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wrapper_and_direct_handles_share_one_breaker() {
    let registry = Arc::new(BreakerRegistry::new());
    let config = BreakerConfig::new("db").with_failure_threshold(1);

    let mut guarded =
        guard(registry.clone(), config, || async { Ok::<u32, &str>(7) }).unwrap();
    assert_eq!(guarded.invoke().await, Ok(CallOutcome::Success(7)));

    // trip the same breaker through the registry handle
    let breaker = registry.get("db").unwrap();
    let _ = breaker.call(|| async { Err::<(), &str>("down") }).await;
    assert_eq!(breaker.state().await, CircuitState::Open);

    match guarded.invoke().await {
        Ok(CallOutcome::Fallback(payload)) => {
            assert_eq!(payload.reason, FallbackReason::CircuitOpen);
        }
        other => panic!("expected fallback, got {:?}", other),
    }
}

#[tokio::test]
async fn test_guarded_composes_as_an_operation() {
    let registry = Arc::new(BreakerRegistry::new());
    let mut guarded = guard(registry, BreakerConfig::new("math"), || async {
        Ok::<u64, &str>(6 * 7)
    })
    .unwrap();

    let outcome = invoke_generic(&mut guarded).await.unwrap();
    assert_eq!(outcome, CallOutcome::Success(42));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_through_the_wrapper_returns_fallback() {
    let registry = Arc::new(BreakerRegistry::new());
    let config = BreakerConfig::new("slow").with_call_timeout(Duration::from_secs(2));

    let mut guarded = guard(registry.clone(), config, || async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<(), &str>(())
    })
    .unwrap();

    match guarded.invoke().await {
        Ok(CallOutcome::Fallback(payload)) => {
            assert_eq!(payload.reason, FallbackReason::Timeout);
        }
        other => panic!("expected timeout fallback, got {:?}", other),
    }

    let breaker = registry.get("slow").unwrap();
    assert_eq!(breaker.metrics().await.failed_calls, 1);
}
