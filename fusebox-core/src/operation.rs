//! Call-site wrapping.
//!
//! [`Operation`] gives the breaker one `invoke()` seam regardless of whether
//! the work is synchronous or suspends. [`guard`] reproduces the call-site
//! adapter pattern: it takes an operation plus a breaker config and hands
//! back an equivalent operation that routes every invocation through the
//! named breaker.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::breaker::CallOutcome;
use crate::config::BreakerConfig;
use crate::error::ConfigError;
use crate::registry::BreakerRegistry;

/// A unit of work that can be routed through a circuit breaker.
///
/// Plain `FnMut` closures returning futures implement this via the blanket
/// impl; synchronous work just computes inside the async block. Stateful
/// operations implement `invoke` directly and keep their state across calls.
#[async_trait]
pub trait Operation {
    type Output;
    type Error;

    async fn invoke(&mut self) -> Result<Self::Output, Self::Error>;
}

#[async_trait]
impl<F, Fut, T, E> Operation for F
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    type Output = T;
    type Error = E;

    async fn invoke(&mut self) -> Result<T, E> {
        (self)().await
    }
}

/// An operation bound to a named breaker. Produced by [`guard`].
pub struct Guarded<Op> {
    registry: Arc<BreakerRegistry>,
    config: BreakerConfig,
    inner: Op,
}

impl<Op> fmt::Debug for Guarded<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("breaker", &self.config.name)
            .finish_non_exhaustive()
    }
}

impl<Op> Guarded<Op> {
    /// The breaker name this operation is routed through.
    pub fn breaker_name(&self) -> &str {
        &self.config.name
    }
}

/// Wraps `operation` so that every invocation resolves the breaker named by
/// `config` through `registry` (registering it on first use) and runs
/// `breaker.call(operation)`.
///
/// The config is validated here, so a misconfigured wrapper fails at
/// construction rather than on first traffic.
pub fn guard<Op>(
    registry: Arc<BreakerRegistry>,
    config: BreakerConfig,
    operation: Op,
) -> Result<Guarded<Op>, ConfigError>
where
    Op: Operation,
{
    config.validate()?;
    Ok(Guarded {
        registry,
        config,
        inner: operation,
    })
}

#[async_trait]
impl<Op> Operation for Guarded<Op>
where
    Op: Operation + Send,
    Op::Output: Send,
    Op::Error: Send,
{
    type Output = CallOutcome<Op::Output>;
    type Error = Op::Error;

    /// Resolves the breaker by name on every invocation, so a breaker that
    /// was administratively removed and re-registered is picked up
    /// transparently.
    async fn invoke(&mut self) -> Result<CallOutcome<Op::Output>, Op::Error> {
        let breaker = self.registry.resolve(&self.config);
        breaker.invoke(&mut self.inner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_closure_operations_implement_invoke() {
        let mut attempts = 0u32;
        let mut operation = || {
            attempts += 1;
            async move { Ok::<u32, &str>(attempts) }
        };

        assert_eq!(operation.invoke().await, Ok(1));
        assert_eq!(operation.invoke().await, Ok(2));
    }

    #[tokio::test]
    async fn test_guard_rejects_invalid_config() {
        let registry = Arc::new(BreakerRegistry::new());
        let config = BreakerConfig::new("bad").with_failure_window(Duration::ZERO);

        let result = guard(registry, config, || async { Ok::<(), &str>(()) });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_guarded_registers_breaker_on_first_invoke() {
        let registry = Arc::new(BreakerRegistry::new());
        let config = BreakerConfig::new("lazy");

        let mut guarded =
            guard(registry.clone(), config, || async { Ok::<u32, &str>(1) }).unwrap();
        assert!(registry.is_empty());

        let outcome = guarded.invoke().await.unwrap();
        assert_eq!(outcome, CallOutcome::Success(1));
        assert_eq!(registry.len(), 1);
        assert_eq!(guarded.breaker_name(), "lazy");
    }
}
