//! Named circuit breaker registry.
//!
//! The registry is the only place breakers are created. It is an explicitly
//! constructed, explicitly owned object: build one at the composition root
//! and share it (typically as `Arc<BreakerRegistry>`). There is no hidden
//! global, so tests never leak breakers into each other.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::breaker::CircuitBreaker;
use crate::config::BreakerConfig;
use crate::error::ConfigError;
use crate::status::StatusSnapshot;

/// Process-wide table mapping breaker name to instance.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self {
            breakers: DashMap::new(),
        }
    }

    /// Gets a breaker by name.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.clone())
    }

    /// Returns the breaker registered under `config.name`, creating it on
    /// first use.
    ///
    /// First registration wins: offering a differing config for an existing
    /// name keeps the original (and logs a warning). The config is validated
    /// only when a breaker is actually created.
    pub fn get_or_create(
        &self,
        config: &BreakerConfig,
    ) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(existing) = self.get(&config.name) {
            if existing.config() != config {
                warn!(
                    "Circuit breaker {} already registered; ignoring differing config",
                    config.name
                );
            }
            return Ok(existing);
        }
        config.validate()?;
        Ok(self.resolve(config))
    }

    /// Resolution path for configs that are already validated.
    pub(crate) fn resolve(&self, config: &BreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(config.name.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new_unchecked(config.clone())))
            .clone()
    }

    /// Status of one breaker, `None` when the name is unknown.
    pub async fn status(&self, name: &str) -> Option<StatusSnapshot> {
        match self.get(name) {
            Some(breaker) => Some(breaker.status().await),
            None => None,
        }
    }

    /// Status of every registered breaker.
    pub async fn status_all(&self) -> HashMap<String, StatusSnapshot> {
        // Collect first so no shard lock is held across an await.
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|b| b.value().clone()).collect();

        let mut statuses = HashMap::with_capacity(breakers.len());
        for breaker in breakers {
            statuses.insert(breaker.name().to_string(), breaker.status().await);
        }
        statuses
    }

    /// Forces the named breaker to CLOSED and clears its failure window.
    /// Returns false when the name is unknown.
    pub async fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset().await;
                true
            }
            None => false,
        }
    }

    /// Resets every registered breaker.
    pub async fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|b| b.value().clone()).collect();
        for breaker in breakers {
            breaker.reset().await;
        }
    }

    /// Removes a breaker entirely. Callers still holding its `Arc` keep a
    /// working instance; the registry just stops handing it out.
    pub fn remove(&self, name: &str) -> bool {
        self.breakers.remove(name).is_some()
    }

    /// Names of all registered breakers.
    pub fn names(&self) -> Vec<String> {
        self.breakers.iter().map(|b| b.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
