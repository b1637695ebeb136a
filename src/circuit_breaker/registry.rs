use super::breaker::CircuitBreaker;
use super::types::{BreakerStatus, CircuitBreakerConfig};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Named collection of circuit breakers, one per protected upstream.
///
/// Breakers are created lazily on first use and share the registry's
/// default configuration.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(circuit = %name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(name, self.config.clone()))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.clone())
    }

    pub async fn status(&self, name: &str) -> Option<BreakerStatus> {
        match self.get(name) {
            Some(breaker) => Some(breaker.status().await),
            None => None,
        }
    }

    pub async fn all_status(&self) -> Vec<BreakerStatus> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|entry| entry.clone()).collect();

        let mut statuses = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            statuses.push(breaker.status().await);
        }
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Returns false when no breaker with that name exists
    pub async fn force_open(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.force_open().await;
                true
            }
            None => false,
        }
    }

    pub async fn force_close(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.force_close().await;
                true
            }
            None => false,
        }
    }
}
