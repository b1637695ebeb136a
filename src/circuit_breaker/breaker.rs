use super::types::{BreakerStatus, CircuitBreakerConfig, CircuitState, RollingStats};
use crate::error::{GatewayError, Result, UpstreamKind};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// One slice of the rolling window
#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    fires: u64,
    successes: u64,
    failures: u64,
    timeouts: u64,
    rejects: u64,
}

/// State guarded by the breaker mutex. All transitions happen under the
/// lock; the protected call itself runs outside it.
#[derive(Debug)]
struct Inner {
    state: CircuitState,
    buckets: VecDeque<Bucket>,
    bucket_start: Instant,
    last_state_change: Instant,
    /// A half-open trial is in flight; concurrent callers are rejected
    trial_in_flight: bool,
}

impl Inner {
    fn new(buckets: u32) -> Self {
        let mut ring = VecDeque::with_capacity(buckets as usize);
        ring.push_back(Bucket::default());
        Self {
            state: CircuitState::Closed,
            buckets: ring,
            bucket_start: Instant::now(),
            last_state_change: Instant::now(),
            trial_in_flight: false,
        }
    }

    fn current(&mut self) -> &mut Bucket {
        self.buckets.back_mut().expect("ring is never empty")
    }

    fn stats(&self) -> RollingStats {
        let mut stats = RollingStats::default();
        for bucket in &self.buckets {
            stats.fires += bucket.fires;
            stats.successes += bucket.successes;
            stats.failures += bucket.failures;
            stats.timeouts += bucket.timeouts;
            stats.rejects += bucket.rejects;
        }
        stats
    }

    fn reset_stats(&mut self) {
        self.buckets.clear();
        self.buckets.push_back(Bucket::default());
        self.bucket_start = Instant::now();
    }
}

/// Circuit breaker guarding one upstream.
///
/// Failure rate is tracked over a rolling window of fixed-width buckets;
/// when the error percentage of admitted calls crosses the configured
/// threshold the breaker opens and rejects without touching the upstream.
/// After the reset timeout a single trial call probes the upstream: a
/// success closes the circuit and clears the stats, any failure re-opens
/// it.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let buckets = config.rolling_count_buckets;
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::new(buckets)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `op` through the breaker.
    ///
    /// The operation is raced against the breaker timeout; a timeout
    /// counts as a failure and surfaces as an upstream-timeout error.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let trial = self.admit().await?;

        let outcome = tokio::time::timeout(self.config.timeout(), op()).await;

        match outcome {
            Ok(Ok(value)) => {
                self.record_success(trial).await;
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure(trial, false).await;
                Err(err)
            }
            Err(_) => {
                self.record_failure(trial, true).await;
                Err(GatewayError::Upstream {
                    kind: UpstreamKind::Timeout,
                    message: format!(
                        "call through circuit '{}' exceeded {}ms",
                        self.name, self.config.timeout_ms
                    ),
                })
            }
        }
    }

    /// Admission check. Returns whether this call is the half-open trial.
    async fn admit(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        self.rotate(&mut inner);

        match inner.state {
            CircuitState::Closed => {
                inner.current().fires += 1;
                Ok(false)
            }
            CircuitState::Open => {
                if inner.last_state_change.elapsed() >= self.config.reset_timeout() {
                    info!(circuit = %self.name, "Circuit half-open, admitting trial request");
                    inner.state = CircuitState::HalfOpen;
                    inner.last_state_change = Instant::now();
                    inner.trial_in_flight = true;
                    inner.current().fires += 1;
                    Ok(true)
                } else {
                    inner.current().rejects += 1;
                    Err(GatewayError::CircuitOpen(self.name.clone()))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.current().rejects += 1;
                    Err(GatewayError::CircuitOpen(self.name.clone()))
                } else {
                    inner.trial_in_flight = true;
                    inner.current().fires += 1;
                    Ok(true)
                }
            }
        }
    }

    async fn record_success(&self, trial: bool) {
        let mut inner = self.inner.lock().await;
        self.rotate(&mut inner);
        inner.current().successes += 1;

        if trial {
            info!(circuit = %self.name, "Trial request succeeded, closing circuit");
            inner.state = CircuitState::Closed;
            inner.trial_in_flight = false;
            inner.last_state_change = Instant::now();
            inner.reset_stats();
        }
    }

    async fn record_failure(&self, trial: bool, timed_out: bool) {
        let mut inner = self.inner.lock().await;
        self.rotate(&mut inner);
        if timed_out {
            inner.current().timeouts += 1;
        } else {
            inner.current().failures += 1;
        }

        match inner.state {
            CircuitState::HalfOpen => {
                warn!(circuit = %self.name, "Trial request failed, re-opening circuit");
                inner.state = CircuitState::Open;
                inner.trial_in_flight = false;
                inner.last_state_change = Instant::now();
            }
            CircuitState::Closed => {
                let stats = inner.stats();
                if stats.error_percentage() >= self.config.error_threshold_percentage {
                    warn!(
                        circuit = %self.name,
                        error_percentage = stats.error_percentage(),
                        threshold = self.config.error_threshold_percentage,
                        fires = stats.fires,
                        "Error threshold crossed, opening circuit"
                    );
                    inner.state = CircuitState::Open;
                    inner.last_state_change = Instant::now();
                }
            }
            CircuitState::Open => {}
        }

        // Late results from before a trial was admitted must not strand
        // the half-open state.
        if trial && inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    /// Advance the bucket ring to the current time slot
    fn rotate(&self, inner: &mut Inner) {
        let bucket_duration = self.config.bucket_duration();
        if bucket_duration.is_zero() {
            return;
        }

        let elapsed = inner.bucket_start.elapsed();
        let advance = (elapsed.as_millis() / bucket_duration.as_millis()) as u32;
        if advance == 0 {
            return;
        }

        // Advancing past the whole window is equivalent to clearing it
        let advance = advance.min(self.config.rolling_count_buckets);
        for _ in 0..advance {
            if inner.buckets.len() as u32 >= self.config.rolling_count_buckets {
                inner.buckets.pop_front();
            }
            inner.buckets.push_back(Bucket::default());
        }
        inner.bucket_start += bucket_duration * advance;
    }

    pub async fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().await;
        self.rotate(&mut inner);

        // Surface the pending half-open transition to observers
        if inner.state == CircuitState::Open
            && inner.last_state_change.elapsed() >= self.config.reset_timeout()
        {
            return CircuitState::HalfOpen;
        }
        inner.state
    }

    pub async fn status(&self) -> BreakerStatus {
        let mut inner = self.inner.lock().await;
        self.rotate(&mut inner);
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            stats: inner.stats(),
            config: self.config.clone(),
        }
    }

    /// Operational override: reject all calls until force-closed or the
    /// reset timeout elapses.
    pub async fn force_open(&self) {
        let mut inner = self.inner.lock().await;
        warn!(circuit = %self.name, "Circuit forced open");
        inner.state = CircuitState::Open;
        inner.trial_in_flight = false;
        inner.last_state_change = Instant::now();
    }

    /// Operational override: resume normal operation with fresh stats
    pub async fn force_close(&self) {
        let mut inner = self.inner.lock().await;
        info!(circuit = %self.name, "Circuit forced closed");
        inner.state = CircuitState::Closed;
        inner.trial_in_flight = false;
        inner.last_state_change = Instant::now();
        inner.reset_stats();
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
