//! Circuit breaker
//!
//! Closed until `failure_threshold` consecutive failures, then Open for the
//! current recovery timeout. After that one trial window is HalfOpen;
//! `success_threshold` successes close it again, any failure re-opens it with
//! the recovery timeout multiplied by `backoff_multiplier` (capped).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{info, warn};

use dispatch_config::CircuitBreakerConfig;
use dispatch_errors::{DispatchError, DispatchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: usize,
    pub consecutive_successes: usize,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    pub last_state_change: Instant,
    pub current_recovery_timeout: Duration,
}

impl CircuitBreakerStats {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            rejected_calls: 0,
            last_state_change: Instant::now(),
            current_recovery_timeout: config.recovery_timeout,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.failed_calls as f64 / self.total_calls as f64
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    stats: Arc<RwLock<CircuitBreakerStats>>,
}

impl CircuitBreaker {
    pub fn new<S: Into<String>>(name: S, config: CircuitBreakerConfig) -> Self {
        let stats = CircuitBreakerStats::new(&config);
        Self {
            name: name.into(),
            config,
            stats: Arc::new(RwLock::new(stats)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Runs `operation` under the breaker with the configured call timeout.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> DispatchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = DispatchResult<T>>,
    {
        self.try_acquire().await?;

        match tokio::time::timeout(self.config.call_timeout, operation()).await {
            Ok(Ok(result)) => {
                self.record_success().await;
                Ok(result)
            }
            Ok(Err(error)) => {
                self.record_failure().await;
                Err(error)
            }
            Err(_) => {
                self.record_failure().await;
                Err(DispatchError::timeout_error(format!(
                    "{} call exceeded {:?}",
                    self.name, self.config.call_timeout
                )))
            }
        }
    }

    /// `Err(CircuitOpen)` while open; moves Open to HalfOpen once the recovery timeout elapsed.
    pub async fn try_acquire(&self) -> DispatchResult<()> {
        let mut stats = self.stats.write().await;
        match stats.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                if stats.last_state_change.elapsed() >= stats.current_recovery_timeout {
                    stats.state = CircuitState::HalfOpen;
                    stats.last_state_change = Instant::now();
                    stats.consecutive_successes = 0;
                    info!(breaker = %self.name, "Circuit breaker half-open");
                    Ok(())
                } else {
                    stats.rejected_calls += 1;
                    Err(DispatchError::CircuitOpen(self.name.clone()))
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut stats = self.stats.write().await;

        stats.total_calls += 1;
        stats.successful_calls += 1;
        stats.consecutive_successes += 1;
        stats.consecutive_failures = 0;

        if stats.state == CircuitState::HalfOpen
            && stats.consecutive_successes >= self.config.success_threshold
        {
            stats.state = CircuitState::Closed;
            stats.last_state_change = Instant::now();
            stats.current_recovery_timeout = self.config.recovery_timeout;
            info!(breaker = %self.name, "Circuit breaker closed");
        }
    }

    pub async fn record_failure(&self) {
        let mut stats = self.stats.write().await;

        stats.total_calls += 1;
        stats.failed_calls += 1;
        stats.consecutive_failures += 1;
        stats.consecutive_successes = 0;

        if stats.state == CircuitState::Closed
            && stats.consecutive_failures >= self.config.failure_threshold
        {
            stats.state = CircuitState::Open;
            stats.last_state_change = Instant::now();
            stats.current_recovery_timeout = self.config.recovery_timeout;
            warn!(
                breaker = %self.name,
                failures = stats.consecutive_failures,
                "Circuit breaker opened"
            );
        } else if stats.state == CircuitState::HalfOpen {
            stats.state = CircuitState::Open;
            stats.last_state_change = Instant::now();
            stats.current_recovery_timeout = std::cmp::min(
                Duration::from_millis(
                    (stats.current_recovery_timeout.as_millis() as f64
                        * self.config.backoff_multiplier) as u64,
                ),
                self.config.max_recovery_timeout,
            );
            warn!(
                breaker = %self.name,
                recovery_timeout = ?stats.current_recovery_timeout,
                "Circuit breaker re-opened from half-open"
            );
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.stats.read().await.state
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        self.stats.read().await.clone()
    }

    pub async fn reset(&self) {
        let mut stats = self.stats.write().await;
        *stats = CircuitBreakerStats::new(&self.config);
    }

    pub async fn force_open(&self) {
        let mut stats = self.stats.write().await;
        stats.state = CircuitState::Open;
        stats.last_state_change = Instant::now();
    }
}
