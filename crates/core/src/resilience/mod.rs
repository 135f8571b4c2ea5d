//! Resilience stage: retry and circuit breaking around the rest of the chain.

mod circuit_breaker;
mod middleware;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use middleware::{CircuitBreakerMiddleware, RetryMiddleware, RETRY_ATTEMPT_ITEM};

use dispatch_config::RetryPolicyConfig;
use dispatch_domain::RetryPolicy;

pub fn retry_policy_from_config(config: &RetryPolicyConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.max_attempts,
        initial_delay: config.initial_delay(),
        max_delay: config.max_delay(),
        backoff_multiplier: config.backoff_multiplier,
        use_jitter: config.use_jitter,
    }
}
