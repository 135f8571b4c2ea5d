use crate::circuit_breaker::CircuitBreakerConfig;
use crate::validation::ConfigValidator;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry settings; delays are stored as milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryPolicyConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl ConfigValidator for RetryPolicyConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(crate::ConfigError::Validation(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(crate::ConfigError::Validation(
                "backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(crate::ConfigError::Validation(
                "initial_delay_ms must be less than or equal to max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry: RetryPolicyConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicyConfig {
                max_attempts: 3,
                initial_delay_ms: 200,
                max_delay_ms: 5_000,
                backoff_multiplier: 2.0,
                use_jitter: true,
            },
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ConfigValidator for ResilienceConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resilience_config_default() {
        let config = ResilienceConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_delay(), Duration::from_secs(5));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_config_validation() {
        let mut config = RetryPolicyConfig::default();
        assert!(config.validate().is_ok());

        config.max_attempts = 0;
        assert!(config.validate().is_err());

        let config = RetryPolicyConfig {
            initial_delay_ms: 10_000,
            max_delay_ms: 1_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
