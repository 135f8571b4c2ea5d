use crate::{validation::ConfigValidator, ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    #[serde(with = "crate::duration_serde")]
    pub recovery_timeout: Duration,
    pub success_threshold: usize,
    #[serde(with = "crate::duration_serde")]
    pub call_timeout: Duration,
    pub backoff_multiplier: f64,
    #[serde(with = "crate::duration_serde")]
    pub max_recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            call_timeout: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_recovery_timeout: Duration::from_secs(300),
        }
    }
}

impl ConfigValidator for CircuitBreakerConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::Validation(
                "success_threshold must be greater than 0".to_string(),
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation(
                "backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.recovery_timeout.is_zero() || self.call_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "recovery_timeout and call_timeout must be greater than 0".to_string(),
            ));
        }
        if self.recovery_timeout > self.max_recovery_timeout {
            return Err(ConfigError::Validation(
                "recovery_timeout must be less than or equal to max_recovery_timeout".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_config_validation() {
        let config = CircuitBreakerConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.failure_threshold = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.call_timeout = Duration::ZERO;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.recovery_timeout = Duration::from_secs(400);
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_durations_serialize_as_seconds() {
        let config = CircuitBreakerConfig::default();
        let json = serde_json::to_value(&config).expect("serialize");
        assert_eq!(json["recovery_timeout"], 60);
        assert_eq!(json["max_recovery_timeout"], 300);

        let back: CircuitBreakerConfig = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.call_timeout, Duration::from_secs(30));
    }
}
