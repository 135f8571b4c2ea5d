use super::resilience::RetryPolicyConfig;
use crate::validation::ConfigValidator;
use serde::{Deserialize, Serialize};

/// Saga编排配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SagaConfig {
    pub default_retry: RetryPolicyConfig,
    /// 单步执行超时（秒），为空表示不限制
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_timeout_seconds: Option<u64>,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            default_retry: RetryPolicyConfig::default(),
            step_timeout_seconds: None,
        }
    }
}

impl ConfigValidator for SagaConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.default_retry.validate()?;
        if self.step_timeout_seconds == Some(0) {
            return Err(crate::ConfigError::Validation(
                "saga.step_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
