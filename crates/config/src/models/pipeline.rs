use crate::validation::ConfigValidator;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub enable_retry: bool,
    pub enable_circuit_breaker: bool,
    pub auto_upcast_on_replay: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_retry: true,
            enable_circuit_breaker: true,
            auto_upcast_on_replay: true,
        }
    }
}

impl ConfigValidator for PipelineConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        Ok(())
    }
}
