use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationBackendType {
    #[default]
    Memory,
    Redis,
}

impl std::str::FromStr for CoordinationBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(CoordinationBackendType::Memory),
            "redis" => Ok(CoordinationBackendType::Redis),
            _ => Err(format!(
                "Invalid coordination backend: {s}. Valid backends: memory, redis"
            )),
        }
    }
}

/// 分布式协调配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub backend: CoordinationBackendType,
    pub redis_url: String,
    pub key_prefix: String,
    /// 为空时使用主机名加随机后缀
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub max_concurrent_jobs: u32,
    pub supported_job_types: Vec<String>,
    pub priority: i32,
    pub tags: Vec<String>,
    pub instance_ttl_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    pub instance_staleness_seconds: u64,
    pub leader_key: String,
    pub leader_lease_seconds: u64,
    pub leader_renew_interval_seconds: u64,
    pub connection_timeout_seconds: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            backend: CoordinationBackendType::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "dispatch".to_string(),
            instance_id: None,
            max_concurrent_jobs: 10,
            supported_job_types: vec!["*".to_string()],
            priority: 0,
            tags: Vec::new(),
            instance_ttl_seconds: 90,
            heartbeat_interval_seconds: 30,
            instance_staleness_seconds: 90,
            leader_key: "dispatch-host".to_string(),
            leader_lease_seconds: 30,
            leader_renew_interval_seconds: 10,
            connection_timeout_seconds: 5,
        }
    }
}

impl ConfigValidator for CoordinationConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.backend == CoordinationBackendType::Redis {
            ValidationUtils::validate_url(&self.redis_url, "coordination.redis_url")?;
        }
        ValidationUtils::validate_not_empty(&self.key_prefix, "coordination.key_prefix")?;
        ValidationUtils::validate_not_empty(&self.leader_key, "coordination.leader_key")?;
        if let Some(instance_id) = &self.instance_id {
            ValidationUtils::validate_not_empty(instance_id, "coordination.instance_id")?;
        }
        ValidationUtils::validate_count(
            self.max_concurrent_jobs as usize,
            "coordination.max_concurrent_jobs",
            10_000,
        )?;
        if self.supported_job_types.is_empty() {
            return Err(crate::ConfigError::Validation(
                "coordination.supported_job_types cannot be empty".to_string(),
            ));
        }
        ValidationUtils::validate_timeout_seconds(
            self.heartbeat_interval_seconds,
            "coordination.heartbeat_interval_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.instance_ttl_seconds,
            "coordination.instance_ttl_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.leader_lease_seconds,
            "coordination.leader_lease_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.leader_renew_interval_seconds,
            "coordination.leader_renew_interval_seconds",
        )?;

        if self.heartbeat_interval_seconds >= self.instance_ttl_seconds {
            return Err(crate::ConfigError::Validation(
                "coordination.heartbeat_interval_seconds must be less than instance_ttl_seconds"
                    .to_string(),
            ));
        }
        if self.leader_renew_interval_seconds >= self.leader_lease_seconds {
            return Err(crate::ConfigError::Validation(
                "coordination.leader_renew_interval_seconds must be less than leader_lease_seconds"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordination_config_default_is_valid() {
        let config = CoordinationConfig::default();
        assert_eq!(config.backend, CoordinationBackendType::Memory);
        assert_eq!(config.supported_job_types, vec!["*".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_heartbeat_must_be_shorter_than_ttl() {
        let config = CoordinationConfig {
            heartbeat_interval_seconds: 90,
            instance_ttl_seconds: 90,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let config = CoordinationConfig {
            backend: CoordinationBackendType::Redis,
            redis_url: "localhost".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!(
            "Redis".parse::<CoordinationBackendType>(),
            Ok(CoordinationBackendType::Redis)
        );
        assert!("etcd".parse::<CoordinationBackendType>().is_err());
    }
}
