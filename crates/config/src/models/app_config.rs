use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    coordination::CoordinationConfig,
    input_validation::InputValidationConfig,
    logging::LogConfig,
    pipeline::PipelineConfig,
    resilience::ResilienceConfig,
    saga::SagaConfig,
    scheduler::{CronJobConfig, SchedulerConfig},
};
use crate::validation::ConfigValidator;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input_validation: InputValidationConfig,
    pub pipeline: PipelineConfig,
    pub scheduler: SchedulerConfig,
    pub cron_jobs: CronJobConfig,
    pub coordination: CoordinationConfig,
    pub saga: SagaConfig,
    pub resilience: ResilienceConfig,
    pub logging: LogConfig,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/dispatch.toml",
                "dispatch.toml",
                "/etc/dispatch/config.toml",
            ];

            let mut config_file_found = false;
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    config_file_found = true;
                    break;
                }
            }

            if !config_file_found {
                builder = builder
                    .set_default("input_validation.enable_validation", true)?
                    .set_default("input_validation.require_correlation_id", true)?
                    .set_default("input_validation.max_message_age_days", 7)?
                    .set_default("scheduler.enabled", true)?
                    .set_default("scheduler.poll_interval_seconds", 1)?
                    .set_default("cron_jobs.enabled", true)?
                    .set_default("cron_jobs.poll_interval_seconds", 30)?
                    .set_default("coordination.backend", "memory")?
                    .set_default("coordination.key_prefix", "dispatch")?
                    .set_default("coordination.heartbeat_interval_seconds", 30)?
                    .set_default("logging.level", "info")?
                    .set_default("logging.format", "json")?;
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("DISPATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.input_validation.validate()?;
        self.pipeline.validate()?;
        self.scheduler.validate()?;
        self.cron_jobs.validate()?;
        self.coordination.validate()?;
        self.saga.validate()?;
        self.resilience.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
