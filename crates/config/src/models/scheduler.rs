use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 定时消息轮询配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub poll_interval_seconds: u64,
    pub dispatch_timeout_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: 1,
            dispatch_timeout_seconds: 30,
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(
            self.poll_interval_seconds,
            "scheduler.poll_interval_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.dispatch_timeout_seconds,
            "scheduler.dispatch_timeout_seconds",
        )?;
        Ok(())
    }
}

/// CRON作业服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CronJobConfig {
    pub enabled: bool,
    pub poll_interval_seconds: u64,
    /// ExecuteAllMissed 模式下单次补偿执行的最大次数
    pub max_missed_executions: usize,
    pub retry_delay_seconds: u64,
    /// 作业执行期间持有的分布式锁时长
    pub lock_duration_seconds: u64,
}

impl Default for CronJobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: 30,
            max_missed_executions: 10,
            retry_delay_seconds: 5,
            lock_duration_seconds: 300,
        }
    }
}

impl ConfigValidator for CronJobConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(
            self.poll_interval_seconds,
            "cron_jobs.poll_interval_seconds",
        )?;
        ValidationUtils::validate_count(
            self.max_missed_executions,
            "cron_jobs.max_missed_executions",
            1000,
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.lock_duration_seconds,
            "cron_jobs.lock_duration_seconds",
        )?;
        Ok(())
    }
}
