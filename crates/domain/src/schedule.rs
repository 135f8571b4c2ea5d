//! Scheduled messages and the policies applied to missed executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 错过执行时间后的处理策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MissedExecutionBehavior {
    /// 跳过错过的执行，直接调度到下一次
    #[default]
    SkipMissed,
    /// 只补执行最近一次
    ExecuteLatestMissed,
    /// 补执行所有错过的执行（受补偿上限约束）
    ExecuteAllMissed,
    /// 禁用该调度
    DisableSchedule,
}

impl MissedExecutionBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissedExecutionBehavior::SkipMissed => "skip_missed",
            MissedExecutionBehavior::ExecuteLatestMissed => "execute_latest_missed",
            MissedExecutionBehavior::ExecuteAllMissed => "execute_all_missed",
            MissedExecutionBehavior::DisableSchedule => "disable_schedule",
        }
    }
}

/// 持久化的定时消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: String,
    /// 反序列化时使用的消息类型名称
    pub message_name: String,
    pub message_body: String,
    /// 载荷的消息版本，0 表示未版本化
    #[serde(default)]
    pub message_version: u32,
    pub cron_expression: Option<String>,
    pub interval: Option<Duration>,
    pub next_execution_utc: DateTime<Utc>,
    pub last_execution_utc: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub correlation_id: Option<String>,
    pub trace_parent: Option<String>,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub missed_execution_behavior: MissedExecutionBehavior,
}

impl ScheduledMessage {
    /// 创建一次性定时消息
    pub fn new<I, N, B>(id: I, message_name: N, message_body: B, execute_at: DateTime<Utc>) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        B: Into<String>,
    {
        Self {
            id: id.into(),
            message_name: message_name.into(),
            message_body: message_body.into(),
            message_version: 0,
            cron_expression: None,
            interval: None,
            next_execution_utc: execute_at,
            last_execution_utc: None,
            enabled: true,
            correlation_id: None,
            trace_parent: None,
            tenant_id: None,
            user_id: None,
            missed_execution_behavior: MissedExecutionBehavior::default(),
        }
    }

    pub fn with_cron<S: Into<String>>(mut self, cron_expression: S) -> Self {
        self.cron_expression = Some(cron_expression.into());
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.message_version = version;
        self
    }

    pub fn with_correlation_id<S: Into<String>>(mut self, correlation_id: S) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_trace_parent<S: Into<String>>(mut self, trace_parent: S) -> Self {
        self.trace_parent = Some(trace_parent.into());
        self
    }

    pub fn with_tenant<S: Into<String>>(mut self, tenant_id: S) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_user<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_missed_execution_behavior(mut self, behavior: MissedExecutionBehavior) -> Self {
        self.missed_execution_behavior = behavior;
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_execution_utc <= now
    }

    pub fn is_one_shot(&self) -> bool {
        self.cron_expression.is_none() && self.interval.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let due = ScheduledMessage::new("s-1", "Ping", "{}", now - ChronoDuration::minutes(5));
        let future = ScheduledMessage::new("s-2", "Ping", "{}", now + ChronoDuration::hours(1));
        assert!(due.is_due(now));
        assert!(!future.is_due(now));

        let mut disabled = due.clone();
        disabled.enabled = false;
        assert!(!disabled.is_due(now));
    }

    #[test]
    fn test_one_shot_detection() {
        let now = Utc::now();
        let one_shot = ScheduledMessage::new("s-1", "Ping", "{}", now);
        assert!(one_shot.is_one_shot());
        assert!(!one_shot.clone().with_cron("0 * * * * *").is_one_shot());
        assert!(!one_shot.with_interval(Duration::from_secs(60)).is_one_shot());
    }
}
