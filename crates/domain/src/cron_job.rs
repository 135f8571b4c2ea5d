use crate::schedule::MissedExecutionBehavior;
use chrono::{DateTime, Utc};
use dispatch_errors::{DispatchError, DispatchResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 周期性CRON作业
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringCronJob {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub cron_expression: String,
    pub message_type_name: String,
    pub message_body: String,
    pub enabled: bool,
    pub next_execution_utc: Option<DateTime<Utc>>,
    pub last_execution_utc: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub failure_count: u64,
    pub last_error: Option<String>,
    pub missed_execution_behavior: MissedExecutionBehavior,
    pub retry_on_failure: bool,
    pub max_retry_attempts: u32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RecurringCronJob {
    pub fn new<I, N, C, T, B>(
        id: I,
        name: N,
        cron_expression: C,
        message_type_name: T,
        message_body: B,
    ) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        C: Into<String>,
        T: Into<String>,
        B: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            cron_expression: cron_expression.into(),
            message_type_name: message_type_name.into(),
            message_body: message_body.into(),
            enabled: true,
            next_execution_utc: None,
            last_execution_utc: None,
            run_count: 0,
            failure_count: 0,
            last_error: None,
            missed_execution_behavior: MissedExecutionBehavior::SkipMissed,
            retry_on_failure: false,
            max_retry_attempts: 0,
            start_date: None,
            end_date: None,
            tags: Vec::new(),
            priority: 0,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_window(
        mut self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    pub fn with_missed_execution_behavior(mut self, behavior: MissedExecutionBehavior) -> Self {
        self.missed_execution_behavior = behavior;
        self
    }

    pub fn with_retry(mut self, max_retry_attempts: u32) -> Self {
        self.retry_on_failure = max_retry_attempts > 0;
        self.max_retry_attempts = max_retry_attempts;
        self
    }

    pub fn with_next_execution(mut self, next: DateTime<Utc>) -> Self {
        self.next_execution_utc = Some(next);
        self
    }

    /// 作业在时间点 `t` 是否允许运行：已启用且位于 `[start_date, end_date]` 闭区间内
    pub fn should_run_at(&self, t: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(start) = self.start_date {
            if t < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if t > end {
                return false;
            }
        }
        true
    }

    /// 作业已到期：允许运行且下次执行时间不晚于 `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.should_run_at(now) && self.next_execution_utc.is_some_and(|next| next <= now)
    }

    /// 更新运行统计：总是累加运行次数，失败时累加失败次数并覆盖错误信息，成功时清除错误信息
    pub fn update_run_statistics(&mut self, success: bool, error: Option<&str>) {
        self.run_count += 1;
        self.last_execution_utc = Some(Utc::now());
        if success {
            self.last_error = None;
        } else {
            self.failure_count += 1;
            self.last_error = Some(error.unwrap_or("未知错误").to_string());
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn success_rate(&self) -> f64 {
        if self.run_count == 0 {
            0.0
        } else {
            (self.run_count - self.failure_count) as f64 / self.run_count as f64
        }
    }

    /// 入库前的基本校验，失败返回 `InvalidArgument`
    pub fn validate(&self) -> DispatchResult<()> {
        DispatchError::ensure_not_empty(&self.id, "id")?;
        DispatchError::ensure_not_empty(&self.name, "name")?;
        DispatchError::ensure_not_empty(&self.cron_expression, "cron_expression")?;
        DispatchError::ensure_not_empty(&self.message_type_name, "message_type_name")?;
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(DispatchError::invalid_argument(format!(
                    "作业 {} 的开始时间晚于结束时间",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job() -> RecurringCronJob {
        RecurringCronJob::new("job-1", "nightly", "0 0 2 * * *", "Cleanup", "{}")
    }

    #[test]
    fn test_should_run_at_window_is_inclusive() {
        let now = Utc::now();
        let job = job().with_window(Some(now), Some(now + Duration::hours(1)));

        assert!(job.should_run_at(now));
        assert!(job.should_run_at(now + Duration::hours(1)));
        assert!(!job.should_run_at(now - Duration::seconds(1)));
        assert!(!job.should_run_at(now + Duration::hours(1) + Duration::seconds(1)));
    }

    #[test]
    fn test_should_run_at_open_bounds_and_disabled() {
        let now = Utc::now();
        let mut job = job();
        assert!(job.should_run_at(now - Duration::days(365)));
        job.enabled = false;
        assert!(!job.should_run_at(now));
    }

    #[test]
    fn test_update_run_statistics() {
        let mut job = job();
        job.update_run_statistics(false, Some("timeout"));
        assert_eq!(job.run_count, 1);
        assert_eq!(job.failure_count, 1);
        assert_eq!(job.last_error.as_deref(), Some("timeout"));

        job.update_run_statistics(false, Some("refused"));
        assert_eq!(job.failure_count, 2);
        assert_eq!(job.last_error.as_deref(), Some("refused"));

        job.update_run_statistics(true, None);
        assert_eq!(job.run_count, 3);
        assert_eq!(job.failure_count, 2);
        assert!(job.last_error.is_none());
        assert!(job.last_execution_utc.is_some());
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        assert!(job().with_next_execution(now - Duration::minutes(5)).is_due(now));
        assert!(!job().with_next_execution(now + Duration::hours(1)).is_due(now));
        assert!(!job().is_due(now));
    }

    #[test]
    fn test_validate() {
        assert!(job().validate().is_ok());

        let mut invalid = job();
        invalid.id = String::new();
        assert!(matches!(
            invalid.validate(),
            Err(DispatchError::InvalidArgument(_))
        ));

        let now = Utc::now();
        let inverted = job().with_window(Some(now), Some(now - Duration::hours(1)));
        assert!(matches!(
            inverted.validate(),
            Err(DispatchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_with_retry_and_tags() {
        let job = job().with_retry(3).with_tags(["billing", "nightly"]);
        assert!(job.retry_on_failure);
        assert_eq!(job.max_retry_attempts, 3);
        assert!(job.has_tag("billing"));
        assert!(!job.has_tag("Billing"));
    }
}
