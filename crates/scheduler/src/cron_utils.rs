use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use dispatch_errors::{DispatchError, DispatchResult};
use std::str::FromStr;
use tracing::debug;

/// CRON表达式解析和调度工具
///
/// 使用带秒字段的6/7段表达式，5段的标准表达式会在前面补上秒字段 `0`。
/// 所有时间均为UTC。
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> DispatchResult<Self> {
        let expression = Self::normalize(cron_expr);
        let schedule = Schedule::from_str(&expression).map_err(|e| DispatchError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expression,
            schedule,
        })
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> DispatchResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    fn normalize(cron_expr: &str) -> String {
        let trimmed = cron_expr.trim();
        if trimmed.split_whitespace().count() == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_string()
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// `from` 之后（不含）的下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// `[from, to]` 闭区间内的执行时间，最多返回 `limit` 个
    pub fn occurrences_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Vec<DateTime<Utc>> {
        if from > to {
            return Vec::new();
        }
        self.schedule
            .after(&(from - Duration::seconds(1)))
            .skip_while(|t| *t < from)
            .take_while(|t| *t <= to)
            .take(limit)
            .collect()
    }

    /// 预期执行时间超过宽限期仍未执行
    pub fn is_overdue(
        &self,
        expected: DateTime<Utc>,
        now: DateTime<Utc>,
        grace_period: Duration,
    ) -> bool {
        let overdue = now > expected + grace_period;
        if overdue {
            debug!(
                "CRON作业已逾期: 预期执行={}, 当前时间={}",
                expected.format("%Y-%m-%d %H:%M:%S UTC"),
                now.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        overdue
    }

    /// 获取任务的执行频率描述
    pub fn get_frequency_description(&self) -> String {
        let upcoming = self.upcoming_times(Utc::now(), 2);
        if upcoming.len() >= 2 {
            let seconds = (upcoming[1] - upcoming[0]).num_seconds();

            match seconds {
                s if s < 60 => format!("每{s}秒"),
                s if s < 3600 => format!("每{}分钟", s / 60),
                s if s < 86400 => format!("每{}小时", s / 3600),
                s if s < 604800 => format!("每{}天", s / 86400),
                s => format!("每{}周", s / 604800),
            }
        } else {
            "无法确定频率".to_string()
        }
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_execution_time(now).map(|next| next - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_cron_scheduler_creation() {
        assert!(CronScheduler::new("0 0 0 * * *").is_ok());
        assert!(CronScheduler::new("invalid").is_err());
        assert!(matches!(
            CronScheduler::new("0 0 0 32 * *"),
            Err(DispatchError::InvalidCron { .. })
        ));
    }

    #[test]
    fn test_five_field_expression_is_normalized() {
        let scheduler = CronScheduler::new("*/5 * * * *").unwrap();
        assert_eq!(scheduler.expression(), "0 */5 * * * *");

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 0).unwrap();
        let next = scheduler.next_execution_time(now).unwrap();
        assert_eq!((next.minute(), next.second()), (5, 0));
    }

    #[test]
    fn test_next_execution_time_is_exclusive() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let on_the_hour = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let next = scheduler.next_execution_time(on_the_hour).unwrap();
        assert_eq!(next.hour(), 13);
    }

    #[test]
    fn test_occurrences_between_is_inclusive_and_limited() {
        let scheduler = CronScheduler::new("0 * * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 1, 12, 5, 0).unwrap();

        assert_eq!(scheduler.occurrences_between(from, to, 100).len(), 6);
        assert_eq!(scheduler.occurrences_between(from, to, 3).len(), 3);
        assert_eq!(scheduler.occurrences_between(from, from, 10), vec![from]);
        assert!(scheduler.occurrences_between(to, from, 10).is_empty());
    }

    #[test]
    fn test_is_overdue() {
        let scheduler = CronScheduler::new("0 * * * * *").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert!(!scheduler.is_overdue(expected, expected + Duration::minutes(4), Duration::minutes(5)));
        assert!(scheduler.is_overdue(expected, expected + Duration::minutes(6), Duration::minutes(5)));
    }

    #[test]
    fn test_frequency_description() {
        assert_eq!(CronScheduler::new("*/10 * * * * *").unwrap().get_frequency_description(), "每10秒");
        assert_eq!(CronScheduler::new("0 */15 * * * *").unwrap().get_frequency_description(), "每15分钟");
        assert_eq!(CronScheduler::new("0 0 0 * * *").unwrap().get_frequency_description(), "每1天");
    }

    #[test]
    fn test_time_until_next_execution() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        assert_eq!(
            scheduler.time_until_next_execution(now),
            Some(Duration::minutes(30))
        );
    }
}
