use crate::{RecurringCronJob, ScheduledMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_errors::DispatchResult;

/// 定时消息存储
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn get_all(&self) -> DispatchResult<Vec<ScheduledMessage>>;
    /// 新增或覆盖
    async fn store(&self, message: ScheduledMessage) -> DispatchResult<()>;
    /// 移除已完成的定时消息
    async fn complete(&self, id: &str) -> DispatchResult<()>;
    /// 释放存储资源，可重复调用
    async fn dispose(&self) -> DispatchResult<()>;
}

/// CRON作业存储
#[async_trait]
pub trait CronJobStore: Send + Sync {
    /// 新增作业；ID重复返回 `InvalidOperation`，无效作业返回 `InvalidArgument`
    async fn add_job(&self, job: RecurringCronJob) -> DispatchResult<()>;
    async fn get_job(&self, id: &str) -> DispatchResult<Option<RecurringCronJob>>;
    /// 更新已存在的作业；不存在返回 `JobNotFound`
    async fn update_job(&self, job: RecurringCronJob) -> DispatchResult<()>;
    async fn remove_job(&self, id: &str) -> DispatchResult<bool>;
    async fn get_all_jobs(&self) -> DispatchResult<Vec<RecurringCronJob>>;
    /// 已启用、处于有效时间窗口且下次执行时间不晚于 `now` 的作业
    async fn get_due_jobs(&self, now: DateTime<Utc>) -> DispatchResult<Vec<RecurringCronJob>>;
    async fn get_jobs_by_tag(&self, tag: &str) -> DispatchResult<Vec<RecurringCronJob>>;
    async fn set_job_enabled(&self, id: &str, enabled: bool) -> DispatchResult<bool>;
}
