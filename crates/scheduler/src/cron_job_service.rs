//! Recurring cron job execution with missed-run handling.

use crate::cron_utils::CronScheduler;
use chrono::{DateTime, Utc};
use dispatch_config::CronJobConfig;
use dispatch_coordination::DistributedJobCoordinator;
use dispatch_domain::{
    CronJobStore, Dispatcher, MessageContext, MessageResult, MessageSerializer,
    MissedExecutionBehavior, RecurringCronJob,
};
use dispatch_errors::{DispatchError, DispatchResult};
use dispatch_infrastructure::StructuredLogger;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// CRON作业消息来源标记
pub const CRON_SOURCE: &str = "cron";

/// 一轮到期作业处理的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CronRunSummary {
    pub due: usize,
    pub executions: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 被跳过的执行（含未获取到锁的作业与按策略跳过的错过执行）
    pub skipped: usize,
    pub disabled: usize,
}

/// CRON作业服务
///
/// 管理周期作业的生命周期并按计划执行。配置了协调器时，每个作业在执行期间
/// 持有 `cron:{job_id}` 分布式锁，同一时刻只有一个实例执行。
pub struct CronJobService {
    store: Arc<dyn CronJobStore>,
    serializer: Arc<dyn MessageSerializer>,
    dispatcher: Arc<dyn Dispatcher>,
    coordinator: Option<Arc<DistributedJobCoordinator>>,
    config: CronJobConfig,
}

impl CronJobService {
    pub fn new(
        store: Arc<dyn CronJobStore>,
        serializer: Arc<dyn MessageSerializer>,
        dispatcher: Arc<dyn Dispatcher>,
        config: CronJobConfig,
    ) -> Self {
        Self {
            store,
            serializer,
            dispatcher,
            coordinator: None,
            config,
        }
    }

    pub fn with_coordinator(mut self, coordinator: Arc<DistributedJobCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// 校验CRON表达式，补齐下一次执行时间后入库
    pub async fn add_job(&self, mut job: RecurringCronJob) -> DispatchResult<RecurringCronJob> {
        job.validate()?;
        let scheduler = CronScheduler::new(&job.cron_expression)?;

        if job.next_execution_utc.is_none() {
            let from = match job.start_date {
                Some(start) if start > Utc::now() => start - chrono::Duration::seconds(1),
                _ => Utc::now(),
            };
            job.next_execution_utc = scheduler.next_execution_time(from);
        }

        self.store.add_job(job.clone()).await?;
        info!(
            job_id = %job.id,
            cron = %job.cron_expression,
            frequency = %scheduler.get_frequency_description(),
            "CRON作业已添加"
        );
        Ok(job)
    }

    /// 更新作业；表达式变化时重新计算下一次执行时间
    pub async fn update_job(&self, mut job: RecurringCronJob) -> DispatchResult<()> {
        job.validate()?;
        let scheduler = CronScheduler::new(&job.cron_expression)?;

        let existing = self
            .store
            .get_job(&job.id)
            .await?
            .ok_or_else(|| DispatchError::job_not_found(&job.id))?;
        if existing.cron_expression != job.cron_expression || job.next_execution_utc.is_none() {
            job.next_execution_utc = scheduler.next_execution_time(Utc::now());
        }
        self.store.update_job(job).await
    }

    pub async fn remove_job(&self, id: &str) -> DispatchResult<bool> {
        DispatchError::ensure_not_empty(id, "id")?;
        self.store.remove_job(id).await
    }

    pub async fn get_job(&self, id: &str) -> DispatchResult<Option<RecurringCronJob>> {
        self.store.get_job(id).await
    }

    pub async fn get_jobs_by_tag(&self, tag: &str) -> DispatchResult<Vec<RecurringCronJob>> {
        self.store.get_jobs_by_tag(tag).await
    }

    pub async fn set_job_enabled(&self, id: &str, enabled: bool) -> DispatchResult<bool> {
        self.store.set_job_enabled(id, enabled).await
    }

    /// 执行一次作业消息。处理器失败以错误返回；`retry_on_failure` 的作业按固定间隔
    /// 最多重试 `max_retry_attempts` 次。
    #[instrument(skip(self, job), fields(job.id = %job.id))]
    pub async fn execute_job(&self, job: &RecurringCronJob) -> DispatchResult<MessageResult> {
        let retries = if job.retry_on_failure {
            job.max_retry_attempts
        } else {
            0
        };
        let retry_delay = Duration::from_secs(self.config.retry_delay_seconds);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.execute_once(job, attempt).await {
                Ok(result) => return Ok(result),
                Err(e) if attempt <= retries && Self::is_job_retryable(&e) => {
                    warn!(
                        job_id = %job.id,
                        attempt,
                        max_retries = retries,
                        error = %e,
                        "CRON作业执行失败，{}秒后重试",
                        retry_delay.as_secs()
                    );
                    tokio::time::sleep(retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn is_job_retryable(error: &DispatchError) -> bool {
        !matches!(
            error,
            DispatchError::Validation { .. }
                | DispatchError::HandlerNotFound { .. }
                | DispatchError::Serialization(_)
                | DispatchError::InvalidArgument(_)
                | DispatchError::Cancelled(_)
        ) && !error.is_fatal()
    }

    async fn execute_once(
        &self,
        job: &RecurringCronJob,
        attempt: u32,
    ) -> DispatchResult<MessageResult> {
        let message = self
            .serializer
            .deserialize(&job.message_body, &job.message_type_name)?
            .ok_or_else(|| {
                DispatchError::invalid_operation(format!(
                    "无法解析消息类型 {}",
                    job.message_type_name
                ))
            })?;

        let mut context = MessageContext::builder()
            .message_type(job.message_type_name.clone())
            .source(CRON_SOURCE)
            .external_id(job.id.clone())
            .delivery_count(attempt)
            .build();
        self.dispatcher
            .dispatch_strict(message.as_ref(), &mut context)
            .await
    }

    /// 处理所有到期作业。单个作业的执行失败只计入统计，存储错误才会返回
    pub async fn process_due_jobs(&self, now: DateTime<Utc>) -> DispatchResult<CronRunSummary> {
        let due = self.store.get_due_jobs(now).await?;
        let mut summary = CronRunSummary {
            due: due.len(),
            ..Default::default()
        };

        for job in due {
            let lock = match &self.coordinator {
                Some(coordinator) => {
                    let lock = coordinator
                        .try_acquire_lock(
                            &format!("cron:{}", job.id),
                            Duration::from_secs(self.config.lock_duration_seconds),
                        )
                        .await?;
                    if lock.is_none() {
                        debug!(job_id = %job.id, "作业锁被其他实例持有，跳过");
                        summary.skipped += 1;
                        continue;
                    }
                    lock
                }
                None => None,
            };

            let outcome = self.run_job(job, now, &mut summary).await;

            if let Some(lock) = lock {
                lock.dispose().await;
            }
            outcome?;
        }
        Ok(summary)
    }

    async fn run_job(
        &self,
        mut job: RecurringCronJob,
        now: DateTime<Utc>,
        summary: &mut CronRunSummary,
    ) -> DispatchResult<()> {
        let scheduler = match CronScheduler::new(&job.cron_expression) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "CRON表达式无效，禁用作业");
                job.enabled = false;
                job.last_error = Some(e.to_string());
                summary.disabled += 1;
                return self.store.update_job(job).await;
            }
        };

        let scheduled_at = job.next_execution_utc.unwrap_or(now);
        let cap = self.config.max_missed_executions.max(1);
        // 多取一个用于判断是否超过补偿上限
        let occurrences = scheduler.occurrences_between(scheduled_at, now, cap + 1);
        let missed = occurrences.len().saturating_sub(1);

        let runs = if missed == 0 {
            1
        } else {
            let behavior = job.missed_execution_behavior;
            StructuredLogger::log_missed_executions(&job.id, missed, behavior.as_str());
            match behavior {
                MissedExecutionBehavior::SkipMissed => {
                    summary.skipped += occurrences.len();
                    0
                }
                MissedExecutionBehavior::ExecuteLatestMissed => {
                    summary.skipped += missed;
                    1
                }
                MissedExecutionBehavior::ExecuteAllMissed => {
                    let runs = occurrences.len().min(cap);
                    summary.skipped += occurrences.len() - runs;
                    runs
                }
                MissedExecutionBehavior::DisableSchedule => {
                    warn!(job_id = %job.id, missed, "作业错过执行，按策略禁用");
                    job.enabled = false;
                    summary.disabled += 1;
                    return self.store.update_job(job).await;
                }
            }
        };

        for _ in 0..runs {
            let started = Instant::now();
            let result = self.execute_job(&job).await;
            let error = result.as_ref().err().map(ToString::to_string);

            job.update_run_statistics(result.is_ok(), error.as_deref());
            StructuredLogger::log_cron_job_executed(
                &job.id,
                &job.name,
                result.is_ok(),
                started.elapsed(),
                error.as_deref(),
            );
            summary.executions += 1;
            if result.is_ok() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }

        job.next_execution_utc = scheduler.next_execution_time(now);
        match job.next_execution_utc {
            Some(next) if job.end_date.is_some_and(|end| next > end) => {
                info!(job_id = %job.id, "作业已超出结束时间，停止调度");
                job.enabled = false;
                summary.disabled += 1;
            }
            None => {
                info!(job_id = %job.id, "CRON表达式没有后续执行时间，停止调度");
                job.enabled = false;
                summary.disabled += 1;
            }
            _ => {}
        }
        self.store.update_job(job).await
    }

    /// 后台轮询循环；单轮失败只记录日志
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            "CRON作业服务启动"
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_seconds));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.process_due_jobs(Utc::now()).await {
                        Ok(summary) if summary.due > 0 => info!(?summary, "CRON作业轮询完成"),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "CRON作业轮询失败"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("CRON作业服务收到关闭信号");
                    break;
                }
            }
        }
    }
}
