//! Polling service that dispatches due scheduled messages.

use crate::cron_utils::CronScheduler;
use chrono::{DateTime, Utc};
use dispatch_config::SchedulerConfig;
use dispatch_core::UpcastingPipeline;
use dispatch_domain::{
    DispatchMessage, Dispatcher, MessageContext, MessageSerializer, MissedExecutionBehavior,
    OperationMonitor, OperationOutcome, ScheduleStore, ScheduledMessage,
};
use dispatch_errors::DispatchResult;
use dispatch_infrastructure::StructuredLogger;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// 定时消息来源标记
pub const SCHEDULER_SOURCE: &str = "scheduler";

/// 统计CRON型定时消息错过次数时的扫描上限
const MISSED_SCAN_LIMIT: usize = 1000;

/// 单次轮询的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub due: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub failed: usize,
    /// 因错过执行按策略禁用的定时消息
    pub disabled: usize,
}

/// 定时消息服务
///
/// 周期性地从存储中取出到期的定时消息，反序列化后送入分发入口，
/// 成功后计算下一次执行时间并写回存储。
pub struct ScheduledMessageService {
    store: Arc<dyn ScheduleStore>,
    serializer: Arc<dyn MessageSerializer>,
    dispatcher: Arc<dyn Dispatcher>,
    monitor: Arc<dyn OperationMonitor>,
    upcasting: Option<Arc<UpcastingPipeline>>,
    poll_interval: Duration,
    dispatch_timeout: Duration,
}

enum Outcome {
    Dispatched,
    Skipped,
    Failed,
    Disabled,
}

impl ScheduledMessageService {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        serializer: Arc<dyn MessageSerializer>,
        dispatcher: Arc<dyn Dispatcher>,
        monitor: Arc<dyn OperationMonitor>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            serializer,
            dispatcher,
            monitor,
            upcasting: None,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            dispatch_timeout: Duration::from_secs(config.dispatch_timeout_seconds),
        }
    }

    /// 启用重放时升级：存储中带版本号的载荷在反序列化前先升级到最新版本
    pub fn with_upcasting(mut self, pipeline: Arc<UpcastingPipeline>) -> Self {
        self.upcasting = Some(pipeline);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_dispatch_timeout(mut self, dispatch_timeout: Duration) -> Self {
        self.dispatch_timeout = dispatch_timeout;
        self
    }

    /// 处理一次到期的定时消息
    pub async fn process_due_messages(&self) -> DispatchResult<TickSummary> {
        let now = Utc::now();
        let due: Vec<ScheduledMessage> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|schedule| schedule.is_due(now))
            .collect();

        let mut summary = TickSummary {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return Ok(summary);
        }
        debug!("发现 {} 条到期的定时消息", due.len());

        for schedule in due {
            let span = info_span!(
                "scheduled_dispatch",
                schedule.id = %schedule.id,
                message.name = %schedule.message_name
            );
            match self.process_schedule(schedule).instrument(span).await {
                Outcome::Dispatched => summary.dispatched += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Disabled => summary.disabled += 1,
            }
        }
        Ok(summary)
    }

    async fn process_schedule(&self, mut schedule: ScheduledMessage) -> Outcome {
        let missed = Self::missed_occurrences(&schedule, Utc::now());
        let catch_up = if missed > 0 {
            let behavior = schedule.missed_execution_behavior;
            StructuredLogger::log_scheduled_message_missed(&schedule.id, missed, behavior.as_str());
            match behavior {
                MissedExecutionBehavior::SkipMissed => {
                    Self::reschedule(&mut schedule, Utc::now(), false);
                    return self.persist_without_dispatch(schedule, Outcome::Skipped).await;
                }
                MissedExecutionBehavior::DisableSchedule => {
                    warn!(schedule_id = %schedule.id, missed, "定时消息错过执行，按策略禁用");
                    schedule.enabled = false;
                    return self.persist_without_dispatch(schedule, Outcome::Disabled).await;
                }
                MissedExecutionBehavior::ExecuteLatestMissed => false,
                MissedExecutionBehavior::ExecuteAllMissed => true,
            }
        } else {
            false
        };

        let token = self
            .monitor
            .start_operation(&format!("scheduled:{}", schedule.message_name), self.dispatch_timeout);
        let started = Instant::now();

        let message = match self.materialize(&schedule) {
            Ok(message) => message,
            Err(reason) => {
                StructuredLogger::log_scheduled_message_skipped(
                    &schedule.id,
                    &schedule.message_name,
                    &reason,
                );
                self.monitor.complete_operation(token, OperationOutcome::Failed);
                return Outcome::Skipped;
            }
        };

        let mut context = Self::build_context(&schedule);
        let dispatched = tokio::time::timeout(
            self.dispatch_timeout,
            self.dispatcher.dispatch(message.as_ref(), &mut context),
        )
        .await;

        match dispatched {
            Ok(Ok(result)) if result.is_success() => {
                self.monitor.complete_operation(token, OperationOutcome::Succeeded);
            }
            Ok(Ok(result)) => {
                warn!(
                    schedule_id = %schedule.id,
                    error = result.error_message().unwrap_or("未知错误"),
                    "定时消息处理失败，保留原执行时间"
                );
                self.monitor.complete_operation(token, OperationOutcome::Failed);
                return Outcome::Failed;
            }
            Ok(Err(e)) => {
                warn!(schedule_id = %schedule.id, error = %e, "定时消息分发出错，保留原执行时间");
                self.monitor.complete_operation(token, OperationOutcome::Failed);
                return Outcome::Failed;
            }
            Err(_) => {
                warn!(
                    schedule_id = %schedule.id,
                    timeout_ms = self.dispatch_timeout.as_millis() as u64,
                    "定时消息分发超时"
                );
                self.monitor.complete_operation(token, OperationOutcome::TimedOut);
                return Outcome::Failed;
            }
        }

        let now = Utc::now();
        schedule.last_execution_utc = Some(now);
        Self::reschedule(&mut schedule, now, catch_up);
        let next = schedule.enabled.then_some(schedule.next_execution_utc);

        if let Err(e) = self.store.store(schedule.clone()).await {
            error!(schedule_id = %schedule.id, error = %e, "保存定时消息状态失败");
            return Outcome::Failed;
        }

        StructuredLogger::log_scheduled_message_dispatched(
            &schedule.id,
            &schedule.message_name,
            next,
            started.elapsed(),
        );
        Outcome::Dispatched
    }

    /// 升级并反序列化载荷；失败时返回跳过原因
    fn materialize(&self, schedule: &ScheduledMessage) -> Result<Box<dyn DispatchMessage>, String> {
        let body = self.upcast_body(schedule).map_err(|e| e.to_string())?;

        match self.serializer.deserialize(&body, &schedule.message_name) {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(format!("无法解析消息类型 {}", schedule.message_name)),
            Err(e) => Err(e.to_string()),
        }
    }

    fn upcast_body(&self, schedule: &ScheduledMessage) -> DispatchResult<String> {
        let Some(pipeline) = self
            .upcasting
            .as_ref()
            .filter(|p| p.is_auto_upcast_on_replay_enabled())
        else {
            return Ok(schedule.message_body.clone());
        };
        if schedule.message_version == 0 {
            return Ok(schedule.message_body.clone());
        }

        let payload: serde_json::Value = serde_json::from_str(&schedule.message_body)?;
        let (version, upgraded) =
            pipeline.upcast_value(&schedule.message_name, schedule.message_version, payload)?;
        if version != schedule.message_version {
            debug!(
                schedule_id = %schedule.id,
                from_version = schedule.message_version,
                to_version = version,
                "定时消息载荷已升级"
            );
        }
        Ok(upgraded.to_string())
    }

    fn build_context(schedule: &ScheduledMessage) -> MessageContext {
        MessageContext::builder()
            .maybe_correlation_id(schedule.correlation_id.clone())
            .maybe_trace_parent(schedule.trace_parent.clone())
            .maybe_tenant_id(schedule.tenant_id.clone())
            .maybe_user_id(schedule.user_id.clone())
            .message_type(schedule.message_name.clone())
            .source(SCHEDULER_SOURCE)
            .external_id(schedule.id.clone())
            .build()
    }

    async fn persist_without_dispatch(&self, schedule: ScheduledMessage, outcome: Outcome) -> Outcome {
        match self.store.store(schedule).await {
            Ok(()) => outcome,
            Err(e) => {
                error!(error = %e, "保存定时消息状态失败");
                Outcome::Failed
            }
        }
    }

    /// 当前执行时间之后、`now` 之前（含）错过的执行次数；一次性消息不存在错过
    fn missed_occurrences(schedule: &ScheduledMessage, now: DateTime<Utc>) -> usize {
        let scheduled = schedule.next_execution_utc;
        if scheduled >= now {
            return 0;
        }

        if let Some(interval) = schedule.interval {
            let step_ms = chrono::Duration::from_std(interval)
                .map(|step| step.num_milliseconds())
                .unwrap_or(0);
            if step_ms <= 0 {
                return 0;
            }
            return ((now - scheduled).num_milliseconds() / step_ms) as usize;
        }

        if let Some(expression) = schedule.cron_expression.as_deref() {
            return CronScheduler::new(expression)
                .map(|scheduler| {
                    scheduler
                        .occurrences_between(
                            scheduled + chrono::Duration::seconds(1),
                            now,
                            MISSED_SCAN_LIMIT,
                        )
                        .len()
                })
                .unwrap_or(0);
        }

        0
    }

    /// 计算下一次执行时间
    ///
    /// `catch_up` 时只前进一个周期，错过的执行在后续轮询中逐个补发；
    /// 否则跳到 `now` 之后的第一个周期。一次性消息禁用。
    fn reschedule(schedule: &mut ScheduledMessage, now: DateTime<Utc>, catch_up: bool) {
        if let Some(interval) = schedule.interval {
            match chrono::Duration::from_std(interval) {
                Ok(step) if step > chrono::Duration::zero() => {
                    let current = schedule.next_execution_utc;
                    schedule.next_execution_utc = if catch_up {
                        current + step
                    } else {
                        first_interval_after(current, step, now)
                    };
                }
                Ok(_) => {
                    warn!(schedule_id = %schedule.id, "执行间隔为零，禁用定时消息");
                    schedule.enabled = false;
                }
                Err(e) => {
                    warn!(schedule_id = %schedule.id, error = %e, "执行间隔无效，禁用定时消息");
                    schedule.enabled = false;
                }
            }
            return;
        }

        if let Some(expression) = schedule.cron_expression.as_deref() {
            let from = if catch_up { schedule.next_execution_utc } else { now };
            let next = CronScheduler::new(expression)
                .map(|scheduler| scheduler.next_execution_time(from));
            match next {
                Ok(Some(next)) => schedule.next_execution_utc = next,
                Ok(None) => {
                    info!(schedule_id = %schedule.id, "CRON表达式没有后续执行时间，禁用定时消息");
                    schedule.enabled = false;
                }
                Err(e) => {
                    warn!(schedule_id = %schedule.id, error = %e, "CRON表达式无效，禁用定时消息");
                    schedule.enabled = false;
                }
            }
            return;
        }

        schedule.enabled = false;
    }

    /// 后台轮询循环，收到关闭信号后释放存储
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "定时消息服务启动"
        );
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.process_due_messages().await {
                        Ok(summary) if summary.due > 0 => debug!(?summary, "定时消息轮询完成"),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "定时消息轮询失败"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("定时消息服务收到关闭信号");
                    break;
                }
            }
        }

        if let Err(e) = self.store.dispose().await {
            warn!(error = %e, "释放定时消息存储失败");
        }
        info!("定时消息服务已停止");
    }
}

/// `from` 按整周期前进后第一个晚于 `now` 的时间点
fn first_interval_after(
    from: DateTime<Utc>,
    step: chrono::Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let step_ms = step.num_milliseconds().max(1);
    let elapsed_ms = (now - from).num_milliseconds().max(0);
    from + chrono::Duration::milliseconds(step_ms * (elapsed_ms / step_ms + 1))
}
