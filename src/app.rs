use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dispatch_config::AppConfig;
use dispatch_coordination::{DistributedJobCoordinator, InstanceHeartbeat, LeaderElectionService};
use dispatch_core::{
    retry_policy_from_config, CircuitBreaker, CircuitBreakerMiddleware, DispatchPipeline,
    HandlerRegistryBuilder, InputValidationMiddleware, MessageDispatcher, RetryMiddleware,
    UpcastingPipelineBuilder,
};
use dispatch_domain::{
    CoordinationBackend, CronJobStore, Dispatcher, JobInstanceCapabilities, JobInstanceInfo,
    MessageSerializer, OperationMonitor, ScheduleStore,
};
use dispatch_infrastructure::{
    create_coordination_backend, InMemoryCronJobStore, InMemoryScheduleStore,
    JsonMessageSerializer, StructuredLogger, TimeoutOperationMonitor, TracingSecurityEventSink,
};
use dispatch_saga::SagaOrchestrator;
use dispatch_scheduler::{CronJobService, ScheduledMessageService};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// 应用组装器
///
/// 调用方注册处理器、可反序列化的消息类型和升级器，其余组件按配置装配。
pub struct ApplicationBuilder {
    config: AppConfig,
    handlers: HandlerRegistryBuilder,
    serializer: JsonMessageSerializer,
    upcasting: UpcastingPipelineBuilder,
    backend: Option<Arc<dyn CoordinationBackend>>,
}

impl ApplicationBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            handlers: HandlerRegistryBuilder::new(),
            serializer: JsonMessageSerializer::new(),
            upcasting: UpcastingPipelineBuilder::new(),
            backend: None,
        }
    }

    pub fn with_handlers(
        mut self,
        configure: impl FnOnce(HandlerRegistryBuilder) -> HandlerRegistryBuilder,
    ) -> Self {
        self.handlers = configure(self.handlers);
        self
    }

    pub fn with_serializer(mut self, serializer: JsonMessageSerializer) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_upcasters(
        mut self,
        configure: impl FnOnce(UpcastingPipelineBuilder) -> UpcastingPipelineBuilder,
    ) -> Self {
        self.upcasting = configure(self.upcasting);
        self
    }

    /// 使用外部提供的协调后端，不再按配置创建
    pub fn with_coordination_backend(mut self, backend: Arc<dyn CoordinationBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub async fn build(self) -> Result<Application> {
        let config = self.config;
        info!("初始化应用程序");

        let backend = match self.backend {
            Some(backend) => backend,
            None => create_coordination_backend(&config.coordination)
                .await
                .context("创建协调后端失败")?,
        };

        let pipeline = Arc::new(build_pipeline(&config));
        let registry = Arc::new(self.handlers.build());
        info!(
            middlewares = pipeline.len(),
            handlers = registry.len(),
            "消息管道已就绪"
        );
        let dispatcher = Arc::new(MessageDispatcher::new(registry, pipeline));

        let upcasting = Arc::new(
            self.upcasting
                .enable_auto_upcast_on_replay(config.pipeline.auto_upcast_on_replay)
                .build()
                .context("构建消息升级管道失败")?,
        );

        let serializer: Arc<dyn MessageSerializer> = Arc::new(self.serializer);
        let schedule_store = Arc::new(InMemoryScheduleStore::new());
        let cron_store = Arc::new(InMemoryCronJobStore::new());
        let monitor = Arc::new(TimeoutOperationMonitor::new());

        let instance = instance_info(&config);
        let coordinator = Arc::new(DistributedJobCoordinator::from_config(
            backend,
            &config.coordination,
            instance.instance_id.clone(),
        ));

        let scheduled_messages = Arc::new(
            ScheduledMessageService::new(
                schedule_store.clone() as Arc<dyn ScheduleStore>,
                serializer.clone(),
                dispatcher.clone() as Arc<dyn Dispatcher>,
                monitor.clone() as Arc<dyn OperationMonitor>,
                &config.scheduler,
            )
            .with_upcasting(upcasting),
        );

        let cron_jobs = Arc::new(
            CronJobService::new(
                cron_store.clone() as Arc<dyn CronJobStore>,
                serializer,
                dispatcher.clone() as Arc<dyn Dispatcher>,
                config.cron_jobs.clone(),
            )
            .with_coordinator(coordinator.clone()),
        );

        let leader_election = Arc::new(LeaderElectionService::new(
            coordinator.clone(),
            config.coordination.leader_key.clone(),
            Duration::from_secs(config.coordination.leader_lease_seconds),
            Duration::from_secs(config.coordination.leader_renew_interval_seconds),
        ));

        StructuredLogger::log_instance_registered(
            &instance.instance_id,
            &instance.host_name,
            instance.capabilities.max_concurrent_jobs,
        );

        Ok(Application {
            config,
            dispatcher,
            schedule_store,
            cron_store,
            monitor,
            scheduled_messages,
            cron_jobs,
            coordinator,
            leader_election,
            instance,
        })
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    dispatcher: Arc<MessageDispatcher>,
    schedule_store: Arc<InMemoryScheduleStore>,
    cron_store: Arc<InMemoryCronJobStore>,
    monitor: Arc<TimeoutOperationMonitor>,
    scheduled_messages: Arc<ScheduledMessageService>,
    cron_jobs: Arc<CronJobService>,
    coordinator: Arc<DistributedJobCoordinator>,
    leader_election: Arc<LeaderElectionService>,
    instance: JobInstanceInfo,
}

impl Application {
    pub fn builder(config: AppConfig) -> ApplicationBuilder {
        ApplicationBuilder::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> Arc<MessageDispatcher> {
        self.dispatcher.clone()
    }

    pub fn schedule_store(&self) -> Arc<InMemoryScheduleStore> {
        self.schedule_store.clone()
    }

    pub fn cron_store(&self) -> Arc<InMemoryCronJobStore> {
        self.cron_store.clone()
    }

    pub fn monitor(&self) -> Arc<TimeoutOperationMonitor> {
        self.monitor.clone()
    }

    pub fn scheduled_messages(&self) -> Arc<ScheduledMessageService> {
        self.scheduled_messages.clone()
    }

    pub fn cron_jobs(&self) -> Arc<CronJobService> {
        self.cron_jobs.clone()
    }

    pub fn coordinator(&self) -> Arc<DistributedJobCoordinator> {
        self.coordinator.clone()
    }

    pub fn leader_election(&self) -> Arc<LeaderElectionService> {
        self.leader_election.clone()
    }

    pub fn instance_id(&self) -> &str {
        &self.instance.instance_id
    }

    /// 按 `[saga]` 配置的默认重试和步骤超时创建编排器
    pub fn saga<D: Send + Sync + 'static>(&self, saga_type: &str) -> SagaOrchestrator<D> {
        SagaOrchestrator::from_config(saga_type, &self.config.saga)
    }

    /// 运行全部后台循环，收到关闭信号后等待它们退出
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(instance_id = %self.instance.instance_id, "启动应用程序");

        let mut handles: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        if self.config.scheduler.enabled {
            let service = self.scheduled_messages.clone();
            let rx = shutdown_rx.resubscribe();
            handles.push((
                "scheduled_messages",
                tokio::spawn(async move { service.run(rx).await }),
            ));
        }

        if self.config.cron_jobs.enabled {
            let service = self.cron_jobs.clone();
            let rx = shutdown_rx.resubscribe();
            handles.push(("cron_jobs", tokio::spawn(async move { service.run(rx).await })));
        }

        let heartbeat = InstanceHeartbeat::new(
            self.coordinator.clone(),
            self.instance.clone(),
            Duration::from_secs(self.config.coordination.heartbeat_interval_seconds),
        );
        let rx = shutdown_rx.resubscribe();
        handles.push(("heartbeat", tokio::spawn(heartbeat.run(rx))));

        let election = self.leader_election.clone();
        let rx = shutdown_rx.resubscribe();
        handles.push(("leader_election", tokio::spawn(election.run(rx))));

        let _ = shutdown_rx.recv().await;
        info!("应用程序收到关闭信号");

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!(component = name, error = %e, "后台任务异常退出");
            }
        }

        info!("所有组件已停止");
        Ok(())
    }
}

fn build_pipeline(config: &AppConfig) -> DispatchPipeline {
    let validation = InputValidationMiddleware::from_config(config.input_validation.clone())
        .with_security_sink(Arc::new(TracingSecurityEventSink::new()));

    let mut builder = DispatchPipeline::builder().use_middleware(validation);

    if config.pipeline.enable_retry {
        builder = builder.use_middleware(RetryMiddleware::new(retry_policy_from_config(
            &config.resilience.retry,
        )));
    }

    if config.pipeline.enable_circuit_breaker {
        builder = builder.use_middleware(CircuitBreakerMiddleware::new(CircuitBreaker::new(
            "dispatch",
            config.resilience.circuit_breaker.clone(),
        )));
    }

    builder.build()
}

/// 未配置实例ID时使用 `主机名-随机后缀`
fn instance_info(config: &AppConfig) -> JobInstanceInfo {
    let host_name = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown-host".to_string());

    let instance_id = config
        .coordination
        .instance_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| {
            let suffix = Uuid::new_v4().simple().to_string();
            format!("{}-{}", host_name, &suffix[..8])
        });

    let capabilities = JobInstanceCapabilities::new(
        config.coordination.max_concurrent_jobs,
        config.coordination.supported_job_types.clone(),
    )
    .with_priority(config.coordination.priority)
    .with_tags(config.coordination.tags.clone());

    JobInstanceInfo::new(instance_id, host_name, capabilities)
}
