//! Periodic instance heartbeat.

use crate::coordinator::DistributedJobCoordinator;
use dispatch_domain::JobInstanceInfo;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// 实例心跳任务
///
/// 启动时注册实例，之后按间隔刷新心跳；收到关闭信号后注销实例。
pub struct InstanceHeartbeat {
    coordinator: Arc<DistributedJobCoordinator>,
    instance: JobInstanceInfo,
    interval: Duration,
    active_jobs: Arc<AtomicU32>,
}

impl InstanceHeartbeat {
    pub fn new(
        coordinator: Arc<DistributedJobCoordinator>,
        instance: JobInstanceInfo,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            instance,
            interval,
            active_jobs: Arc::new(AtomicU32::new(0)),
        }
    }

    /// 当前活跃作业数的共享计数器，随下一次心跳上报
    pub fn active_jobs(&self) -> Arc<AtomicU32> {
        self.active_jobs.clone()
    }

    pub fn instance_id(&self) -> &str {
        &self.instance.instance_id
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        if let Err(e) = self.coordinator.register_instance(&self.instance).await {
            error!(instance_id = %self.instance.instance_id, error = %e, "实例注册失败");
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let active = self.active_jobs.load(Ordering::Relaxed);
                    match self.coordinator.heartbeat(&mut self.instance, active).await {
                        Ok(()) => debug!(instance_id = %self.instance.instance_id, active, "心跳已发送"),
                        Err(e) => warn!(instance_id = %self.instance.instance_id, error = %e, "发送心跳失败"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(instance_id = %self.instance.instance_id, "心跳任务收到关闭信号");
                    break;
                }
            }
        }

        if let Err(e) = self
            .coordinator
            .unregister_instance(&self.instance.instance_id)
            .await
        {
            warn!(instance_id = %self.instance.instance_id, error = %e, "实例注销失败");
        }
    }
}
