use crate::coordinator::DistributedJobCoordinator;
use crate::lease::LeadershipToken;
use dispatch_infrastructure::StructuredLogger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// 领导者选举
///
/// 未持有领导权时按续期间隔尝试获取；持有时续期租约，续期失败即视为失去领导权。
/// 领导状态通过 `watch` 通道发布。
pub struct LeaderElectionService {
    coordinator: Arc<DistributedJobCoordinator>,
    leader_key: String,
    lease: Duration,
    renew_interval: Duration,
    state_tx: watch::Sender<bool>,
}

impl LeaderElectionService {
    pub fn new<S: Into<String>>(
        coordinator: Arc<DistributedJobCoordinator>,
        leader_key: S,
        lease: Duration,
        renew_interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(false);
        Self {
            coordinator,
            leader_key: leader_key.into(),
            lease,
            renew_interval,
            state_tx,
        }
    }

    pub fn is_leader(&self) -> bool {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state_tx.subscribe()
    }

    fn publish(&self, is_leader: bool) {
        self.state_tx.send_if_modified(|current| {
            if *current != is_leader {
                *current = is_leader;
                true
            } else {
                false
            }
        });
    }

    /// 单轮选举，返回本轮结束后是否为领导者
    pub async fn run_once(&self, token: &mut Option<LeadershipToken>) -> bool {
        match token {
            Some(held) => {
                if held.extend(self.lease).await {
                    debug!(leader_key = %self.leader_key, "领导权已续期");
                } else {
                    StructuredLogger::log_leadership_changed(
                        &self.leader_key,
                        self.coordinator.instance_id(),
                        false,
                    );
                    *token = None;
                }
            }
            None => match self
                .coordinator
                .try_acquire_leadership(&self.leader_key, self.lease)
                .await
            {
                Ok(acquired) => *token = acquired,
                Err(e) => warn!(leader_key = %self.leader_key, error = %e, "领导权获取参数无效"),
            },
        }

        let is_leader = token.as_ref().is_some_and(|t| t.is_valid());
        self.publish(is_leader);
        is_leader
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut token: Option<LeadershipToken> = None;
        let mut ticker = tokio::time::interval(self.renew_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once(&mut token).await;
                }
                _ = shutdown_rx.recv() => {
                    info!(leader_key = %self.leader_key, "领导者选举收到关闭信号");
                    break;
                }
            }
        }

        if let Some(held) = token.take() {
            held.dispose().await;
        }
        self.publish(false);
    }
}
