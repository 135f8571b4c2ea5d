use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 优雅关闭管理器
///
/// 所有后台循环订阅同一个广播通道；`shutdown` 只会生效一次，之后的订阅者立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    sender: Arc<Mutex<Option<broadcast::Sender<()>>>>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);

        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 订阅关闭信号
    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        if let Some(sender) = self.lock_sender().as_ref() {
            return sender.subscribe();
        }

        // 已关闭：返回一个立即触发的接收器
        let (sender, receiver) = broadcast::channel(1);
        let _ = sender.send(());
        receiver
    }

    /// 触发关闭，重复调用无副作用
    pub async fn shutdown(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            debug!("关闭信号此前已发送");
            return;
        }

        info!("触发系统关闭");
        if let Some(sender) = self.lock_sender().take() {
            debug!(subscribers = sender.receiver_count(), "广播关闭信号");
            let _ = sender.send(());
        }
    }

    pub async fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    fn lock_sender(&self) -> std::sync::MutexGuard<'_, Option<broadcast::Sender<()>>> {
        self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 触发关闭并等待 `drain` 完成；超过 `grace` 时放弃等待并返回 `false`
    pub async fn shutdown_and_drain<F>(&self, drain: F, grace: Duration) -> bool
    where
        F: Future<Output = ()> + Send,
    {
        self.shutdown().await;

        info!("等待后台任务退出（超时: {}秒）", grace.as_secs());
        match timeout(grace, drain).await {
            Ok(()) => {
                info!("后台任务已全部退出");
                true
            }
            Err(_) => {
                warn!("等待后台任务退出超时（{}秒），强制结束", grace.as_secs());
                false
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_manager_basic() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe().await;

        assert!(!manager.is_shutdown().await);
        manager.shutdown().await;

        assert!(manager.is_shutdown().await);
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let manager = ShutdownManager::new();
        let mut rx1 = manager.subscribe().await;
        let mut rx2 = manager.clone().subscribe().await;

        manager.shutdown().await;

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown() {
        let manager = ShutdownManager::new();
        manager.shutdown().await;

        let mut rx = manager.subscribe().await;
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_double_shutdown() {
        let manager = ShutdownManager::new();
        manager.shutdown().await;
        manager.shutdown().await;
        assert!(manager.is_shutdown().await);
    }

    #[tokio::test]
    async fn test_shutdown_and_drain_completes() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe().await;
        let worker = tokio::spawn(async move {
            let _ = rx.recv().await;
        });

        let drained = manager
            .shutdown_and_drain(
                async move {
                    let _ = worker.await;
                },
                Duration::from_secs(5),
            )
            .await;
        assert!(drained);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_and_drain_times_out() {
        let manager = ShutdownManager::new();
        let drained = manager
            .shutdown_and_drain(std::future::pending::<()>(), Duration::from_secs(30))
            .await;
        assert!(!drained);
        assert!(manager.is_shutdown().await);
    }
}
