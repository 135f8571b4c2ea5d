//! Async test helpers

use std::time::Duration;
use tokio::time::sleep;

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Polls `condition` every 20ms until it holds or `timeout` elapses
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;

        while tokio::time::Instant::now() < deadline {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        condition().await
    }

    /// 初始化测试日志，可在每个测试中重复调用
    pub fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init();
    }

    pub fn unique_name(prefix: &str) -> String {
        let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
        format!("{prefix}-{timestamp}")
    }
}
