mod memory;
mod redis_backend;

pub use memory::MemoryCoordinationBackend;
pub use redis_backend::RedisCoordinationBackend;

use dispatch_config::{CoordinationBackendType, CoordinationConfig};
use dispatch_domain::CoordinationBackend;
use dispatch_errors::DispatchResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 根据配置创建协调后端
pub async fn create_coordination_backend(
    config: &CoordinationConfig,
) -> DispatchResult<Arc<dyn CoordinationBackend>> {
    match config.backend {
        CoordinationBackendType::Memory => {
            info!("使用内存协调后端");
            Ok(Arc::new(MemoryCoordinationBackend::new()))
        }
        CoordinationBackendType::Redis => {
            info!(url = %config.redis_url, "连接Redis协调后端");
            let backend = RedisCoordinationBackend::connect(
                &config.redis_url,
                Duration::from_secs(config.connection_timeout_seconds),
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}
