use crate::{MessageContext, SecurityEventType, SecuritySeverity};
use async_trait::async_trait;
use dispatch_errors::DispatchResult;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// 被监控操作的结束方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperationOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

/// 进行中的被监控操作
#[derive(Debug, Clone)]
pub struct OperationToken {
    pub id: Uuid,
    pub operation_name: String,
    pub timeout: Duration,
    pub started_at: Instant,
}

impl OperationToken {
    pub fn new<S: Into<String>>(operation_name: S, timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_name: operation_name.into(),
            timeout,
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// 计时操作监控
pub trait OperationMonitor: Send + Sync {
    fn start_operation(&self, operation_name: &str, timeout: Duration) -> OperationToken;
    fn complete_operation(&self, token: OperationToken, outcome: OperationOutcome);
}

/// 安全事件接收端
#[async_trait]
pub trait SecurityEventSink: Send + Sync {
    async fn log_security_event(
        &self,
        event_type: SecurityEventType,
        description: &str,
        severity: SecuritySeverity,
        context: Option<&MessageContext>,
    ) -> DispatchResult<()>;
}
