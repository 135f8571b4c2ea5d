use async_trait::async_trait;
use dispatch_domain::{MessageContext, SecurityEventSink, SecurityEventType, SecuritySeverity};
use dispatch_errors::DispatchResult;
use tracing::{error, info, warn};

/// 基于 `tracing` 的安全事件接收端，事件以 `event = "security_event"` 结构化输出
#[derive(Debug, Default, Clone)]
pub struct TracingSecurityEventSink;

impl TracingSecurityEventSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecurityEventSink for TracingSecurityEventSink {
    async fn log_security_event(
        &self,
        event_type: SecurityEventType,
        description: &str,
        severity: SecuritySeverity,
        context: Option<&MessageContext>,
    ) -> DispatchResult<()> {
        let message_id = context.map(|c| c.message_id.as_str()).unwrap_or("");
        let correlation_id = context.map(|c| c.correlation_id.as_str()).unwrap_or("");
        let tenant_id = context.and_then(|c| c.tenant_id.as_deref()).unwrap_or("");

        match severity {
            SecuritySeverity::Critical | SecuritySeverity::High => error!(
                event = "security_event",
                security.type = %event_type,
                security.severity = %severity,
                message.id = message_id,
                correlation.id = correlation_id,
                tenant.id = tenant_id,
                "{description}"
            ),
            SecuritySeverity::Medium => warn!(
                event = "security_event",
                security.type = %event_type,
                security.severity = %severity,
                message.id = message_id,
                correlation.id = correlation_id,
                tenant.id = tenant_id,
                "{description}"
            ),
            SecuritySeverity::Low => info!(
                event = "security_event",
                security.type = %event_type,
                security.severity = %severity,
                message.id = message_id,
                correlation.id = correlation_id,
                tenant.id = tenant_id,
                "{description}"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logs_without_context() {
        let sink = TracingSecurityEventSink::new();
        sink.log_security_event(
            SecurityEventType::InjectionAttempt,
            "Potential SQL injection detected",
            SecuritySeverity::High,
            None,
        )
        .await
        .unwrap();
    }
}
