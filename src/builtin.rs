//! 宿主进程自带的消息类型，便于通过配置的定时消息和CRON作业做连通性检查

use async_trait::async_trait;
use dispatch_core::{HandlerRegistryBuilder, MessageHandler};
use dispatch_domain::{DispatchResult, MessageContext};
use dispatch_infrastructure::JsonMessageSerializer;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 写一条日志的通知消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostNotice {
    pub text: String,
    #[serde(default)]
    pub warn: bool,
}

pub struct HostNoticeHandler;

#[async_trait]
impl MessageHandler<HostNotice> for HostNoticeHandler {
    async fn handle(&self, message: &HostNotice, context: &MessageContext) -> DispatchResult<()> {
        if message.warn {
            warn!(
                event = "host_notice",
                message.id = %context.message_id,
                source = context.source.as_deref().unwrap_or(""),
                "{}",
                message.text
            );
        } else {
            info!(
                event = "host_notice",
                message.id = %context.message_id,
                source = context.source.as_deref().unwrap_or(""),
                "{}",
                message.text
            );
        }
        Ok(())
    }
}

pub fn register_handlers(builder: HandlerRegistryBuilder) -> HandlerRegistryBuilder {
    builder.register_handler::<HostNotice, _>(HostNoticeHandler)
}

pub fn register_messages(serializer: JsonMessageSerializer) -> JsonMessageSerializer {
    serializer.register::<HostNotice>()
}
