use crate::{DispatchMessage, MessageContext, MessageResult};
use async_trait::async_trait;
use dispatch_errors::{DispatchError, DispatchResult};

/// 消息分发入口
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// 将消息送入中间件管道。处理器失败体现为失败的 `MessageResult`，
    /// 验证失败与未注册处理器以错误返回。
    async fn dispatch(
        &self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
    ) -> DispatchResult<MessageResult>;

    /// 作业/工作流边界使用：处理器失败也以错误返回
    async fn dispatch_strict(
        &self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
    ) -> DispatchResult<MessageResult> {
        let result = self.dispatch(message, context).await?;
        if result.is_success() {
            Ok(result)
        } else {
            Err(DispatchError::handler_failed(
                message.message_type(),
                result.error_message().unwrap_or("未知错误"),
            ))
        }
    }
}
