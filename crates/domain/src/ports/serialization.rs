use crate::DispatchMessage;
use dispatch_errors::DispatchResult;

/// 按类型名称的消息序列化器
pub trait MessageSerializer: Send + Sync {
    fn serialize(&self, message: &dyn DispatchMessage) -> DispatchResult<String>;

    /// `Ok(None)` 表示类型名称无法解析，与载荷格式错误（`Err`）区分
    fn deserialize(
        &self,
        payload: &str,
        type_name: &str,
    ) -> DispatchResult<Option<Box<dyn DispatchMessage>>>;
}
