use dispatch_errors::{DispatchError, DispatchResult};
use serde::Serialize;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// 可分发的消息
///
/// 所有满足 `Serialize + Send + Sync + Debug + 'static` 的类型自动实现该trait，
/// 处理器查找基于消息的运行时类型（`TypeId`）。
pub trait DispatchMessage: Any + Send + Sync + fmt::Debug {
    /// 消息类型名称
    fn message_type(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    /// 序列化为JSON值，供校验器和序列化器使用
    fn to_value(&self) -> DispatchResult<serde_json::Value>;
}

impl<T> DispatchMessage for T
where
    T: Serialize + Any + Send + Sync + fmt::Debug,
{
    fn message_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_value(&self) -> DispatchResult<serde_json::Value> {
        serde_json::to_value(self).map_err(DispatchError::from)
    }
}

impl dyn DispatchMessage {
    /// 消息的运行时类型ID
    pub fn runtime_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// 去掉模块路径的类型短名称
pub fn short_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    match base.rfind("::") {
        Some(pos) => &type_name[pos + 2..],
        None => type_name,
    }
}

/// 分发结果
#[derive(Clone)]
pub struct MessageResult {
    succeeded: bool,
    response: Option<Arc<dyn Any + Send + Sync>>,
    error_message: Option<String>,
}

impl MessageResult {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            response: None,
            error_message: None,
        }
    }

    pub fn success_with<T: Any + Send + Sync>(response: T) -> Self {
        Self {
            succeeded: true,
            response: Some(Arc::new(response)),
            error_message: None,
        }
    }

    pub fn failure<S: Into<String>>(error_message: S) -> Self {
        Self {
            succeeded: false,
            response: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.succeeded
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// 按类型取出处理器返回值
    pub fn response_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.response.as_ref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for MessageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageResult")
            .field("succeeded", &self.succeeded)
            .field("has_response", &self.response.is_some())
            .field("error_message", &self.error_message)
            .finish()
    }
}
