use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("消息验证失败: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },
    #[error("无效的参数: {0}")]
    InvalidArgument(String),
    #[error("无效的操作: {0}")]
    InvalidOperation(String),
    #[error("未找到消息处理器: {message_type}")]
    HandlerNotFound { message_type: String },
    #[error("消息处理失败: {message_type} - {message}")]
    HandlerFailed {
        message_type: String,
        message: String,
    },
    #[error("消息升级失败: {message_type} v{from_version} - {message}")]
    Upcast {
        message_type: String,
        from_version: u32,
        message: String,
    },
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("作业未找到: {id}")]
    JobNotFound { id: String },
    #[error("熔断器已打开: {0}")]
    CircuitOpen(String),
    #[error("协调后端错误: {0}")]
    Coordination(String),
    #[error("失去领导权")]
    LeadershipLost,
    #[error("Saga执行错误: {0}")]
    Saga(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("操作已取消: {0}")]
    Cancelled(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    pub fn validation<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Validation {
            errors: errors.into_iter().map(Into::into).collect(),
        }
    }
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        Self::InvalidOperation(msg.into())
    }
    pub fn handler_not_found<S: Into<String>>(message_type: S) -> Self {
        Self::HandlerNotFound {
            message_type: message_type.into(),
        }
    }
    pub fn handler_failed<S: Into<String>, M: Into<String>>(message_type: S, message: M) -> Self {
        Self::HandlerFailed {
            message_type: message_type.into(),
            message: message.into(),
        }
    }
    pub fn job_not_found<S: Into<String>>(id: S) -> Self {
        Self::JobNotFound { id: id.into() }
    }
    pub fn coordination<S: Into<String>>(msg: S) -> Self {
        Self::Coordination(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn timeout_error<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// 确保字符串参数非空，否则返回 `InvalidArgument`
    pub fn ensure_not_empty(value: &str, name: &str) -> DispatchResult<()> {
        if value.trim().is_empty() {
            return Err(Self::InvalidArgument(format!("{name} 不能为空")));
        }
        Ok(())
    }

    /// 返回验证错误列表（非验证错误返回空切片）
    pub fn validation_errors(&self) -> &[String] {
        match self {
            DispatchError::Validation { errors } => errors,
            _ => &[],
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::Internal(_) | DispatchError::Configuration(_)
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Coordination(_)
                | DispatchError::Network(_)
                | DispatchError::Timeout(_)
                | DispatchError::HandlerFailed { .. }
        )
    }
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled(_))
    }
    pub fn user_message(&self) -> &str {
        match self {
            DispatchError::Validation { .. } => "消息内容验证失败",
            DispatchError::InvalidArgument(_) => "请求参数有误",
            DispatchError::HandlerNotFound { .. } => "没有可处理该消息的处理器",
            DispatchError::JobNotFound { .. } => "请求的作业不存在",
            DispatchError::CircuitOpen(_) => "服务暂时不可用，请稍后重试",
            DispatchError::Timeout(_) => "操作超时，请稍后重试",
            DispatchError::Cancelled(_) => "操作已被取消",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        DispatchError::Internal(err.to_string())
    }
}

impl From<redis::RedisError> for DispatchError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            DispatchError::Timeout(err.to_string())
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            DispatchError::Network(err.to_string())
        } else {
            DispatchError::Coordination(err.to_string())
        }
    }
}

impl From<cron::error::Error> for DispatchError {
    fn from(err: cron::error::Error) -> Self {
        DispatchError::InvalidCron {
            expr: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<tokio::time::error::Elapsed> for DispatchError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        DispatchError::Timeout(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DispatchError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            DispatchError::Cancelled(err.to_string())
        } else {
            DispatchError::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests;
