use crate::*;

#[test]
fn test_dispatch_error_display() {
    let validation = DispatchError::validation(["Message ID is required", "Correlation ID is required"]);
    assert_eq!(
        validation.to_string(),
        "消息验证失败: Message ID is required; Correlation ID is required"
    );

    let not_found = DispatchError::handler_not_found("OrderPlaced");
    assert_eq!(not_found.to_string(), "未找到消息处理器: OrderPlaced");

    let failed = DispatchError::handler_failed("OrderPlaced", "boom");
    assert_eq!(failed.to_string(), "消息处理失败: OrderPlaced - boom");

    let cron = DispatchError::InvalidCron {
        expr: "bad".to_string(),
        message: "parse error".to_string(),
    };
    assert_eq!(cron.to_string(), "无效的CRON表达式: bad - parse error");

    assert_eq!(DispatchError::LeadershipLost.to_string(), "失去领导权");
    assert_eq!(
        DispatchError::job_not_found("job-1").to_string(),
        "作业未找到: job-1"
    );
    assert_eq!(
        DispatchError::Upcast {
            message_type: "OrderPlaced".to_string(),
            from_version: 2,
            message: "missing field".to_string(),
        }
        .to_string(),
        "消息升级失败: OrderPlaced v2 - missing field"
    );
}

#[test]
fn test_validation_errors_accessor() {
    let error = DispatchError::validation(vec!["a".to_string(), "b".to_string()]);
    assert_eq!(error.validation_errors(), &["a".to_string(), "b".to_string()]);
    assert!(DispatchError::Internal("x".into()).validation_errors().is_empty());
}

#[test]
fn test_ensure_not_empty() {
    assert!(DispatchError::ensure_not_empty("job-1", "job_key").is_ok());
    let err = DispatchError::ensure_not_empty("  ", "job_key").unwrap_err();
    assert!(matches!(err, DispatchError::InvalidArgument(_)));
    assert!(err.to_string().contains("job_key"));
}

#[test]
fn test_is_retryable() {
    assert!(DispatchError::coordination("redis down").is_retryable());
    assert!(DispatchError::Network("reset".into()).is_retryable());
    assert!(DispatchError::timeout_error("slow").is_retryable());
    assert!(DispatchError::handler_failed("T", "x").is_retryable());

    assert!(!DispatchError::validation(["bad"]).is_retryable());
    assert!(!DispatchError::handler_not_found("T").is_retryable());
    assert!(!DispatchError::invalid_argument("x").is_retryable());
    assert!(!DispatchError::CircuitOpen("db".into()).is_retryable());
}

#[test]
fn test_is_fatal() {
    assert!(DispatchError::Internal("x".into()).is_fatal());
    assert!(DispatchError::config_error("x").is_fatal());
    assert!(!DispatchError::timeout_error("x").is_fatal());
}

#[test]
fn test_user_message() {
    assert_eq!(
        DispatchError::validation(["x"]).user_message(),
        "消息内容验证失败"
    );
    assert_eq!(
        DispatchError::CircuitOpen("db".into()).user_message(),
        "服务暂时不可用，请稍后重试"
    );
    assert_eq!(
        DispatchError::Internal("x".into()).user_message(),
        "系统繁忙，请稍后重试"
    );
}

#[test]
fn test_from_serde_json_error() {
    let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let converted: DispatchError = err.into();
    assert!(matches!(converted, DispatchError::Serialization(_)));
}

#[tokio::test]
async fn test_from_join_error_cancelled() {
    let handle = tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    });
    handle.abort();
    let join_err = handle.await.unwrap_err();
    let converted: DispatchError = join_err.into();
    assert!(converted.is_cancelled());
}

#[test]
fn test_from_cron_error() {
    let err = "not a cron".parse::<cron::Schedule>().unwrap_err();
    let converted: DispatchError = err.into();
    assert!(matches!(converted, DispatchError::InvalidCron { .. }));
}
