use super::validators::{
    CommandInjectionValidator, HtmlContentValidator, InputValidator, LdapInjectionValidator,
    MessageSizeValidator, NoSqlInjectionValidator, PathTraversalValidator, SqlInjectionValidator,
    StringHygieneValidator,
};
use crate::pipeline::{Middleware, MiddlewareStage, Next};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dispatch_config::InputValidationConfig;
use dispatch_domain::{
    DispatchMessage, MessageContext, MessageResult, SecurityEventSink, SecurityEventType,
    SecuritySeverity,
};
use dispatch_errors::{DispatchError, DispatchResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Allowed clock skew for messages stamped slightly in the future.
const MAX_CLOCK_SKEW_MINUTES: i64 = 5;

pub const VALIDATION_PASSED_ITEM: &str = "Validation:Passed";
pub const VALIDATION_TIMESTAMP_ITEM: &str = "Validation:Timestamp";

pub struct InputValidationMiddleware {
    config: InputValidationConfig,
    validators: Vec<Arc<dyn InputValidator>>,
    security_sink: Option<Arc<dyn SecurityEventSink>>,
}

impl InputValidationMiddleware {
    /// Middleware with no validators; only the envelope checks run.
    pub fn new(config: InputValidationConfig) -> Self {
        Self {
            config,
            validators: Vec::new(),
            security_sink: None,
        }
    }

    /// Middleware with the built-in validators enabled by `config`.
    pub fn from_config(config: InputValidationConfig) -> Self {
        let mut validators: Vec<Arc<dyn InputValidator>> = Vec::new();
        if config.block_sql_injection {
            validators.push(Arc::new(SqlInjectionValidator));
        }
        if config.block_nosql_injection {
            validators.push(Arc::new(NoSqlInjectionValidator));
        }
        if config.block_html_content {
            validators.push(Arc::new(HtmlContentValidator));
        }
        if config.block_path_traversal {
            validators.push(Arc::new(PathTraversalValidator));
        }
        if config.block_command_injection {
            validators.push(Arc::new(CommandInjectionValidator));
        }
        if config.block_ldap_injection {
            validators.push(Arc::new(LdapInjectionValidator));
        }
        validators.push(Arc::new(StringHygieneValidator {
            max_string_length: config.max_string_length,
            allow_null_bytes: config.allow_null_bytes,
            allow_control_characters: config.allow_control_characters,
        }));
        validators.push(Arc::new(MessageSizeValidator {
            max_message_size_bytes: config.max_message_size_bytes,
            max_object_depth: config.max_object_depth,
        }));

        Self {
            config,
            validators,
            security_sink: None,
        }
    }

    pub fn with_validator<V: InputValidator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn with_security_sink(mut self, sink: Arc<dyn SecurityEventSink>) -> Self {
        self.security_sink = Some(sink);
        self
    }

    pub fn validator_names(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Envelope checks, each failing on its own.
    fn check_envelope(&self, context: &MessageContext) -> Option<String> {
        if self.config.require_correlation_id && context.correlation_id.trim().is_empty() {
            return Some("Correlation ID is required".to_string());
        }
        if context.message_id.trim().is_empty() {
            return Some("Message ID is required".to_string());
        }
        if let Some(sent) = context.sent_timestamp_utc {
            let now = Utc::now();
            let oldest = now - Duration::days(i64::from(self.config.max_message_age_days));
            if sent < oldest {
                return Some(format!(
                    "Message is too old: sent at {}, maximum age is {} days",
                    sent.to_rfc3339(),
                    self.config.max_message_age_days
                ));
            }
            if sent > now + Duration::minutes(MAX_CLOCK_SKEW_MINUTES) {
                return Some(format!(
                    "Message timestamp is in the future: {}",
                    sent.to_rfc3339()
                ));
            }
        }
        None
    }

    async fn run_validators(
        &self,
        message: &dyn DispatchMessage,
        context: &MessageContext,
    ) -> Vec<String> {
        let mut errors = Vec::new();
        for validator in &self.validators {
            match validator.validate(message, context).await {
                Ok(result) => errors.extend(result.into_errors()),
                Err(e) if self.config.fail_on_validator_exception => {
                    errors.push(format!("Validator '{}' failed: {e}", validator.name()));
                }
                Err(e) => {
                    warn!(
                        validator = validator.name(),
                        error = %e,
                        "Validator raised an error, skipping"
                    );
                }
            }
        }
        errors
    }

    async fn reject(
        &self,
        context: &MessageContext,
        errors: Vec<String>,
        severity: SecuritySeverity,
    ) -> DispatchError {
        warn!(
            event = "validation_failed",
            message.id = %context.message_id,
            message.correlation_id = %context.correlation_id,
            error_count = errors.len(),
            "Message failed input validation"
        );

        if let Some(sink) = &self.security_sink {
            let description = errors.join("; ");
            if let Err(e) = sink
                .log_security_event(
                    SecurityEventType::ValidationFailure,
                    &description,
                    severity,
                    Some(context),
                )
                .await
            {
                warn!(error = %e, "Failed to record security event");
            }
        }

        DispatchError::validation(errors)
    }
}

#[async_trait]
impl Middleware for InputValidationMiddleware {
    fn name(&self) -> &str {
        "input-validation"
    }

    fn stage(&self) -> MiddlewareStage {
        MiddlewareStage::Validation
    }

    async fn invoke(
        &self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
        next: Next<'_>,
    ) -> DispatchResult<MessageResult> {
        if !self.config.enable_validation {
            return next.run(message, context).await;
        }

        if let Some(error) = self.check_envelope(context) {
            return Err(self
                .reject(context, vec![error], SecuritySeverity::Medium)
                .await);
        }

        let errors = self.run_validators(message, context).await;
        if !errors.is_empty() {
            return Err(self.reject(context, errors, SecuritySeverity::High).await);
        }

        context.set_item(VALIDATION_PASSED_ITEM, true);
        context.set_item(VALIDATION_TIMESTAMP_ITEM, Utc::now().to_rfc3339());
        debug!(message.id = %context.message_id, "Message passed input validation");

        next.run(message, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{DispatchPipeline, TerminalHandler};
    use crate::validation::InputValidationResult;
    use dispatch_testing_utils::RecordingSecurityEventSink;
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Serialize)]
    struct CreateOrder {
        customer: String,
        note: String,
    }

    fn order(note: &str) -> CreateOrder {
        CreateOrder {
            customer: "c-1".to_string(),
            note: note.to_string(),
        }
    }

    #[derive(Default)]
    struct CountingTerminal(AtomicUsize);

    #[async_trait]
    impl TerminalHandler for CountingTerminal {
        async fn handle(
            &self,
            _message: &dyn DispatchMessage,
            context: &mut MessageContext,
        ) -> DispatchResult<MessageResult> {
            self.0.fetch_add(1, Ordering::SeqCst);
            assert_eq!(
                context.get_item(VALIDATION_PASSED_ITEM),
                Some(&serde_json::Value::Bool(true))
            );
            Ok(MessageResult::success())
        }
    }

    struct FaultyValidator;

    #[async_trait]
    impl InputValidator for FaultyValidator {
        fn name(&self) -> &str {
            "faulty"
        }

        async fn validate(
            &self,
            _message: &dyn DispatchMessage,
            _context: &MessageContext,
        ) -> DispatchResult<InputValidationResult> {
            Err(DispatchError::Internal("validator crashed".to_string()))
        }
    }

    async fn run(
        middleware: InputValidationMiddleware,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
    ) -> (DispatchResult<MessageResult>, usize) {
        let pipeline = DispatchPipeline::builder().use_middleware(middleware).build();
        let terminal = CountingTerminal::default();
        let result = pipeline.execute(message, context, &terminal).await;
        (result, terminal.0.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_valid_message_passes_and_sets_items() {
        let middleware = InputValidationMiddleware::from_config(InputValidationConfig::default());
        let mut context = MessageContext::new();
        let (result, calls) = run(middleware, &order("leave at door"), &mut context).await;
        assert!(result.unwrap().is_success());
        assert_eq!(calls, 1);
        assert!(context.contains_item(VALIDATION_TIMESTAMP_ITEM));
    }

    #[tokio::test]
    async fn test_missing_correlation_id() {
        let middleware = InputValidationMiddleware::new(InputValidationConfig::default());
        let mut context = MessageContext::new();
        context.correlation_id = String::new();

        let (result, calls) = run(middleware, &order("x"), &mut context).await;
        let err = result.unwrap_err();
        assert_eq!(err.validation_errors(), &["Correlation ID is required".to_string()]);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_correlation_id_optional_when_not_required() {
        let config = InputValidationConfig {
            require_correlation_id: false,
            ..Default::default()
        };
        let mut context = MessageContext::new();
        context.correlation_id = String::new();
        let (result, _) = run(InputValidationMiddleware::new(config), &order("x"), &mut context).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_message_id() {
        let middleware = InputValidationMiddleware::new(InputValidationConfig::default());
        let mut context = MessageContext::new();
        context.message_id = " ".to_string();
        let (result, _) = run(middleware, &order("x"), &mut context).await;
        assert_eq!(
            result.unwrap_err().validation_errors(),
            &["Message ID is required".to_string()]
        );
    }

    #[tokio::test]
    async fn test_timestamp_window_boundaries() {
        let config = InputValidationConfig::default();
        let max_age = i64::from(config.max_message_age_days);

        let mut now_ctx = MessageContext::builder().sent_at(Utc::now()).build();
        let (result, _) = run(InputValidationMiddleware::new(config.clone()), &order("x"), &mut now_ctx).await;
        assert!(result.is_ok());

        let mut old_ctx = MessageContext::builder()
            .sent_at(Utc::now() - Duration::days(max_age + 1))
            .build();
        let (result, _) = run(InputValidationMiddleware::new(config.clone()), &order("x"), &mut old_ctx).await;
        assert!(result.unwrap_err().validation_errors()[0].contains("too old"));

        let mut future_ctx = MessageContext::builder()
            .sent_at(Utc::now() + Duration::minutes(10))
            .build();
        let (result, _) = run(InputValidationMiddleware::new(config), &order("x"), &mut future_ctx).await;
        assert!(result.unwrap_err().validation_errors()[0].contains("in the future"));
    }

    #[tokio::test]
    async fn test_validator_errors_are_aggregated() {
        let middleware = InputValidationMiddleware::from_config(InputValidationConfig::default());
        let mut context = MessageContext::new();
        let (result, calls) = run(
            middleware,
            &order("<script>x</script>; rm -rf / ../../etc/passwd"),
            &mut context,
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.validation_errors().len() >= 3);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_validator_exception_policy() {
        let strict = InputValidationMiddleware::new(InputValidationConfig::default())
            .with_validator(FaultyValidator);
        let mut context = MessageContext::new();
        let (result, _) = run(strict, &order("x"), &mut context).await;
        assert!(result.unwrap_err().validation_errors()[0].contains("faulty"));

        let lenient = InputValidationMiddleware::new(InputValidationConfig {
            fail_on_validator_exception: false,
            ..Default::default()
        })
        .with_validator(FaultyValidator);
        let mut context = MessageContext::new();
        let (result, calls) = run(lenient, &order("x"), &mut context).await;
        assert!(result.is_ok());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_disabled_validation_skips_checks() {
        let middleware = InputValidationMiddleware::from_config(InputValidationConfig {
            enable_validation: false,
            ..Default::default()
        })
        .with_validator(FaultyValidator);
        let mut context = MessageContext::new();
        context.correlation_id = String::new();

        let pipeline = DispatchPipeline::builder().use_middleware(middleware).build();
        struct Plain;
        #[async_trait]
        impl TerminalHandler for Plain {
            async fn handle(
                &self,
                _message: &dyn DispatchMessage,
                context: &mut MessageContext,
            ) -> DispatchResult<MessageResult> {
                assert!(!context.contains_item(VALIDATION_PASSED_ITEM));
                Ok(MessageResult::success())
            }
        }
        let result = pipeline.execute(&order("<script>"), &mut context, &Plain).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_security_event_logged_and_sink_failure_ignored() {
        let sink = Arc::new(RecordingSecurityEventSink::new());
        let middleware = InputValidationMiddleware::from_config(InputValidationConfig::default())
            .with_security_sink(sink.clone());
        let mut context = MessageContext::new();
        let (result, _) = run(middleware, &order("' OR '1'='1"), &mut context).await;
        assert!(matches!(result, Err(DispatchError::Validation { .. })));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SecurityEventType::ValidationFailure);
        assert_eq!(events[0].severity, SecuritySeverity::High);

        let failing = Arc::new(RecordingSecurityEventSink::failing());
        let middleware = InputValidationMiddleware::new(InputValidationConfig::default())
            .with_security_sink(failing);
        let mut context = MessageContext::new();
        context.correlation_id = String::new();
        let (result, _) = run(middleware, &order("x"), &mut context).await;
        assert!(matches!(result, Err(DispatchError::Validation { .. })));
    }
}
