use super::CircuitBreaker;
use crate::pipeline::{Middleware, MiddlewareStage, Next};
use async_trait::async_trait;
use dispatch_domain::{DispatchMessage, MessageContext, MessageResult, RetryPolicy};
use dispatch_errors::{DispatchError, DispatchResult};
use serde_json::json;
use tracing::{debug, warn};

pub const RETRY_ATTEMPT_ITEM: &str = "Retry:Attempt";

/// Re-runs the rest of the chain on retryable errors and failed results.
pub struct RetryMiddleware {
    policy: RetryPolicy,
}

impl RetryMiddleware {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn should_retry_outcome(outcome: &DispatchResult<MessageResult>) -> bool {
        match outcome {
            Ok(result) => !result.is_success(),
            Err(error) => error.is_retryable(),
        }
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    fn stage(&self) -> MiddlewareStage {
        MiddlewareStage::Resilience
    }

    async fn invoke(
        &self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
        next: Next<'_>,
    ) -> DispatchResult<MessageResult> {
        let mut attempt: u32 = 1;
        loop {
            context.set_item(RETRY_ATTEMPT_ITEM, json!(attempt));
            let outcome = next.run(message, context).await;

            if !Self::should_retry_outcome(&outcome) {
                if attempt > 1 {
                    debug!(
                        message_type = message.message_type(),
                        attempt,
                        "Message completed after retry"
                    );
                }
                return outcome;
            }
            if !self.policy.should_retry(attempt) {
                warn!(
                    message_type = message.message_type(),
                    attempts = attempt,
                    "Retry attempts exhausted"
                );
                return outcome;
            }

            let delay = self.policy.get_delay(attempt);
            warn!(
                message_type = message.message_type(),
                message_id = %context.message_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Dispatch attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Guards the rest of the chain with a shared [`CircuitBreaker`].
///
/// Failed results and retryable errors count as failures; validation and
/// other caller errors do not trip the breaker.
pub struct CircuitBreakerMiddleware {
    breaker: CircuitBreaker,
}

impl CircuitBreakerMiddleware {
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self { breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl Middleware for CircuitBreakerMiddleware {
    fn name(&self) -> &str {
        "circuit-breaker"
    }

    fn stage(&self) -> MiddlewareStage {
        MiddlewareStage::Resilience
    }

    async fn invoke(
        &self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
        next: Next<'_>,
    ) -> DispatchResult<MessageResult> {
        if let Err(error) = self.breaker.try_acquire().await {
            warn!(
                message_type = message.message_type(),
                breaker = self.breaker.name(),
                "Circuit open, message rejected"
            );
            return Err(error);
        }

        let call_timeout = self.breaker.config().call_timeout;
        match tokio::time::timeout(call_timeout, next.run(message, context)).await {
            Ok(Ok(result)) => {
                if result.is_success() {
                    self.breaker.record_success().await;
                } else {
                    self.breaker.record_failure().await;
                }
                Ok(result)
            }
            Ok(Err(error)) => {
                if error.is_retryable() {
                    self.breaker.record_failure().await;
                }
                Err(error)
            }
            Err(_) => {
                self.breaker.record_failure().await;
                Err(DispatchError::timeout_error(format!(
                    "{} exceeded {:?}",
                    message.message_type(),
                    call_timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{DispatchPipeline, TerminalHandler};
    use crate::resilience::CircuitState;
    use dispatch_config::CircuitBreakerConfig;
    use serde::Serialize;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, Serialize)]
    struct ChargeCard;

    /// Fails the first `failures` calls.
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        as_error: bool,
    }

    impl Flaky {
        fn new(failures: u32, as_error: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                as_error,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TerminalHandler for Flaky {
        async fn handle(
            &self,
            _message: &dyn DispatchMessage,
            _context: &mut MessageContext,
        ) -> DispatchResult<MessageResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call > self.failures {
                Ok(MessageResult::success())
            } else if self.as_error {
                Err(DispatchError::Network("connection reset".into()))
            } else {
                Ok(MessageResult::failure("gateway declined"))
            }
        }
    }

    struct Rejecting;

    #[async_trait]
    impl TerminalHandler for Rejecting {
        async fn handle(
            &self,
            _message: &dyn DispatchMessage,
            _context: &mut MessageContext,
        ) -> DispatchResult<MessageResult> {
            Err(DispatchError::invalid_argument("amount must be positive"))
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed_delay(max_attempts, Duration::from_millis(10)).with_jitter(false)
    }

    fn breaker(threshold: usize) -> CircuitBreaker {
        CircuitBreaker::new(
            "payments",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(60),
                ..CircuitBreakerConfig::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let pipeline = DispatchPipeline::builder()
            .use_middleware(RetryMiddleware::new(fast_policy(3)))
            .build();
        let handler = Flaky::new(2, true);
        let mut context = MessageContext::new();

        let result = pipeline
            .execute(&ChargeCard, &mut context, &handler)
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(handler.calls(), 3);
        assert_eq!(context.get_item(RETRY_ATTEMPT_ITEM), Some(&json!(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_returns_last_failed_result() {
        let pipeline = DispatchPipeline::builder()
            .use_middleware(RetryMiddleware::new(fast_policy(2)))
            .build();
        let handler = Flaky::new(5, false);
        let mut context = MessageContext::new();

        let result = pipeline
            .execute(&ChargeCard, &mut context, &handler)
            .await
            .unwrap();

        assert!(!result.is_success());
        assert_eq!(result.error_message(), Some("gateway declined"));
        assert_eq!(handler.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_skips_non_retryable_errors() {
        let pipeline = DispatchPipeline::builder()
            .use_middleware(RetryMiddleware::new(fast_policy(5)))
            .build();
        let mut context = MessageContext::new();

        let err = pipeline
            .execute(&ChargeCard, &mut context, &Rejecting)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidArgument(_)));
        assert_eq!(context.get_item(RETRY_ATTEMPT_ITEM), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_breaker_opens_on_failed_results() {
        let middleware = CircuitBreakerMiddleware::new(breaker(2));
        let shared = middleware.breaker().clone();
        let pipeline = DispatchPipeline::builder().use_middleware(middleware).build();
        let handler = Flaky::new(10, false);
        let mut context = MessageContext::new();

        for _ in 0..2 {
            let result = pipeline
                .execute(&ChargeCard, &mut context, &handler)
                .await
                .unwrap();
            assert!(!result.is_success());
        }
        assert_eq!(shared.state().await, CircuitState::Open);

        let err = pipeline
            .execute(&ChargeCard, &mut context, &handler)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::CircuitOpen(_)));
        assert_eq!(handler.calls(), 2);
    }

    #[tokio::test]
    async fn test_breaker_ignores_caller_errors() {
        let middleware = CircuitBreakerMiddleware::new(breaker(1));
        let shared = middleware.breaker().clone();
        let pipeline = DispatchPipeline::builder().use_middleware(middleware).build();
        let mut context = MessageContext::new();

        let _ = pipeline.execute(&ChargeCard, &mut context, &Rejecting).await;
        assert_eq!(shared.state().await, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_when_breaker_opens() {
        let pipeline = DispatchPipeline::builder()
            .use_middleware(RetryMiddleware::new(fast_policy(5)))
            .use_middleware(CircuitBreakerMiddleware::new(breaker(2)))
            .build();
        let handler = Flaky::new(10, true);
        let mut context = MessageContext::new();

        let err = pipeline
            .execute(&ChargeCard, &mut context, &handler)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::CircuitOpen(_)));
        assert_eq!(handler.calls(), 2);
    }
}
