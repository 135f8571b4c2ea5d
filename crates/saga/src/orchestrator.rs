use crate::step::SagaStep;
use crate::tracker::ScheduledStepTracker;
use dispatch_config::SagaConfig;
use dispatch_core::retry_policy_from_config;
use dispatch_domain::{
    MessageContext, RetryPolicy, SagaActivity, SagaActivityKind, SagaResult, SagaState, StepResult,
};
use dispatch_errors::DispatchError;
use dispatch_infrastructure::StructuredLogger;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs saga steps in order. When a step fails after its retries, every
/// previously completed step is compensated in reverse order, once each.
pub struct SagaOrchestrator<D: Send> {
    saga_type: String,
    steps: Vec<Arc<dyn SagaStep<D>>>,
    retry_policy: RetryPolicy,
    step_timeout: Option<Duration>,
    tracker: ScheduledStepTracker,
}

/// 单次Saga执行的可变状态
struct SagaRun {
    saga_id: String,
    state: SagaState,
    activities: Vec<SagaActivity>,
}

impl SagaRun {
    fn record(&mut self, kind: SagaActivityKind, step: Option<&str>, message: impl Into<String>) {
        self.activities.push(SagaActivity::new(kind, step, message));
    }

    fn transition(&mut self, next: SagaState) {
        if !self.state.can_transition_to(next) {
            warn!(saga_id = %self.saga_id, from = %self.state, to = %next, "Ignoring invalid saga transition");
            return;
        }
        debug!(saga_id = %self.saga_id, from = %self.state, to = %next, "Saga state changed");
        self.record(
            SagaActivityKind::StateChanged,
            None,
            format!("{} -> {}", self.state, next),
        );
        self.state = next;
    }
}

impl<D: Send + Sync + 'static> SagaOrchestrator<D> {
    pub fn new<S: Into<String>>(saga_type: S) -> Self {
        Self {
            saga_type: saga_type.into(),
            steps: Vec::new(),
            retry_policy: RetryPolicy::default(),
            step_timeout: None,
            tracker: ScheduledStepTracker::new(),
        }
    }

    pub fn from_config<S: Into<String>>(saga_type: S, config: &SagaConfig) -> Self {
        let mut orchestrator =
            Self::new(saga_type).with_retry_policy(retry_policy_from_config(&config.default_retry));
        orchestrator.step_timeout = config.step_timeout_seconds.map(Duration::from_secs);
        orchestrator
    }

    pub fn add_step<S: SagaStep<D> + 'static>(self, step: S) -> Self {
        self.add_shared_step(Arc::new(step))
    }

    pub fn add_shared_step(mut self, step: Arc<dyn SagaStep<D>>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Background steps scheduled by this saga's steps through
    /// [`SagaStep::execute_scheduled`]; drain with `wait_for_scheduled_steps`.
    pub fn tracker(&self) -> &ScheduledStepTracker {
        &self.tracker
    }

    pub async fn execute(&self, data: D, context: &MessageContext) -> SagaResult<D> {
        self.execute_with_cancellation(data, context, CancellationToken::new())
            .await
    }

    /// Cancelling the token stops the saga before the next step, or drops the
    /// step in progress. Completed steps are not compensated on cancellation.
    pub async fn execute_with_cancellation(
        &self,
        mut data: D,
        context: &MessageContext,
        cancel: CancellationToken,
    ) -> SagaResult<D> {
        let started = Instant::now();
        let mut run = SagaRun {
            saga_id: Uuid::new_v4().to_string(),
            state: SagaState::Created,
            activities: Vec::new(),
        };
        let span = info_span!("saga", saga.id = %run.saga_id, saga_type = %self.saga_type);

        let (error_message, failed_compensations) = async {
            run.transition(SagaState::Running);
            let mut completed: Vec<usize> = Vec::new();

            for (index, step) in self.steps.iter().enumerate() {
                if cancel.is_cancelled() {
                    run.transition(SagaState::Cancelled);
                    return (Some("Saga cancelled".to_string()), Vec::new());
                }

                run.record(SagaActivityKind::StepStarted, Some(step.name()), "Step started");
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = self.run_step(step.as_ref(), &mut data, context, &mut run) => Some(result),
                };

                let Some(result) = outcome else {
                    run.record(SagaActivityKind::StepFailed, Some(step.name()), "Step cancelled");
                    run.transition(SagaState::Cancelled);
                    return (Some(format!("Saga cancelled during step '{}'", step.name())), Vec::new());
                };

                if result.is_success() {
                    run.record(SagaActivityKind::StepCompleted, Some(step.name()), "Step completed");
                    completed.push(index);
                    continue;
                }

                let error = result
                    .error_message()
                    .unwrap_or("step failed")
                    .to_string();
                run.record(SagaActivityKind::StepFailed, Some(step.name()), error.clone());
                warn!(step = step.name(), error = %error, "Saga step failed, compensating");

                run.transition(SagaState::Compensating);
                let failed = self.compensate(&completed, &mut data, context, &mut run).await;
                run.transition(if failed.is_empty() {
                    SagaState::CompensatedSuccessfully
                } else {
                    SagaState::CompensationFailed
                });
                return (Some(error), failed);
            }

            run.transition(SagaState::Completed);
            (None, Vec::new())
        }
        .instrument(span)
        .await;

        let duration = started.elapsed();
        StructuredLogger::log_saga_completed(
            &run.saga_id,
            &self.saga_type,
            &run.state.to_string(),
            duration,
        );

        SagaResult {
            saga_id: run.saga_id,
            saga_type: self.saga_type.clone(),
            state: run.state,
            data,
            activities: run.activities,
            duration,
            error_message,
            failed_compensations,
        }
    }

    async fn run_step(
        &self,
        step: &dyn SagaStep<D>,
        data: &mut D,
        context: &MessageContext,
        run: &mut SagaRun,
    ) -> StepResult {
        let policy = step.retry_policy().unwrap_or_else(|| self.retry_policy.clone());
        let timeout = step.timeout().or(self.step_timeout);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = Self::guarded(
                step.name(),
                timeout,
                step.execute_scheduled(data, context, &self.tracker),
            )
            .await;
            if result.is_success() || !policy.should_retry(attempt) {
                return result;
            }

            let delay = policy.get_delay(attempt);
            run.record(
                SagaActivityKind::StepRetried,
                Some(step.name()),
                format!(
                    "Attempt {attempt} failed: {}; retrying in {}ms",
                    result.error_message().unwrap_or("unknown error"),
                    delay.as_millis()
                ),
            );
            debug!(step = step.name(), attempt, delay_ms = delay.as_millis() as u64, "Retrying saga step");
            tokio::time::sleep(delay).await;
        }
    }

    /// Compensates completed steps in reverse order and returns the names of
    /// the compensations that failed.
    async fn compensate(
        &self,
        completed: &[usize],
        data: &mut D,
        context: &MessageContext,
        run: &mut SagaRun,
    ) -> Vec<String> {
        let mut failed = Vec::new();

        for &index in completed.iter().rev() {
            let step = &self.steps[index];
            let timeout = step.timeout().or(self.step_timeout);
            run.record(SagaActivityKind::CompensationStarted, Some(step.name()), "Compensating");

            let result = Self::guarded(step.name(), timeout, step.compensate(data, context)).await;
            if result.is_success() {
                run.record(SagaActivityKind::CompensationCompleted, Some(step.name()), "Compensated");
            } else {
                let error = result.error_message().unwrap_or("compensation failed");
                warn!(step = step.name(), error, "Saga compensation failed");
                run.record(SagaActivityKind::CompensationFailed, Some(step.name()), error);
                failed.push(step.name().to_string());
            }
        }

        if failed.is_empty() {
            info!(compensated = completed.len(), "Saga compensated");
        }
        failed
    }

    /// 应用超时，并将错误转换为失败结果
    async fn guarded<F>(name: &str, timeout: Option<Duration>, fut: F) -> StepResult
    where
        F: std::future::Future<Output = Result<StepResult, DispatchError>>,
    {
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(outcome) => outcome,
                Err(_) => Err(DispatchError::timeout_error(format!(
                    "step '{name}' exceeded {}ms",
                    limit.as_millis()
                ))),
            },
            None => fut.await,
        };

        match outcome {
            Ok(result) => result,
            Err(e) => StepResult::failure_with_error(format!("Step '{name}' failed: {e}"), &e),
        }
    }
}
