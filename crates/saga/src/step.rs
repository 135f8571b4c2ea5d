use crate::tracker::ScheduledStepTracker;
use async_trait::async_trait;
use dispatch_domain::{DispatchMessage, Dispatcher, MessageContext, RetryPolicy, StepResult};
use dispatch_errors::DispatchResult;
use std::sync::Arc;
use std::time::Duration;

/// One forward action of a saga and its compensating action.
///
/// Returning `Err` from either method is treated the same as returning
/// `StepResult::failure`.
#[async_trait]
pub trait SagaStep<D: Send>: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, data: &mut D, context: &MessageContext) -> DispatchResult<StepResult>;

    /// Forward action as invoked by the orchestrator. Steps that hand work to
    /// the background override this and schedule it on the saga's tracker;
    /// the default runs [`execute`](Self::execute).
    async fn execute_scheduled(
        &self,
        data: &mut D,
        context: &MessageContext,
        _tracker: &ScheduledStepTracker,
    ) -> DispatchResult<StepResult> {
        self.execute(data, context).await
    }

    async fn compensate(&self, data: &mut D, context: &MessageContext)
        -> DispatchResult<StepResult>;

    /// 覆盖编排器对该步骤的重试策略
    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }

    /// 覆盖编排器的步骤超时
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

type MessageFactory<D> = Box<dyn Fn(&D) -> Box<dyn DispatchMessage> + Send + Sync>;

/// Step that sends a message through the dispatcher and, on compensation,
/// an optional compensating message. Handler failures fail the step.
pub struct DispatchStep<D> {
    name: String,
    dispatcher: Arc<dyn Dispatcher>,
    forward: MessageFactory<D>,
    compensation: Option<MessageFactory<D>>,
}

impl<D> DispatchStep<D> {
    pub fn new<S, F>(name: S, dispatcher: Arc<dyn Dispatcher>, forward: F) -> Self
    where
        S: Into<String>,
        F: Fn(&D) -> Box<dyn DispatchMessage> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dispatcher,
            forward: Box::new(forward),
            compensation: None,
        }
    }

    pub fn with_compensation<F>(mut self, compensation: F) -> Self
    where
        F: Fn(&D) -> Box<dyn DispatchMessage> + Send + Sync + 'static,
    {
        self.compensation = Some(Box::new(compensation));
        self
    }

    async fn send(
        &self,
        message: Box<dyn DispatchMessage>,
        context: &MessageContext,
    ) -> DispatchResult<StepResult> {
        let mut child = context.create_child();
        self.dispatcher
            .dispatch_strict(message.as_ref(), &mut child)
            .await?;
        Ok(StepResult::success())
    }
}

#[async_trait]
impl<D: Send + Sync> SagaStep<D> for DispatchStep<D> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, data: &mut D, context: &MessageContext) -> DispatchResult<StepResult> {
        let message = (self.forward)(data);
        self.send(message, context).await
    }

    async fn compensate(
        &self,
        data: &mut D,
        context: &MessageContext,
    ) -> DispatchResult<StepResult> {
        match &self.compensation {
            Some(compensation) => {
                let message = compensation(data);
                self.send(message, context).await
            }
            None => Ok(StepResult::success()),
        }
    }
}
