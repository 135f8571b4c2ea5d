use super::registry::{ErasedHandler, HandlerRegistry, HandlerRegistryEntry};
use crate::pipeline::{DispatchPipeline, TerminalHandler};
use async_trait::async_trait;
use dispatch_domain::{short_type_name, DispatchMessage, Dispatcher, MessageContext, MessageResult};
use dispatch_errors::{DispatchError, DispatchResult};
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};

/// Runs messages through the pipeline and into their registered handler.
#[derive(Clone)]
pub struct MessageDispatcher {
    registry: Arc<HandlerRegistry>,
    pipeline: Arc<DispatchPipeline>,
}

impl MessageDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, pipeline: Arc<DispatchPipeline>) -> Self {
        Self { registry, pipeline }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn pipeline(&self) -> &DispatchPipeline {
        &self.pipeline
    }
}

struct HandlerInvoker<'a> {
    entry: &'a HandlerRegistryEntry,
    handler: Arc<dyn ErasedHandler>,
}

#[async_trait]
impl TerminalHandler for HandlerInvoker<'_> {
    async fn handle(
        &self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
    ) -> DispatchResult<MessageResult> {
        match self.handler.invoke(message, context).await {
            Ok(result) => {
                debug!(
                    event = "message_handled",
                    handler = self.entry.handler_type,
                    message.id = %context.message_id,
                    "Handler completed"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(
                    event = "handler_failed",
                    handler = self.entry.handler_type,
                    message.id = %context.message_id,
                    error = %e,
                    "Handler failed"
                );
                Ok(MessageResult::failure(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Dispatcher for MessageDispatcher {
    async fn dispatch(
        &self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
    ) -> DispatchResult<MessageResult> {
        let Some((entry, handler)) = self.registry.resolve(message.runtime_type_id()) else {
            warn!(
                message.type = message.message_type(),
                message.id = %context.message_id,
                "No handler registered for message type"
            );
            return Err(DispatchError::handler_not_found(message.message_type()));
        };

        if context.message_type.is_none() {
            context.message_type = Some(short_type_name(message.message_type()).to_string());
        }

        let span = info_span!(
            "dispatch",
            message.type = short_type_name(message.message_type()),
            message.id = %context.message_id,
            correlation_id = %context.correlation_id
        );
        let invoker = HandlerInvoker { entry, handler };

        self.pipeline
            .execute(message, context, &invoker)
            .instrument(span)
            .await
    }
}
