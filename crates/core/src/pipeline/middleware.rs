use super::MiddlewareStage;
use async_trait::async_trait;
use dispatch_domain::{DispatchMessage, MessageContext, MessageResult};
use dispatch_errors::DispatchResult;
use std::sync::Arc;

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn stage(&self) -> MiddlewareStage;

    async fn invoke(
        &self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
        next: Next<'_>,
    ) -> DispatchResult<MessageResult>;
}

/// End of the chain, usually the resolved handler.
#[async_trait]
pub trait TerminalHandler: Send + Sync {
    async fn handle(
        &self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
    ) -> DispatchResult<MessageResult>;
}

/// Continuation over the remaining middlewares. `Copy`, so a middleware may
/// run it more than once (retry).
#[derive(Clone, Copy)]
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn TerminalHandler,
}

impl<'a> Next<'a> {
    pub fn new(remaining: &'a [Arc<dyn Middleware>], terminal: &'a dyn TerminalHandler) -> Self {
        Self {
            remaining,
            terminal,
        }
    }

    pub async fn run(
        self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
    ) -> DispatchResult<MessageResult> {
        match self.remaining.split_first() {
            Some((current, rest)) => {
                let next = Next::new(rest, self.terminal);
                current.invoke(message, context, next).await
            }
            None => self.terminal.handle(message, context).await,
        }
    }

    /// Number of middlewares still ahead of the terminal handler.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}
