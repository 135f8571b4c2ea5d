use super::{Middleware, MiddlewareStage, Next, TerminalHandler};
use dispatch_domain::{DispatchMessage, MessageContext, MessageResult};
use dispatch_errors::DispatchResult;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct PipelineBuilder {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_middleware<M: Middleware + 'static>(self, middleware: M) -> Self {
        self.use_shared(Arc::new(middleware))
    }

    pub fn use_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    // 稳定排序，同一阶段内保持注册顺序
    pub fn build(mut self) -> DispatchPipeline {
        self.middlewares.sort_by_key(|m| m.stage());
        for middleware in &self.middlewares {
            debug!(
                middleware = middleware.name(),
                stage = %middleware.stage(),
                "Middleware registered"
            );
        }
        DispatchPipeline {
            middlewares: self.middlewares,
        }
    }
}

/// Immutable middleware chain.
pub struct DispatchPipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl DispatchPipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn empty() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub async fn execute(
        &self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
        terminal: &dyn TerminalHandler,
    ) -> DispatchResult<MessageResult> {
        Next::new(&self.middlewares, terminal)
            .run(message, context)
            .await
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// 按执行顺序返回中间件名称及其阶段
    pub fn describe(&self) -> Vec<(String, MiddlewareStage)> {
        self.middlewares
            .iter()
            .map(|m| (m.name().to_string(), m.stage()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dispatch_errors::DispatchError;
    use serde::Serialize;
    use std::sync::Mutex;

    #[derive(Debug, Serialize)]
    struct Ping;

    struct Recording {
        name: &'static str,
        stage: MiddlewareStage,
        log: Arc<Mutex<Vec<String>>>,
        short_circuit: bool,
    }

    #[async_trait]
    impl Middleware for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn stage(&self) -> MiddlewareStage {
            self.stage
        }

        async fn invoke(
            &self,
            message: &dyn DispatchMessage,
            context: &mut MessageContext,
            next: Next<'_>,
        ) -> DispatchResult<MessageResult> {
            self.log.lock().unwrap().push(self.name.to_string());
            if self.short_circuit {
                return Err(DispatchError::invalid_operation("stopped"));
            }
            next.run(message, context).await
        }
    }

    struct Terminal(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl TerminalHandler for Terminal {
        async fn handle(
            &self,
            _message: &dyn DispatchMessage,
            _context: &mut MessageContext,
        ) -> DispatchResult<MessageResult> {
            self.0.lock().unwrap().push("handler".to_string());
            Ok(MessageResult::success())
        }
    }

    fn recording(
        name: &'static str,
        stage: MiddlewareStage,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Recording {
        Recording {
            name,
            stage,
            log: log.clone(),
            short_circuit: false,
        }
    }

    #[tokio::test]
    async fn test_stage_order_then_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PipelineBuilder::new()
            .use_middleware(recording("metrics", MiddlewareStage::Observability, &log))
            .use_middleware(recording("retry", MiddlewareStage::Resilience, &log))
            .use_middleware(recording("schema", MiddlewareStage::Validation, &log))
            .use_middleware(recording("breaker", MiddlewareStage::Resilience, &log))
            .use_middleware(recording("hygiene", MiddlewareStage::Validation, &log))
            .build();

        let mut context = MessageContext::new();
        let result = pipeline
            .execute(&Ping, &mut context, &Terminal(log.clone()))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["schema", "hygiene", "retry", "breaker", "metrics", "handler"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PipelineBuilder::new()
            .use_middleware(recording("after", MiddlewareStage::Resilience, &log))
            .use_middleware(Recording {
                name: "gate",
                stage: MiddlewareStage::Validation,
                log: log.clone(),
                short_circuit: true,
            })
            .build();

        let mut context = MessageContext::new();
        let err = pipeline
            .execute(&Ping, &mut context, &Terminal(log.clone()))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::InvalidOperation(_)));
        assert_eq!(*log.lock().unwrap(), vec!["gate"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_calls_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = DispatchPipeline::empty();
        assert!(pipeline.is_empty());

        let mut context = MessageContext::new();
        pipeline
            .execute(&Ping, &mut context, &Terminal(log.clone()))
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["handler"]);
    }
}
