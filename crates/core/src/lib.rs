//! Dispatch core: middleware pipeline, input validation, handler registry,
//! message upcasting and the resilience middlewares.

pub mod handlers;
pub mod pipeline;
pub mod resilience;
pub mod upcasting;
pub mod validation;

pub use handlers::{
    HandlerLifetime, HandlerRegistry, HandlerRegistryBuilder, HandlerRegistryEntry,
    MessageDispatcher, MessageHandler, RequestHandler,
};
pub use pipeline::{DispatchPipeline, Middleware, MiddlewareStage, Next, PipelineBuilder, TerminalHandler};
pub use resilience::{
    retry_policy_from_config, CircuitBreaker, CircuitBreakerMiddleware, CircuitBreakerStats,
    CircuitState, RetryMiddleware,
};
pub use upcasting::{
    JsonUpcaster, MessageUpcaster, TypedUpcaster, UpcastingPipeline, UpcastingPipelineBuilder,
    VersionedMessage,
};
pub use validation::{InputValidationMiddleware, InputValidator, InputValidationResult};
