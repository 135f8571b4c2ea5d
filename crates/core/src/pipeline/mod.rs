//! Ordered, stage-based middleware pipeline.
//!
//! Middlewares run in ascending [`MiddlewareStage`] order and, within a stage,
//! in registration order. Each middleware receives a [`Next`] continuation and
//! either calls it or short-circuits.

mod builder;
mod middleware;
mod stage;

pub use builder::{DispatchPipeline, PipelineBuilder};
pub use middleware::{Middleware, Next, TerminalHandler};
pub use stage::MiddlewareStage;
