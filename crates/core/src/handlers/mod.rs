//! Handler registry and the dispatcher built on top of it.

mod dispatcher;
mod registry;

pub use dispatcher::MessageDispatcher;
pub use registry::{
    HandlerLifetime, HandlerRegistry, HandlerRegistryBuilder, HandlerRegistryEntry,
    MessageHandler, RequestHandler,
};
