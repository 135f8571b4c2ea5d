//! Message version upcasting.
//!
//! Each [`MessageUpcaster`] converts one message type from one version to the
//! next. The [`UpcastingPipeline`] chains them so a stored V1 payload reaches
//! the latest version in a single call.

mod builder;
mod pipeline;
mod upcaster;

pub use builder::UpcastingPipelineBuilder;
pub use pipeline::UpcastingPipeline;
pub use upcaster::{JsonUpcaster, MessageUpcaster, TypedUpcaster, VersionedMessage};
