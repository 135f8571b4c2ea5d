//! Saga orchestration: sequential steps with per-step retry and timeout,
//! reverse-order compensation on failure, and tracked background steps.

pub mod orchestrator;
pub mod step;
pub mod tracker;

pub use orchestrator::SagaOrchestrator;
pub use step::{DispatchStep, SagaStep};
pub use tracker::ScheduledStepTracker;
pub use tokio_util::sync::CancellationToken;
