pub mod app_config;
pub mod coordination;
pub mod input_validation;
pub mod logging;
pub mod pipeline;
pub mod resilience;
pub mod saga;
pub mod scheduler;

pub use app_config::*;
pub use coordination::*;
pub use input_validation::*;
pub use logging::*;
pub use pipeline::*;
pub use resilience::*;
pub use saga::*;
pub use scheduler::*;
