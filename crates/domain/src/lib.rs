pub mod context;
pub mod coordination;
pub mod cron_job;
pub mod message;
pub mod ports;
pub mod retry;
pub mod saga;
pub mod schedule;
pub mod security;

pub use context::*;
pub use coordination::*;
pub use cron_job::*;
pub use dispatch_errors::{DispatchError, DispatchResult};
pub use message::*;
pub use ports::*;
pub use retry::*;
pub use saga::*;
pub use schedule::*;
pub use security::*;
