pub mod coordination;
pub mod logging;
pub mod security_sink;
pub mod serialization;
pub mod stores;
pub mod timeout_monitor;

pub use coordination::{
    create_coordination_backend, MemoryCoordinationBackend, RedisCoordinationBackend,
};
pub use logging::{init_structured_logging, StructuredLogger};
pub use security_sink::TracingSecurityEventSink;
pub use serialization::JsonMessageSerializer;
pub use stores::{InMemoryCronJobStore, InMemoryScheduleStore};
pub use timeout_monitor::{MonitorStats, TimeoutOperationMonitor};
