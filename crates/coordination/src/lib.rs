//! 分布式作业协调
//!
//! 所有状态保存在共享的 [`CoordinationBackend`](dispatch_domain::CoordinationBackend) 中，
//! 键布局见 [`CoordinationKeys`]。

pub mod coordinator;
pub mod heartbeat;
pub mod keys;
pub mod leader_election;
pub mod lease;
pub mod strategies;

pub use coordinator::DistributedJobCoordinator;
pub use heartbeat::InstanceHeartbeat;
pub use keys::CoordinationKeys;
pub use leader_election::LeaderElectionService;
pub use lease::{DistributedJobLock, LeadershipToken, DISPOSE_TIMEOUT};
pub use strategies::{
    CapabilityAffinityStrategy, CompositeStrategy, DistributionStrategy, LeastLoadedStrategy,
    RoundRobinStrategy,
};
