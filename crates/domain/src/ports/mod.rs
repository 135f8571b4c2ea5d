//! 领域端口：由核心与基础设施层实现的抽象接口

pub mod coordination;
pub mod dispatcher;
pub mod monitoring;
pub mod serialization;
pub mod stores;

pub use coordination::*;
pub use dispatcher::*;
pub use monitoring::*;
pub use serialization::*;
pub use stores::*;
