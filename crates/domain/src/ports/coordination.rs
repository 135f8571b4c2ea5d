use async_trait::async_trait;
use dispatch_errors::DispatchResult;
use std::time::Duration;

/// 共享的键值协调后端，是锁、领导权与实例注册的唯一事实来源
#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    /// 原子的"不存在则设置并附带TTL"，设置成功返回 true
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> DispatchResult<bool>;

    /// 当前值等于 `owner` 时续期
    async fn renew_if_owner(&self, key: &str, owner: &str, ttl: Duration) -> DispatchResult<bool>;

    /// 当前值等于 `owner` 时删除
    async fn delete_if_owner(&self, key: &str, owner: &str) -> DispatchResult<bool>;

    async fn get(&self, key: &str) -> DispatchResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> DispatchResult<()>;

    async fn delete(&self, key: &str) -> DispatchResult<bool>;

    async fn set_add(&self, set_key: &str, member: &str) -> DispatchResult<()>;

    async fn set_remove(&self, set_key: &str, member: &str) -> DispatchResult<()>;

    async fn set_members(&self, set_key: &str) -> DispatchResult<Vec<String>>;
}
