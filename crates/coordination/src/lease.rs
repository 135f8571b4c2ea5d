//! 基于TTL的租约，锁与领导权令牌共用

use chrono::{DateTime, Utc};
use dispatch_domain::CoordinationBackend;
use dispatch_errors::DispatchResult;
use dispatch_infrastructure::StructuredLogger;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// `dispose` 内部的释放超时，与调用方的取消无关
pub const DISPOSE_TIMEOUT: Duration = Duration::from_secs(5);

struct Lease {
    backend: Arc<dyn CoordinationBackend>,
    key: String,
    owner: String,
    acquired_at: DateTime<Utc>,
    base: Instant,
    /// 相对 `base` 的过期毫秒数
    expires_after_ms: AtomicU64,
    released: AtomicBool,
}

impl Lease {
    fn new(backend: Arc<dyn CoordinationBackend>, key: String, owner: String, ttl: Duration) -> Self {
        Self {
            backend,
            key,
            owner,
            acquired_at: Utc::now(),
            base: Instant::now(),
            expires_after_ms: AtomicU64::new(ttl.as_millis() as u64),
            released: AtomicBool::new(false),
        }
    }

    fn remaining(&self) -> Duration {
        if self.released.load(Ordering::SeqCst) {
            return Duration::ZERO;
        }
        let expires = Duration::from_millis(self.expires_after_ms.load(Ordering::SeqCst));
        expires.saturating_sub(self.base.elapsed())
    }

    fn is_valid(&self) -> bool {
        !self.remaining().is_zero()
    }

    fn expires_at(&self) -> DateTime<Utc> {
        let expires_after_ms = self.expires_after_ms.load(Ordering::SeqCst);
        self.acquired_at + chrono::Duration::milliseconds(expires_after_ms as i64)
    }

    fn expire_now(&self) {
        self.expires_after_ms.store(0, Ordering::SeqCst);
    }

    async fn extend(&self, duration: Duration) -> bool {
        if self.released.load(Ordering::SeqCst) {
            return false;
        }
        match self
            .backend
            .renew_if_owner(&self.key, &self.owner, duration)
            .await
        {
            Ok(true) => {
                let new_expiry = self.base.elapsed() + duration;
                self.expires_after_ms
                    .store(new_expiry.as_millis() as u64, Ordering::SeqCst);
                true
            }
            Ok(false) => {
                debug!(key = %self.key, "租约已不属于当前持有者");
                self.expire_now();
                false
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "租约续期失败");
                false
            }
        }
    }

    async fn release(&self) -> DispatchResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.expire_now();
        let deleted = self.backend.delete_if_owner(&self.key, &self.owner).await?;
        if deleted {
            StructuredLogger::log_lock_released(&self.key, &self.owner);
        } else {
            debug!(key = %self.key, "释放时租约已过期或被他人持有");
        }
        Ok(())
    }

    async fn dispose(&self) {
        match tokio::time::timeout(DISPOSE_TIMEOUT, self.release()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(key = %self.key, error = %e, "释放租约失败"),
            Err(_) => warn!(key = %self.key, "释放租约超时"),
        }
    }
}

/// 分布式作业锁
pub struct DistributedJobLock {
    lease: Lease,
    job_key: String,
}

impl DistributedJobLock {
    pub(crate) fn new(
        backend: Arc<dyn CoordinationBackend>,
        storage_key: String,
        job_key: &str,
        lock_id: String,
        ttl: Duration,
    ) -> Self {
        Self {
            lease: Lease::new(backend, storage_key, lock_id, ttl),
            job_key: job_key.to_string(),
        }
    }

    pub fn job_key(&self) -> &str {
        &self.job_key
    }

    pub fn lock_id(&self) -> &str {
        &self.lease.owner
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.lease.acquired_at
    }

    /// 本地记录的过期时间，续期后随之后移，释放后等于获取时间
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.lease.expires_at()
    }

    /// 未释放且本地记录的TTL未到期
    pub fn is_valid(&self) -> bool {
        self.lease.is_valid()
    }

    pub fn remaining(&self) -> Duration {
        self.lease.remaining()
    }

    /// 仍为持有者时把TTL重置为 `duration`
    pub async fn extend(&self, duration: Duration) -> bool {
        self.lease.extend(duration).await
    }

    /// 幂等，第二次调用不访问后端
    pub async fn release(&self) -> DispatchResult<()> {
        self.lease.release().await
    }

    /// 带内部超时的释放，超时与错误只记录日志
    pub async fn dispose(&self) {
        self.lease.dispose().await
    }
}

impl std::fmt::Debug for DistributedJobLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedJobLock")
            .field("job_key", &self.job_key)
            .field("lock_id", &self.lease.owner)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// 领导权令牌
pub struct LeadershipToken {
    lease: Lease,
    leader_key: String,
}

impl LeadershipToken {
    pub(crate) fn new(
        backend: Arc<dyn CoordinationBackend>,
        storage_key: String,
        leader_key: &str,
        instance_id: String,
        ttl: Duration,
    ) -> Self {
        Self {
            lease: Lease::new(backend, storage_key, instance_id, ttl),
            leader_key: leader_key.to_string(),
        }
    }

    pub fn leader_key(&self) -> &str {
        &self.leader_key
    }

    pub fn instance_id(&self) -> &str {
        &self.lease.owner
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.lease.acquired_at
    }

    /// 本地记录的过期时间，续期后随之后移，释放后等于获取时间
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.lease.expires_at()
    }

    pub fn is_valid(&self) -> bool {
        self.lease.is_valid()
    }

    pub fn remaining(&self) -> Duration {
        self.lease.remaining()
    }

    pub async fn extend(&self, duration: Duration) -> bool {
        self.lease.extend(duration).await
    }

    pub async fn release(&self) -> DispatchResult<()> {
        self.lease.release().await
    }

    pub async fn dispose(&self) {
        self.lease.dispose().await
    }
}

impl std::fmt::Debug for LeadershipToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeadershipToken")
            .field("leader_key", &self.leader_key)
            .field("instance_id", &self.lease.owner)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dispatch_testing_utils::MockCoordinationBackend;

    fn lock(backend: &MockCoordinationBackend, ttl: Duration) -> DistributedJobLock {
        backend.overwrite("dispatch:lock:j1", "lock-1");
        DistributedJobLock::new(
            Arc::new(backend.clone()),
            "dispatch:lock:j1".to_string(),
            "j1",
            "lock-1".to_string(),
            ttl,
        )
    }

    #[tokio::test]
    async fn test_double_release_makes_one_backend_call() {
        let backend = MockCoordinationBackend::new();
        let lock = lock(&backend, Duration::from_secs(30));

        lock.release().await.unwrap();
        lock.release().await.unwrap();

        assert_eq!(backend.call_count("delete_if_owner"), 1);
        assert!(!lock.is_valid());
        assert_eq!(backend.peek("dispatch:lock:j1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validity_is_monotonic_without_extend() {
        let backend = MockCoordinationBackend::new();
        let lock = lock(&backend, Duration::from_secs(10));

        assert!(lock.is_valid());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(lock.is_valid());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!lock.is_valid());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!lock.is_valid());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_resets_ttl() {
        let backend = MockCoordinationBackend::new();
        let lock = lock(&backend, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(lock.extend(Duration::from_secs(10)).await);
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(lock.is_valid());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_at_tracks_ttl() {
        let backend = MockCoordinationBackend::new();
        let lock = lock(&backend, Duration::from_secs(10));
        assert_eq!(
            lock.expires_at(),
            lock.acquired_at() + chrono::Duration::seconds(10)
        );

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(lock.extend(Duration::from_secs(10)).await);
        assert_eq!(
            lock.expires_at(),
            lock.acquired_at() + chrono::Duration::seconds(14)
        );

        lock.release().await.unwrap();
        assert_eq!(lock.expires_at(), lock.acquired_at());
    }

    #[tokio::test]
    async fn test_extend_fails_when_ownership_lost() {
        let backend = MockCoordinationBackend::new();
        let lock = lock(&backend, Duration::from_secs(10));
        backend.overwrite("dispatch:lock:j1", "someone-else");

        assert!(!lock.extend(Duration::from_secs(10)).await);
        assert!(!lock.is_valid());
    }

    #[tokio::test]
    async fn test_extend_after_release_skips_backend() {
        let backend = MockCoordinationBackend::new();
        let lock = lock(&backend, Duration::from_secs(10));
        lock.release().await.unwrap();

        assert!(!lock.extend(Duration::from_secs(10)).await);
        assert_eq!(backend.call_count("renew_if_owner"), 0);
    }

    #[tokio::test]
    async fn test_dispose_swallows_backend_errors() {
        let backend = MockCoordinationBackend::new();
        let lock = lock(&backend, Duration::from_secs(10));
        backend.set_unavailable(true);

        lock.dispose().await;
        lock.dispose().await;
        assert_eq!(backend.call_count("delete_if_owner"), 1);
    }

    struct HangingBackend;

    #[async_trait]
    impl CoordinationBackend for HangingBackend {
        async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> DispatchResult<bool> {
            Ok(true)
        }
        async fn renew_if_owner(&self, _: &str, _: &str, _: Duration) -> DispatchResult<bool> {
            Ok(true)
        }
        async fn delete_if_owner(&self, _: &str, _: &str) -> DispatchResult<bool> {
            std::future::pending().await
        }
        async fn get(&self, _: &str) -> DispatchResult<Option<String>> {
            Ok(None)
        }
        async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> DispatchResult<()> {
            Ok(())
        }
        async fn delete(&self, _: &str) -> DispatchResult<bool> {
            Ok(false)
        }
        async fn set_add(&self, _: &str, _: &str) -> DispatchResult<()> {
            Ok(())
        }
        async fn set_remove(&self, _: &str, _: &str) -> DispatchResult<()> {
            Ok(())
        }
        async fn set_members(&self, _: &str) -> DispatchResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_is_bounded_by_internal_timeout() {
        let token = LeadershipToken::new(
            Arc::new(HangingBackend),
            "dispatch:leader:host".to_string(),
            "host",
            "instance-1".to_string(),
            Duration::from_secs(30),
        );

        let started = Instant::now();
        token.dispose().await;
        assert!(started.elapsed() >= DISPOSE_TIMEOUT);
        assert!(!token.is_valid());
    }
}
