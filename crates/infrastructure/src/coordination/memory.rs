use async_trait::async_trait;
use dispatch_domain::CoordinationBackend;
use dispatch_errors::DispatchResult;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, Entry>,
    sets: HashMap<String, BTreeSet<String>>,
}

impl State {
    /// 读取未过期的值，顺带清理过期键
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.values.get(key).is_some_and(|e| !e.is_live(now)) {
            self.values.remove(key);
        }
        self.values.get_mut(key)
    }
}

/// 单进程内存协调后端
///
/// 语义与Redis后端一致，过期基于 `tokio::time::Instant`。适用于单实例部署与测试。
#[derive(Debug, Default)]
pub struct MemoryCoordinationBackend {
    state: Mutex<State>,
}

impl MemoryCoordinationBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationBackend for MemoryCoordinationBackend {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> DispatchResult<bool> {
        let mut state = self.state.lock().await;
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn renew_if_owner(&self, key: &str, owner: &str, ttl: Duration) -> DispatchResult<bool> {
        let mut state = self.state.lock().await;
        match state.live(key) {
            Some(entry) if entry.value == owner => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_owner(&self, key: &str, owner: &str) -> DispatchResult<bool> {
        let mut state = self.state.lock().await;
        let owned = state.live(key).is_some_and(|e| e.value == owner);
        if owned {
            state.values.remove(key);
        }
        Ok(owned)
    }

    async fn get(&self, key: &str) -> DispatchResult<Option<String>> {
        let mut state = self.state.lock().await;
        Ok(state.live(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> DispatchResult<()> {
        let mut state = self.state.lock().await;
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> DispatchResult<bool> {
        let mut state = self.state.lock().await;
        let existed = state.live(key).is_some();
        state.values.remove(key);
        let was_set = state.sets.remove(key).is_some();
        Ok(existed || was_set)
    }

    async fn set_add(&self, set_key: &str, member: &str) -> DispatchResult<()> {
        let mut state = self.state.lock().await;
        state
            .sets
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> DispatchResult<()> {
        let mut state = self.state.lock().await;
        if let Some(set) = state.sets.get_mut(set_key) {
            set.remove(member);
            if set.is_empty() {
                state.sets.remove(set_key);
            }
        }
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> DispatchResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .sets
            .get(set_key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_respects_ttl() {
        let backend = MemoryCoordinationBackend::new();
        let ttl = Duration::from_secs(10);

        assert!(backend.set_if_absent("lock:a", "owner-1", ttl).await.unwrap());
        assert!(!backend.set_if_absent("lock:a", "owner-2", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(backend.get("lock:a").await.unwrap(), None);
        assert!(backend.set_if_absent("lock:a", "owner-2", ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_and_delete_only_for_owner() {
        let backend = MemoryCoordinationBackend::new();
        let ttl = Duration::from_secs(10);
        backend.set_if_absent("leader", "a", ttl).await.unwrap();

        assert!(!backend.renew_if_owner("leader", "b", ttl).await.unwrap());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(backend.renew_if_owner("leader", "a", ttl).await.unwrap());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(backend.get("leader").await.unwrap().as_deref(), Some("a"));

        assert!(!backend.delete_if_owner("leader", "b").await.unwrap());
        assert!(backend.delete_if_owner("leader", "a").await.unwrap());
        assert!(!backend.delete_if_owner("leader", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_membership() {
        let backend = MemoryCoordinationBackend::new();
        backend.set_add("instances", "b").await.unwrap();
        backend.set_add("instances", "a").await.unwrap();
        backend.set_add("instances", "a").await.unwrap();
        assert_eq!(backend.set_members("instances").await.unwrap(), vec!["a", "b"]);

        backend.set_remove("instances", "a").await.unwrap();
        backend.set_remove("instances", "b").await.unwrap();
        assert!(backend.set_members("instances").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_plain_set_without_ttl() {
        let backend = MemoryCoordinationBackend::new();
        backend.set("k", "v1", None).await.unwrap();
        backend.set("k", "v2", None).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v2"));
        assert!(backend.delete("k").await.unwrap());
        assert!(!backend.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_set() {
        let backend = MemoryCoordinationBackend::new();
        backend.set_add("assigned:i1", "job-1").await.unwrap();
        assert!(backend.delete("assigned:i1").await.unwrap());
        assert!(backend.set_members("assigned:i1").await.unwrap().is_empty());
    }
}
