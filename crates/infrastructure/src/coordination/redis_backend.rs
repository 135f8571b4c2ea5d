use async_trait::async_trait;
use dispatch_domain::CoordinationBackend;
use dispatch_errors::{DispatchError, DispatchResult};
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use tracing::{debug, instrument};

const RENEW_IF_OWNER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
"#;

const DELETE_IF_OWNER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Redis协调后端
///
/// 锁与领导权使用 `SET NX PX`，续期与按所有者删除通过Lua脚本保证原子性。
#[derive(Clone)]
pub struct RedisCoordinationBackend {
    connection: ConnectionManager,
    renew_script: Script,
    delete_script: Script,
}

impl RedisCoordinationBackend {
    pub async fn connect(url: &str, connection_timeout: Duration) -> DispatchResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| DispatchError::config_error(format!("无效的Redis地址 {url}: {e}")))?;

        let connection = tokio::time::timeout(connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                DispatchError::timeout_error(format!(
                    "连接Redis超时 (超时时间: {connection_timeout:?})"
                ))
            })??;

        let backend = Self::from_connection(connection);
        backend.ping().await?;
        debug!(url, "Redis协调后端连接成功");
        Ok(backend)
    }

    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self {
            connection,
            renew_script: Script::new(RENEW_IF_OWNER),
            delete_script: Script::new(DELETE_IF_OWNER),
        }
    }

    pub async fn ping(&self) -> DispatchResult<()> {
        let mut conn = self.connection.clone();
        let response: String = redis::cmd("PING").query_async(&mut conn).await?;
        if response != "PONG" {
            return Err(DispatchError::coordination(format!(
                "意外的PING响应: {response}"
            )));
        }
        Ok(())
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CoordinationBackend for RedisCoordinationBackend {
    #[instrument(skip(self, value))]
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> DispatchResult<bool> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    #[instrument(skip(self, owner))]
    async fn renew_if_owner(&self, key: &str, owner: &str, ttl: Duration) -> DispatchResult<bool> {
        let mut conn = self.connection.clone();
        let renewed: i64 = self
            .renew_script
            .key(key)
            .arg(owner)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed == 1)
    }

    #[instrument(skip(self, owner))]
    async fn delete_if_owner(&self, key: &str, owner: &str) -> DispatchResult<bool> {
        let mut conn = self.connection.clone();
        let deleted: i64 = self
            .delete_script
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn get(&self, key: &str) -> DispatchResult<Option<String>> {
        let mut conn = self.connection.clone();
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> DispatchResult<()> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> DispatchResult<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn set_add(&self, set_key: &str, member: &str) -> DispatchResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("SADD")
            .arg(set_key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> DispatchResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("SREM")
            .arg(set_key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> DispatchResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let mut members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(set_key)
            .query_async(&mut conn)
            .await?;
        members.sort();
        Ok(members)
    }
}
