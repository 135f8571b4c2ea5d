//! Test container utilities for integration testing

use anyhow::Result;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::redis::{Redis, REDIS_PORT};

/// Redis test container for coordination backend integration tests
pub struct RedisTestContainer {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    pub url: String,
}

impl RedisTestContainer {
    /// Starts `redis` and returns once the port is mapped
    pub async fn new() -> Result<Self> {
        let container = Redis::default().start().await?;
        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(REDIS_PORT).await?;

        Ok(Self {
            container,
            url: format!("redis://{host}:{port}"),
        })
    }
}
