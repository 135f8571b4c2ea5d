use crate::keys::CoordinationKeys;
use crate::lease::{DistributedJobLock, LeadershipToken};
use crate::strategies::{DistributionStrategy, LeastLoadedStrategy};
use chrono::Utc;
use dispatch_config::CoordinationConfig;
use dispatch_domain::{
    CoordinationBackend, JobAssignment, JobCompletionRecord, JobInstanceInfo,
};
use dispatch_errors::{DispatchError, DispatchResult};
use dispatch_infrastructure::StructuredLogger;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// 分配与完成记录的保留时长
const RECORD_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// 分布式作业协调器
///
/// 负责锁与领导权的获取、实例注册以及作业分配。所有键都在同一个前缀下，
/// 后端是唯一的事实来源。
pub struct DistributedJobCoordinator {
    backend: Arc<dyn CoordinationBackend>,
    keys: CoordinationKeys,
    instance_id: String,
    strategy: Arc<dyn DistributionStrategy>,
    instance_ttl: Duration,
    staleness: chrono::Duration,
}

impl DistributedJobCoordinator {
    pub fn new<S: Into<String>>(
        backend: Arc<dyn CoordinationBackend>,
        keys: CoordinationKeys,
        instance_id: S,
    ) -> Self {
        Self {
            backend,
            keys,
            instance_id: instance_id.into(),
            strategy: Arc::new(LeastLoadedStrategy::new()),
            instance_ttl: Duration::from_secs(90),
            staleness: chrono::Duration::seconds(90),
        }
    }

    pub fn from_config<S: Into<String>>(
        backend: Arc<dyn CoordinationBackend>,
        config: &CoordinationConfig,
        instance_id: S,
    ) -> Self {
        Self::new(backend, CoordinationKeys::new(config.key_prefix.clone()), instance_id)
            .with_instance_ttl(Duration::from_secs(config.instance_ttl_seconds))
            .with_staleness(Duration::from_secs(config.instance_staleness_seconds))
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn DistributionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_instance_ttl(mut self, ttl: Duration) -> Self {
        self.instance_ttl = ttl;
        self
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness =
            chrono::Duration::from_std(staleness).unwrap_or_else(|_| chrono::Duration::seconds(90));
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn keys(&self) -> &CoordinationKeys {
        &self.keys
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    fn ensure_positive(duration: Duration, name: &str) -> DispatchResult<()> {
        if duration.is_zero() {
            return Err(DispatchError::invalid_argument(format!("{name} 必须大于0")));
        }
        Ok(())
    }

    /// 尝试获取作业锁；被占用或后端故障时返回 `None`
    #[instrument(skip(self), fields(instance.id = %self.instance_id))]
    pub async fn try_acquire_lock(
        &self,
        job_key: &str,
        duration: Duration,
    ) -> DispatchResult<Option<DistributedJobLock>> {
        DispatchError::ensure_not_empty(job_key, "job_key")?;
        Self::ensure_positive(duration, "lock duration")?;

        let storage_key = self.keys.lock(job_key);
        let lock_id = format!("{}:{}", self.instance_id, Uuid::new_v4());

        match self
            .backend
            .set_if_absent(&storage_key, &lock_id, duration)
            .await
        {
            Ok(true) => {
                StructuredLogger::log_lock_acquired(job_key, &lock_id, duration);
                Ok(Some(DistributedJobLock::new(
                    self.backend.clone(),
                    storage_key,
                    job_key,
                    lock_id,
                    duration,
                )))
            }
            Ok(false) => {
                debug!(job_key, "作业锁已被其他持有者占用");
                Ok(None)
            }
            Err(e) => {
                warn!(job_key, error = %e, "获取作业锁时后端出错");
                Ok(None)
            }
        }
    }

    /// 尝试获取领导权；已有领导者或后端故障时返回 `None`
    #[instrument(skip(self), fields(instance.id = %self.instance_id))]
    pub async fn try_acquire_leadership(
        &self,
        leader_key: &str,
        duration: Duration,
    ) -> DispatchResult<Option<LeadershipToken>> {
        DispatchError::ensure_not_empty(leader_key, "leader_key")?;
        Self::ensure_positive(duration, "lease duration")?;

        let storage_key = self.keys.leader(leader_key);
        match self
            .backend
            .set_if_absent(&storage_key, &self.instance_id, duration)
            .await
        {
            Ok(true) => {
                StructuredLogger::log_leadership_changed(leader_key, &self.instance_id, true);
                Ok(Some(LeadershipToken::new(
                    self.backend.clone(),
                    storage_key,
                    leader_key,
                    self.instance_id.clone(),
                    duration,
                )))
            }
            Ok(false) => Ok(None),
            Err(e) => {
                warn!(leader_key, error = %e, "获取领导权时后端出错");
                Ok(None)
            }
        }
    }

    /// 当前领导者的实例ID
    pub async fn current_leader(&self, leader_key: &str) -> DispatchResult<Option<String>> {
        DispatchError::ensure_not_empty(leader_key, "leader_key")?;
        self.backend.get(&self.keys.leader(leader_key)).await
    }

    /// 写入实例描述并加入活跃实例集合
    pub async fn register_instance(&self, instance: &JobInstanceInfo) -> DispatchResult<()> {
        DispatchError::ensure_not_empty(&instance.instance_id, "instance_id")?;

        let descriptor = serde_json::to_string(instance)?;
        self.backend
            .set(
                &self.keys.instance(&instance.instance_id),
                &descriptor,
                Some(self.instance_ttl),
            )
            .await?;
        self.backend
            .set_add(&self.keys.instances(), &instance.instance_id)
            .await?;

        StructuredLogger::log_instance_registered(
            &instance.instance_id,
            &instance.host_name,
            instance.capabilities.max_concurrent_jobs,
        );
        Ok(())
    }

    pub async fn unregister_instance(&self, instance_id: &str) -> DispatchResult<()> {
        DispatchError::ensure_not_empty(instance_id, "instance_id")?;

        self.backend.delete(&self.keys.instance(instance_id)).await?;
        self.backend
            .set_remove(&self.keys.instances(), instance_id)
            .await?;
        self.backend.delete(&self.keys.assigned(instance_id)).await?;
        debug!(instance_id, "实例已注销");
        Ok(())
    }

    /// 刷新心跳并重新写入描述（TTL随之续期）
    pub async fn heartbeat(
        &self,
        instance: &mut JobInstanceInfo,
        active_job_count: u32,
    ) -> DispatchResult<()> {
        instance.touch_heartbeat(active_job_count);
        self.register_instance(instance).await
    }

    pub async fn get_instance(&self, instance_id: &str) -> DispatchResult<Option<JobInstanceInfo>> {
        DispatchError::ensure_not_empty(instance_id, "instance_id")?;
        match self.backend.get(&self.keys.instance(instance_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// 健康实例列表，顺带从集合中清理描述已过期、无法解析或心跳陈旧的实例
    pub async fn get_active_instances(&self) -> DispatchResult<Vec<JobInstanceInfo>> {
        let members = self.backend.set_members(&self.keys.instances()).await?;
        let mut healthy = Vec::with_capacity(members.len());

        for instance_id in members {
            let raw = self.backend.get(&self.keys.instance(&instance_id)).await?;
            let parsed = raw.map(|raw| serde_json::from_str::<JobInstanceInfo>(&raw));

            match parsed {
                Some(Ok(instance)) if instance.is_healthy(self.staleness) => healthy.push(instance),
                Some(Ok(_)) => {
                    debug!(instance_id, "实例心跳陈旧，移出活跃集合");
                    self.prune_instance(&instance_id).await;
                }
                Some(Err(e)) => {
                    warn!(instance_id, error = %e, "实例描述无法解析，移出活跃集合");
                    self.prune_instance(&instance_id).await;
                }
                None => {
                    debug!(instance_id, "实例描述已过期，移出活跃集合");
                    self.prune_instance(&instance_id).await;
                }
            }
        }
        Ok(healthy)
    }

    async fn prune_instance(&self, instance_id: &str) {
        if let Err(e) = self
            .backend
            .set_remove(&self.keys.instances(), instance_id)
            .await
        {
            warn!(instance_id, error = %e, "清理实例失败");
        }
    }

    /// 分配给该实例且分配记录仍指向它的作业数；已完成、过期或被改派的作业顺带清理
    pub async fn outstanding_jobs(&self, instance_id: &str) -> DispatchResult<u32> {
        DispatchError::ensure_not_empty(instance_id, "instance_id")?;

        let assigned_key = self.keys.assigned(instance_id);
        let mut outstanding = 0;
        for job_key in self.backend.set_members(&assigned_key).await? {
            match self.get_assignment(&job_key).await {
                Ok(Some(assignment)) if assignment.instance_id == instance_id => outstanding += 1,
                _ => {
                    debug!(instance_id, job_key = %job_key, "分配记录已失效，移出实例作业集合");
                    self.backend.set_remove(&assigned_key, &job_key).await?;
                }
            }
        }
        Ok(outstanding)
    }

    /// 按分配策略选出实例并记录分配；没有合适实例时返回 `None`
    ///
    /// 实例负载取心跳上报的活跃作业数与未完成分配数中的较大者，
    /// 因此两次心跳之间的连续分配也会分散到各实例。
    #[instrument(skip(self, payload))]
    pub async fn distribute_job(
        &self,
        job_key: &str,
        job_type: &str,
        payload: Option<serde_json::Value>,
    ) -> DispatchResult<Option<String>> {
        DispatchError::ensure_not_empty(job_key, "job_key")?;

        let mut instances = self.get_active_instances().await?;
        if instances.is_empty() {
            debug!(job_key, "没有已注册的活跃实例");
            return Ok(None);
        }
        for instance in instances.iter_mut() {
            let outstanding = self.outstanding_jobs(&instance.instance_id).await?;
            instance.active_job_count = instance.active_job_count.max(outstanding);
        }

        let Some(instance_id) = self.strategy.select_instance(job_type, &instances).await? else {
            return Ok(None);
        };

        if let Some(previous) = self.get_assignment(job_key).await? {
            if previous.instance_id != instance_id {
                self.backend
                    .set_remove(&self.keys.assigned(&previous.instance_id), job_key)
                    .await?;
            }
        }

        let assignment = JobAssignment {
            job_key: job_key.to_string(),
            job_type: job_type.to_string(),
            instance_id: instance_id.clone(),
            payload,
            assigned_at: Utc::now(),
        };
        self.backend
            .set(
                &self.keys.assignment(job_key),
                &serde_json::to_string(&assignment)?,
                Some(RECORD_RETENTION),
            )
            .await?;
        self.backend
            .set_add(&self.keys.assigned(&instance_id), job_key)
            .await?;

        StructuredLogger::log_job_distributed(job_key, job_type, &instance_id, self.strategy.name());
        Ok(Some(instance_id))
    }

    pub async fn get_assignment(&self, job_key: &str) -> DispatchResult<Option<JobAssignment>> {
        DispatchError::ensure_not_empty(job_key, "job_key")?;
        match self.backend.get(&self.keys.assignment(job_key)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// 记录作业结果并清除分配记录
    pub async fn report_job_completion(
        &self,
        job_key: &str,
        instance_id: &str,
        success: bool,
        error: Option<&str>,
    ) -> DispatchResult<()> {
        DispatchError::ensure_not_empty(job_key, "job_key")?;
        DispatchError::ensure_not_empty(instance_id, "instance_id")?;

        let record = JobCompletionRecord {
            job_key: job_key.to_string(),
            instance_id: instance_id.to_string(),
            success,
            error: error.map(str::to_string),
            completed_at: Utc::now(),
        };
        self.backend
            .set(
                &self.keys.completion(job_key),
                &serde_json::to_string(&record)?,
                Some(RECORD_RETENTION),
            )
            .await?;
        if let Some(assignment) = self.get_assignment(job_key).await? {
            if assignment.instance_id != instance_id {
                self.backend
                    .set_remove(&self.keys.assigned(&assignment.instance_id), job_key)
                    .await?;
            }
        }
        self.backend
            .set_remove(&self.keys.assigned(instance_id), job_key)
            .await?;
        self.backend.delete(&self.keys.assignment(job_key)).await?;

        if success {
            debug!(job_key, instance_id, "作业完成");
        } else {
            warn!(job_key, instance_id, error = error.unwrap_or("未知错误"), "作业失败");
        }
        Ok(())
    }

    pub async fn get_completion(
        &self,
        job_key: &str,
    ) -> DispatchResult<Option<JobCompletionRecord>> {
        DispatchError::ensure_not_empty(job_key, "job_key")?;
        match self.backend.get(&self.keys.completion(job_key)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
