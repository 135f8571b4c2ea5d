//! Job distribution strategies.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use dispatch_domain::JobInstanceInfo;
use dispatch_errors::DispatchResult;

/// 作业分配策略
#[async_trait]
pub trait DistributionStrategy: Send + Sync {
    /// 从健康实例中选出一个，`None` 表示没有合适的实例
    async fn select_instance(
        &self,
        job_type: &str,
        instances: &[JobInstanceInfo],
    ) -> DispatchResult<Option<String>>;

    fn name(&self) -> &str;
}

/// 可接收该作业类型且仍有余量的实例
fn eligible<'a>(job_type: &str, instances: &'a [JobInstanceInfo]) -> Vec<&'a JobInstanceInfo> {
    instances
        .iter()
        .filter(|instance| instance.can_accept_job(job_type))
        .collect()
}

/// 负载低者优先，其次优先级高者，最后按实例ID
fn compare_load(a: &JobInstanceInfo, b: &JobInstanceInfo) -> CmpOrdering {
    a.load_percentage()
        .partial_cmp(&b.load_percentage())
        .unwrap_or(CmpOrdering::Equal)
        .then_with(|| b.capabilities.priority.cmp(&a.capabilities.priority))
        .then_with(|| a.instance_id.cmp(&b.instance_id))
}

pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributionStrategy for RoundRobinStrategy {
    async fn select_instance(
        &self,
        job_type: &str,
        instances: &[JobInstanceInfo],
    ) -> DispatchResult<Option<String>> {
        let mut suitable = eligible(job_type, instances);
        if suitable.is_empty() {
            debug!("没有支持作业类型 {} 的可用实例", job_type);
            return Ok(None);
        }
        suitable.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % suitable.len();
        let selected = suitable[index];
        debug!(
            "轮询策略选择实例: {} (索引: {}/{})",
            selected.instance_id,
            index,
            suitable.len()
        );
        Ok(Some(selected.instance_id.clone()))
    }

    fn name(&self) -> &str {
        "RoundRobin"
    }
}

/// 默认策略：负载最低的可用实例
#[derive(Debug, Default)]
pub struct LeastLoadedStrategy;

impl LeastLoadedStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DistributionStrategy for LeastLoadedStrategy {
    async fn select_instance(
        &self,
        job_type: &str,
        instances: &[JobInstanceInfo],
    ) -> DispatchResult<Option<String>> {
        let selected = eligible(job_type, instances)
            .into_iter()
            .min_by(|a, b| compare_load(a, b));

        match selected {
            Some(instance) => {
                debug!(
                    "负载均衡策略选择实例: {} (负载: {:.1}%)",
                    instance.instance_id,
                    instance.load_percentage()
                );
                Ok(Some(instance.instance_id.clone()))
            }
            None => {
                debug!("没有支持作业类型 {} 的可用实例", job_type);
                Ok(None)
            }
        }
    }

    fn name(&self) -> &str {
        "LeastLoaded"
    }
}

/// 优先选择显式声明该作业类型（而非通配符）的实例
#[derive(Debug, Default)]
pub struct CapabilityAffinityStrategy;

impl CapabilityAffinityStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DistributionStrategy for CapabilityAffinityStrategy {
    async fn select_instance(
        &self,
        job_type: &str,
        instances: &[JobInstanceInfo],
    ) -> DispatchResult<Option<String>> {
        let suitable = eligible(job_type, instances);
        if suitable.is_empty() {
            debug!("没有支持作业类型 {} 的可用实例", job_type);
            return Ok(None);
        }

        let specialized: Vec<&JobInstanceInfo> = suitable
            .iter()
            .filter(|instance| {
                instance
                    .capabilities
                    .supported_job_types
                    .iter()
                    .any(|t| t == job_type)
            })
            .copied()
            .collect();

        let targets = if specialized.is_empty() {
            suitable
        } else {
            debug!("找到显式支持作业类型 {} 的实例", job_type);
            specialized
        };

        Ok(targets
            .into_iter()
            .min_by(|a, b| compare_load(a, b))
            .map(|instance| instance.instance_id.clone()))
    }

    fn name(&self) -> &str {
        "CapabilityAffinity"
    }
}

/// 依次尝试各策略，返回第一个选择结果
pub struct CompositeStrategy {
    strategies: Vec<Arc<dyn DistributionStrategy>>,
}

impl CompositeStrategy {
    pub fn new(strategies: Vec<Arc<dyn DistributionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn add_strategy(&mut self, strategy: Arc<dyn DistributionStrategy>) {
        self.strategies.push(strategy);
    }
}

#[async_trait]
impl DistributionStrategy for CompositeStrategy {
    async fn select_instance(
        &self,
        job_type: &str,
        instances: &[JobInstanceInfo],
    ) -> DispatchResult<Option<String>> {
        for strategy in &self.strategies {
            match strategy.select_instance(job_type, instances).await? {
                Some(instance_id) => {
                    debug!(
                        "组合策略使用 {} 策略选择了实例: {}",
                        strategy.name(),
                        instance_id
                    );
                    return Ok(Some(instance_id));
                }
                None => {
                    debug!("策略 {} 未找到合适的实例，尝试下一个策略", strategy.name());
                }
            }
        }

        warn!("所有策略都未能找到合适的实例");
        Ok(None)
    }

    fn name(&self) -> &str {
        "Composite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_testing_utils::InstanceBuilder;

    fn cluster() -> Vec<JobInstanceInfo> {
        vec![
            InstanceBuilder::new("a")
                .with_capacity(10)
                .with_active_jobs(5)
                .build(),
            InstanceBuilder::new("b")
                .with_job_types(&["ReportJob"])
                .with_capacity(10)
                .with_active_jobs(8)
                .build(),
            InstanceBuilder::new("c")
                .with_job_types(&["EmailJob"])
                .with_capacity(10)
                .with_active_jobs(1)
                .build(),
        ]
    }

    #[tokio::test]
    async fn test_least_loaded_respects_capabilities() {
        let strategy = LeastLoadedStrategy::new();
        let instances = cluster();

        assert_eq!(
            strategy.select_instance("ReportJob", &instances).await.unwrap(),
            Some("a".to_string())
        );
        assert_eq!(
            strategy.select_instance("EmailJob", &instances).await.unwrap(),
            Some("c".to_string())
        );
    }

    #[tokio::test]
    async fn test_job_type_match_is_case_sensitive() {
        let strategy = LeastLoadedStrategy::new();
        let instances = vec![InstanceBuilder::new("c").with_job_types(&["EmailJob"]).build()];

        assert_eq!(strategy.select_instance("emailjob", &instances).await.unwrap(), None);
        assert!(strategy
            .select_instance("EmailJob", &instances)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_least_loaded_tie_breaks_on_priority_then_id() {
        let strategy = LeastLoadedStrategy::new();
        let instances = vec![
            InstanceBuilder::new("z").with_priority(5).build(),
            InstanceBuilder::new("y").with_priority(1).build(),
            InstanceBuilder::new("x").with_priority(5).build(),
        ];
        assert_eq!(
            strategy.select_instance("Any", &instances).await.unwrap(),
            Some("x".to_string())
        );
    }

    #[tokio::test]
    async fn test_full_instances_are_skipped() {
        let strategy = LeastLoadedStrategy::new();
        let instances = vec![InstanceBuilder::new("full")
            .with_capacity(2)
            .with_active_jobs(2)
            .build()];
        assert_eq!(strategy.select_instance("Any", &instances).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_round_robin_cycles() {
        let strategy = RoundRobinStrategy::new();
        let instances = vec![
            InstanceBuilder::new("b").build(),
            InstanceBuilder::new("a").build(),
        ];

        let mut picks = Vec::new();
        for _ in 0..4 {
            picks.push(strategy.select_instance("Any", &instances).await.unwrap().unwrap());
        }
        assert_eq!(picks, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_affinity_prefers_explicit_support() {
        let strategy = CapabilityAffinityStrategy::new();
        let instances = cluster();
        assert_eq!(
            strategy.select_instance("ReportJob", &instances).await.unwrap(),
            Some("b".to_string())
        );
        assert_eq!(
            strategy.select_instance("Other", &instances).await.unwrap(),
            Some("a".to_string())
        );
    }

    #[tokio::test]
    async fn test_composite_falls_through() {
        let composite = CompositeStrategy::new(vec![
            Arc::new(CapabilityAffinityStrategy::new()),
            Arc::new(RoundRobinStrategy::new()),
        ]);
        let instances = cluster();
        assert_eq!(
            composite.select_instance("EmailJob", &instances).await.unwrap(),
            Some("c".to_string())
        );
        assert_eq!(composite.select_instance("EmailJob", &[]).await.unwrap(), None);
    }
}
