//! Instance, assignment and completion records shared with the coordination backend.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 作业实例状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum InstanceStatus {
    Active,
    Draining,
    Inactive,
    Failed,
}

/// 实例能力描述
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobInstanceCapabilities {
    pub max_concurrent_jobs: u32,
    /// `"*"` 匹配任意作业类型，其余按大小写敏感的精确匹配
    pub supported_job_types: Vec<String>,
    pub priority: i32,
    pub tags: Vec<String>,
}

impl JobInstanceCapabilities {
    pub fn new<I, S>(max_concurrent_jobs: u32, supported_job_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            max_concurrent_jobs,
            supported_job_types: supported_job_types.into_iter().map(Into::into).collect(),
            priority: 0,
            tags: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn supports_job_type(&self, job_type: &str) -> bool {
        self.supported_job_types
            .iter()
            .any(|supported| supported == "*" || supported == job_type)
    }
}

impl Default for JobInstanceCapabilities {
    fn default() -> Self {
        Self::new(10, ["*"])
    }
}

/// 集群中的作业实例
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobInstanceInfo {
    pub instance_id: String,
    pub host_name: String,
    pub capabilities: JobInstanceCapabilities,
    pub status: InstanceStatus,
    pub active_job_count: u32,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

impl JobInstanceInfo {
    pub fn new<I: Into<String>, H: Into<String>>(
        instance_id: I,
        host_name: H,
        capabilities: JobInstanceCapabilities,
    ) -> Self {
        let now = Utc::now();
        Self {
            instance_id: instance_id.into(),
            host_name: host_name.into(),
            capabilities,
            status: InstanceStatus::Active,
            active_job_count: 0,
            last_heartbeat: now,
            registered_at: now,
        }
    }

    /// 实例健康：状态为 Active 且心跳未超过 `staleness`
    pub fn is_healthy(&self, staleness: Duration) -> bool {
        self.status == InstanceStatus::Active && Utc::now() - self.last_heartbeat < staleness
    }

    pub fn has_capacity(&self) -> bool {
        self.active_job_count < self.capabilities.max_concurrent_jobs
    }

    /// 能否接收指定类型的作业
    pub fn can_accept_job(&self, job_type: &str) -> bool {
        self.status == InstanceStatus::Active
            && self.has_capacity()
            && self.capabilities.supports_job_type(job_type)
    }

    pub fn load_percentage(&self) -> f64 {
        if self.capabilities.max_concurrent_jobs == 0 {
            100.0
        } else {
            (self.active_job_count as f64 / self.capabilities.max_concurrent_jobs as f64) * 100.0
        }
    }

    pub fn touch_heartbeat(&mut self, active_job_count: u32) {
        self.active_job_count = active_job_count;
        self.last_heartbeat = Utc::now();
    }
}

/// 作业分配记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobAssignment {
    pub job_key: String,
    pub job_type: String,
    pub instance_id: String,
    pub payload: Option<serde_json::Value>,
    pub assigned_at: DateTime<Utc>,
}

/// 作业完成记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobCompletionRecord {
    pub job_key: String,
    pub instance_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_wildcard_matches_anything() {
        let caps = JobInstanceCapabilities::new(5, ["*"]);
        assert!(caps.supports_job_type("ReportJob"));
        assert!(caps.supports_job_type(""));
    }

    #[test]
    fn test_capability_match_is_case_sensitive() {
        let caps = JobInstanceCapabilities::new(5, ["ReportJob", "EmailJob"]);
        assert!(caps.supports_job_type("ReportJob"));
        assert!(!caps.supports_job_type("reportjob"));
        assert!(!caps.supports_job_type("CleanupJob"));
    }

    #[test]
    fn test_is_healthy() {
        let mut instance = JobInstanceInfo::new("i-1", "host-a", JobInstanceCapabilities::default());
        assert!(instance.is_healthy(Duration::seconds(30)));

        instance.last_heartbeat = Utc::now() - Duration::seconds(60);
        assert!(!instance.is_healthy(Duration::seconds(30)));

        instance.last_heartbeat = Utc::now();
        instance.status = InstanceStatus::Draining;
        assert!(!instance.is_healthy(Duration::seconds(30)));
    }

    #[test]
    fn test_can_accept_job_respects_capacity() {
        let mut instance =
            JobInstanceInfo::new("i-1", "host-a", JobInstanceCapabilities::new(2, ["ReportJob"]));
        assert!(instance.can_accept_job("ReportJob"));
        instance.touch_heartbeat(2);
        assert!(!instance.can_accept_job("ReportJob"));
        assert_eq!(instance.load_percentage(), 100.0);
    }
}
