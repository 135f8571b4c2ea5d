//! Test data builders with sensible defaults

use chrono::{DateTime, Duration, Utc};
use dispatch_domain::{
    InstanceStatus, JobInstanceCapabilities, JobInstanceInfo, MessageContext,
    MissedExecutionBehavior, RecurringCronJob, ScheduledMessage,
};

/// Builder for ScheduledMessage test data
pub struct ScheduledMessageBuilder {
    message: ScheduledMessage,
}

impl ScheduledMessageBuilder {
    /// 五分钟前到期的一次性消息，消息体为 `{}`
    pub fn new(id: &str, message_name: &str) -> Self {
        Self {
            message: ScheduledMessage::new(
                id,
                message_name,
                "{}",
                Utc::now() - Duration::minutes(5),
            ),
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.message.message_body = body.to_string();
        self
    }

    pub fn due_at(mut self, at: DateTime<Utc>) -> Self {
        self.message.next_execution_utc = at;
        self
    }

    pub fn due_in(self, offset: Duration) -> Self {
        self.due_at(Utc::now() + offset)
    }

    pub fn with_cron(mut self, expression: &str) -> Self {
        self.message.cron_expression = Some(expression.to_string());
        self
    }

    pub fn with_interval(mut self, interval: std::time::Duration) -> Self {
        self.message.interval = Some(interval);
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.message.message_version = version;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: &str) -> Self {
        self.message.correlation_id = Some(correlation_id.to_string());
        self
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.message.tenant_id = Some(tenant_id.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.message.enabled = false;
        self
    }

    pub fn with_missed_behavior(mut self, behavior: MissedExecutionBehavior) -> Self {
        self.message.missed_execution_behavior = behavior;
        self
    }

    pub fn build(self) -> ScheduledMessage {
        self.message
    }
}

/// Builder for RecurringCronJob test data
pub struct CronJobBuilder {
    job: RecurringCronJob,
}

impl CronJobBuilder {
    /// 每分钟执行，五分钟前到期
    pub fn new(id: &str) -> Self {
        Self {
            job: RecurringCronJob::new(id, format!("job {id}"), "0 * * * * *", "Ping", "{}")
                .with_next_execution(Utc::now() - Duration::minutes(5)),
        }
    }

    pub fn with_cron(mut self, expression: &str) -> Self {
        self.job.cron_expression = expression.to_string();
        self
    }

    pub fn with_message(mut self, type_name: &str, body: serde_json::Value) -> Self {
        self.job.message_type_name = type_name.to_string();
        self.job.message_body = body.to_string();
        self
    }

    pub fn due_at(mut self, at: DateTime<Utc>) -> Self {
        self.job.next_execution_utc = Some(at);
        self
    }

    pub fn due_in(self, offset: Duration) -> Self {
        self.due_at(Utc::now() + offset)
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.job.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_missed_behavior(mut self, behavior: MissedExecutionBehavior) -> Self {
        self.job.missed_execution_behavior = behavior;
        self
    }

    pub fn with_retry(mut self, attempts: u32) -> Self {
        self.job = self.job.with_retry(attempts);
        self
    }

    pub fn with_window(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.job.start_date = start;
        self.job.end_date = end;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.job.enabled = false;
        self
    }

    pub fn build(self) -> RecurringCronJob {
        self.job
    }
}

/// Builder for JobInstanceInfo test data
pub struct InstanceBuilder {
    instance: JobInstanceInfo,
}

impl InstanceBuilder {
    pub fn new(instance_id: &str) -> Self {
        Self {
            instance: JobInstanceInfo::new(
                instance_id,
                "test-host",
                JobInstanceCapabilities::default(),
            ),
        }
    }

    pub fn with_job_types(mut self, job_types: &[&str]) -> Self {
        self.instance.capabilities.supported_job_types =
            job_types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_capacity(mut self, max_concurrent_jobs: u32) -> Self {
        self.instance.capabilities.max_concurrent_jobs = max_concurrent_jobs;
        self
    }

    pub fn with_active_jobs(mut self, active_job_count: u32) -> Self {
        self.instance.active_job_count = active_job_count;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.instance.capabilities.priority = priority;
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.instance.status = status;
        self
    }

    pub fn with_last_heartbeat(mut self, at: DateTime<Utc>) -> Self {
        self.instance.last_heartbeat = at;
        self
    }

    pub fn build(self) -> JobInstanceInfo {
        self.instance
    }
}

/// Context with fixed correlation/tenant ids
pub fn test_context() -> MessageContext {
    MessageContext::builder()
        .correlation_id("corr-test")
        .tenant_id("tenant-test")
        .build()
}
