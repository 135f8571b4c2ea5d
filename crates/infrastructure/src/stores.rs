//! In-memory implementations of the schedule and cron job stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_domain::{CronJobStore, RecurringCronJob, ScheduleStore, ScheduledMessage};
use dispatch_errors::{DispatchError, DispatchResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    schedules: RwLock<HashMap<String, ScheduledMessage>>,
    disposed: AtomicBool,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.schedules.read().await.len()
    }

    pub async fn get(&self, id: &str) -> Option<ScheduledMessage> {
        self.schedules.read().await.get(id).cloned()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn get_all(&self) -> DispatchResult<Vec<ScheduledMessage>> {
        let mut all: Vec<ScheduledMessage> = self.schedules.read().await.values().cloned().collect();
        all.sort_by_key(|s| s.next_execution_utc);
        Ok(all)
    }

    async fn store(&self, message: ScheduledMessage) -> DispatchResult<()> {
        DispatchError::ensure_not_empty(&message.id, "schedule id")?;
        self.schedules
            .write()
            .await
            .insert(message.id.clone(), message);
        Ok(())
    }

    async fn complete(&self, id: &str) -> DispatchResult<()> {
        self.schedules.write().await.remove(id);
        Ok(())
    }

    async fn dispose(&self) -> DispatchResult<()> {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!("Schedule store disposed");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCronJobStore {
    jobs: RwLock<HashMap<String, RecurringCronJob>>,
}

impl InMemoryCronJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Higher priority first, then earliest next execution.
fn sort_jobs(jobs: &mut [RecurringCronJob]) {
    jobs.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.next_execution_utc.cmp(&b.next_execution_utc))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait]
impl CronJobStore for InMemoryCronJobStore {
    async fn add_job(&self, job: RecurringCronJob) -> DispatchResult<()> {
        job.validate()?;
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(DispatchError::invalid_operation(format!(
                "Cron job '{}' already exists",
                job.id
            )));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, id: &str) -> DispatchResult<Option<RecurringCronJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn update_job(&self, job: RecurringCronJob) -> DispatchResult<()> {
        job.validate()?;
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job;
                Ok(())
            }
            None => Err(DispatchError::job_not_found(job.id)),
        }
    }

    async fn remove_job(&self, id: &str) -> DispatchResult<bool> {
        Ok(self.jobs.write().await.remove(id).is_some())
    }

    async fn get_all_jobs(&self) -> DispatchResult<Vec<RecurringCronJob>> {
        let mut jobs: Vec<RecurringCronJob> = self.jobs.read().await.values().cloned().collect();
        sort_jobs(&mut jobs);
        Ok(jobs)
    }

    async fn get_due_jobs(&self, now: DateTime<Utc>) -> DispatchResult<Vec<RecurringCronJob>> {
        let mut due: Vec<RecurringCronJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.is_due(now))
            .cloned()
            .collect();
        sort_jobs(&mut due);
        Ok(due)
    }

    async fn get_jobs_by_tag(&self, tag: &str) -> DispatchResult<Vec<RecurringCronJob>> {
        let mut tagged: Vec<RecurringCronJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.has_tag(tag))
            .cloned()
            .collect();
        sort_jobs(&mut tagged);
        Ok(tagged)
    }

    async fn set_job_enabled(&self, id: &str, enabled: bool) -> DispatchResult<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(job) => {
                job.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
