//! Structured logging
//!
//! `init_structured_logging` installs the global `tracing` subscriber; the
//! [`StructuredLogger`] helpers emit events with a stable `event` field so log
//! pipelines can filter on them.

use anyhow::Result;
use chrono::{DateTime, Utc};
use dispatch_config::{LogConfig, OutputFormat};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize structured logging. `RUST_LOG` overrides the configured level.
pub fn init_structured_logging(config: &LogConfig) -> Result<()> {
    let level = config.level.to_string();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        OutputFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_ids)
                .with_span_events(FmtSpan::CLOSE);

            registry.with(fmt_layer).try_init()?;
        }
        OutputFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_ids)
                .with_span_events(FmtSpan::CLOSE);

            registry.with(fmt_layer).try_init()?;
        }
        OutputFormat::Compact => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_ids)
                .with_span_events(FmtSpan::CLOSE);

            registry.with(fmt_layer).try_init()?;
        }
    }

    info!(
        logging.format = ?config.format,
        logging.level = %level,
        logging.location = config.include_location,
        "Structured logging initialized"
    );

    Ok(())
}

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_scheduled_message_dispatched(
        schedule_id: &str,
        message_name: &str,
        next_execution: Option<DateTime<Utc>>,
        duration: Duration,
    ) {
        info!(
            event = "scheduled_message_dispatched",
            schedule.id = schedule_id,
            message.name = message_name,
            schedule.next_execution = ?next_execution,
            duration_ms = duration.as_millis() as u64,
            "Scheduled message dispatched"
        );
    }

    pub fn log_scheduled_message_skipped(schedule_id: &str, message_name: &str, reason: &str) {
        warn!(
            event = "scheduled_message_skipped",
            schedule.id = schedule_id,
            message.name = message_name,
            reason,
            "Scheduled message skipped"
        );
    }

    pub fn log_scheduled_message_missed(schedule_id: &str, missed: usize, behavior: &str) {
        warn!(
            event = "scheduled_message_missed",
            schedule.id = schedule_id,
            schedule.missed = missed,
            schedule.missed_behavior = behavior,
            "Scheduled message missed executions"
        );
    }

    pub fn log_cron_job_executed(
        job_id: &str,
        job_name: &str,
        success: bool,
        duration: Duration,
        error_message: Option<&str>,
    ) {
        if success {
            info!(
                event = "cron_job_executed",
                job.id = job_id,
                job.name = job_name,
                job.success = success,
                duration_ms = duration.as_millis() as u64,
                "Cron job executed"
            );
        } else {
            error!(
                event = "cron_job_failed",
                job.id = job_id,
                job.name = job_name,
                job.success = success,
                duration_ms = duration.as_millis() as u64,
                job.error = error_message.unwrap_or("Unknown error"),
                "Cron job failed"
            );
        }
    }

    pub fn log_missed_executions(job_id: &str, missed: usize, behavior: &str) {
        warn!(
            event = "cron_job_missed_executions",
            job.id = job_id,
            job.missed = missed,
            job.missed_behavior = behavior,
            "Cron job missed executions"
        );
    }

    pub fn log_lock_acquired(job_key: &str, owner: &str, ttl: Duration) {
        info!(
            event = "lock_acquired",
            lock.key = job_key,
            lock.owner = owner,
            lock.ttl_ms = ttl.as_millis() as u64,
            "Distributed lock acquired"
        );
    }

    pub fn log_lock_released(job_key: &str, owner: &str) {
        info!(
            event = "lock_released",
            lock.key = job_key,
            lock.owner = owner,
            "Distributed lock released"
        );
    }

    pub fn log_leadership_changed(leader_key: &str, instance_id: &str, is_leader: bool) {
        if is_leader {
            info!(
                event = "leadership_acquired",
                leader.key = leader_key,
                instance.id = instance_id,
                "Leadership acquired"
            );
        } else {
            warn!(
                event = "leadership_lost",
                leader.key = leader_key,
                instance.id = instance_id,
                "Leadership lost"
            );
        }
    }

    pub fn log_instance_registered(instance_id: &str, host_name: &str, max_jobs: u32) {
        info!(
            event = "instance_registered",
            instance.id = instance_id,
            instance.host = host_name,
            instance.max_jobs = max_jobs,
            "Instance registered"
        );
    }

    pub fn log_job_distributed(job_key: &str, job_type: &str, instance_id: &str, strategy: &str) {
        info!(
            event = "job_distributed",
            job.key = job_key,
            job_type,
            instance.id = instance_id,
            strategy,
            "Job distributed"
        );
    }

    pub fn log_saga_completed(saga_id: &str, saga_type: &str, state: &str, duration: Duration) {
        info!(
            event = "saga_completed",
            saga.id = saga_id,
            saga_type,
            saga.state = state,
            duration_ms = duration.as_millis() as u64,
            "Saga finished"
        );
    }
}
