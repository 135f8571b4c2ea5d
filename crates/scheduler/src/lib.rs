pub mod cron_job_service;
pub mod cron_utils;
pub mod scheduled_message_service;

pub use cron_job_service::{CronJobService, CronRunSummary};
pub use cron_utils::CronScheduler;
pub use scheduled_message_service::{ScheduledMessageService, TickSummary};
