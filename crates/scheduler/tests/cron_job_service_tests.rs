use chrono::{Duration as ChronoDuration, Utc};
use dispatch_config::CronJobConfig;
use dispatch_coordination::{CoordinationKeys, DistributedJobCoordinator};
use dispatch_domain::{CoordinationBackend, CronJobStore, MissedExecutionBehavior};
use dispatch_errors::DispatchError;
use dispatch_infrastructure::{InMemoryCronJobStore, JsonMessageSerializer, MemoryCoordinationBackend};
use dispatch_scheduler::CronJobService;
use dispatch_testing_utils::{CronJobBuilder, RecordingDispatcher};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct Ping {
    #[serde(default)]
    source: Option<String>,
}

const YEARLY: &str = "0 0 0 1 1 *";
const EVERY_SECOND: &str = "* * * * * *";

fn config() -> CronJobConfig {
    CronJobConfig {
        max_missed_executions: 3,
        retry_delay_seconds: 0,
        ..Default::default()
    }
}

fn service(
    store: Arc<InMemoryCronJobStore>,
    dispatcher: Arc<RecordingDispatcher>,
) -> CronJobService {
    CronJobService::new(
        store,
        Arc::new(JsonMessageSerializer::new().register::<Ping>()),
        dispatcher,
        config(),
    )
}

#[tokio::test]
async fn test_add_job_computes_next_execution() {
    let store = Arc::new(InMemoryCronJobStore::new());
    let service = service(store.clone(), Arc::new(RecordingDispatcher::new()));

    let mut job = CronJobBuilder::new("job-1").with_cron("*/5 * * * *").build();
    job.next_execution_utc = None;
    let added = service.add_job(job).await.unwrap();

    let next = added.next_execution_utc.unwrap();
    assert!(next > Utc::now());
    assert!(store.get_job("job-1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_add_job_rejects_invalid_cron_and_duplicates() {
    let store = Arc::new(InMemoryCronJobStore::new());
    let service = service(store, Arc::new(RecordingDispatcher::new()));

    let err = service
        .add_job(CronJobBuilder::new("bad").with_cron("every tuesday").build())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidCron { .. }));

    service.add_job(CronJobBuilder::new("job-1").build()).await.unwrap();
    let err = service
        .add_job(CronJobBuilder::new("job-1").build())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_due_job_runs_and_updates_statistics() {
    let store = Arc::new(InMemoryCronJobStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let service = service(store.clone(), dispatcher.clone());
    store
        .add_job(
            CronJobBuilder::new("job-1")
                .with_cron(YEARLY)
                .with_message("Ping", serde_json::json!({"source": "cron"}))
                .due_in(ChronoDuration::minutes(-1))
                .build(),
        )
        .await
        .unwrap();
    store
        .add_job(
            CronJobBuilder::new("later")
                .due_in(ChronoDuration::hours(1))
                .build(),
        )
        .await
        .unwrap();

    let summary = service.process_due_jobs(Utc::now()).await.unwrap();

    assert_eq!(summary.due, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(dispatcher.count(), 1);
    let context = &dispatcher.dispatched()[0].context;
    assert_eq!(context.source.as_deref(), Some("cron"));

    let job = store.get_job("job-1").await.unwrap().unwrap();
    assert_eq!(job.run_count, 1);
    assert_eq!(job.failure_count, 0);
    assert!(job.next_execution_utc.unwrap() > Utc::now());
}

#[tokio::test]
async fn test_handler_failure_propagates_from_execute_job() {
    let store = Arc::new(InMemoryCronJobStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new().fail_type("Ping"));
    let service = service(store.clone(), dispatcher);
    let job = CronJobBuilder::new("job-1").with_cron(YEARLY).build();

    let err = service.execute_job(&job).await.unwrap_err();
    assert!(matches!(err, DispatchError::HandlerFailed { .. }));
}

#[tokio::test]
async fn test_failed_run_records_error_without_stopping_the_loop() {
    let store = Arc::new(InMemoryCronJobStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new().fail_type("Ping"));
    let service = service(store.clone(), dispatcher);
    store
        .add_job(
            CronJobBuilder::new("job-1")
                .with_cron(YEARLY)
                .due_in(ChronoDuration::minutes(-1))
                .build(),
        )
        .await
        .unwrap();

    let summary = service.process_due_jobs(Utc::now()).await.unwrap();
    assert_eq!(summary.failed, 1);

    let job = store.get_job("job-1").await.unwrap().unwrap();
    assert_eq!(job.run_count, 1);
    assert_eq!(job.failure_count, 1);
    assert!(job.last_error.is_some());
    assert!(job.next_execution_utc.unwrap() > Utc::now());
}

#[tokio::test]
async fn test_unknown_message_type_is_an_error() {
    let service = service(
        Arc::new(InMemoryCronJobStore::new()),
        Arc::new(RecordingDispatcher::new()),
    );
    let job = CronJobBuilder::new("job-1")
        .with_message("Unregistered", serde_json::json!({}))
        .build();
    let err = service.execute_job(&job).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_retry_on_failure() {
    let dispatcher = Arc::new(RecordingDispatcher::new().fail_next(2));
    let service = service(Arc::new(InMemoryCronJobStore::new()), dispatcher.clone());

    let job = CronJobBuilder::new("job-1").with_retry(2).build();
    assert!(service.execute_job(&job).await.is_ok());
    assert_eq!(dispatcher.count(), 3);
    assert_eq!(dispatcher.dispatched()[2].context.delivery_count, 3);

    let no_retry = Arc::new(RecordingDispatcher::new().fail_next(1));
    let service = self::service(Arc::new(InMemoryCronJobStore::new()), no_retry.clone());
    assert!(service
        .execute_job(&CronJobBuilder::new("job-2").build())
        .await
        .is_err());
    assert_eq!(no_retry.count(), 1);
}

async fn run_missed(behavior: MissedExecutionBehavior) -> (usize, dispatch_domain::RecurringCronJob) {
    let store = Arc::new(InMemoryCronJobStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let service = service(store.clone(), dispatcher.clone());
    store
        .add_job(
            CronJobBuilder::new("job-1")
                .with_cron(EVERY_SECOND)
                .due_in(ChronoDuration::minutes(-5))
                .with_missed_behavior(behavior)
                .build(),
        )
        .await
        .unwrap();

    service.process_due_jobs(Utc::now()).await.unwrap();
    (
        dispatcher.count(),
        store.get_job("job-1").await.unwrap().unwrap(),
    )
}

#[tokio::test]
async fn test_missed_skip_runs_nothing_and_advances() {
    let (dispatched, job) = run_missed(MissedExecutionBehavior::SkipMissed).await;
    assert_eq!(dispatched, 0);
    assert!(job.enabled);
    assert!(job.next_execution_utc.unwrap() > Utc::now() - ChronoDuration::seconds(2));
}

#[tokio::test]
async fn test_missed_execute_latest_runs_once() {
    let (dispatched, job) = run_missed(MissedExecutionBehavior::ExecuteLatestMissed).await;
    assert_eq!(dispatched, 1);
    assert_eq!(job.run_count, 1);
}

#[tokio::test]
async fn test_missed_execute_all_is_capped() {
    let (dispatched, job) = run_missed(MissedExecutionBehavior::ExecuteAllMissed).await;
    assert_eq!(dispatched, 3);
    assert_eq!(job.run_count, 3);
}

#[tokio::test]
async fn test_missed_disable_schedule() {
    let (dispatched, job) = run_missed(MissedExecutionBehavior::DisableSchedule).await;
    assert_eq!(dispatched, 0);
    assert!(!job.enabled);
}

#[tokio::test]
async fn test_job_past_end_date_is_disabled_after_run() {
    let store = Arc::new(InMemoryCronJobStore::new());
    let service = service(store.clone(), Arc::new(RecordingDispatcher::new()));
    let now = Utc::now();
    store
        .add_job(
            CronJobBuilder::new("job-1")
                .with_cron(YEARLY)
                .due_in(ChronoDuration::minutes(-1))
                .with_window(None, Some(now + ChronoDuration::hours(1)))
                .build(),
        )
        .await
        .unwrap();

    let summary = service.process_due_jobs(now).await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert!(!store.get_job("job-1").await.unwrap().unwrap().enabled);
}

#[tokio::test]
async fn test_locked_job_is_skipped_and_lock_released_after_run() {
    let backend: Arc<dyn CoordinationBackend> = Arc::new(MemoryCoordinationBackend::new());
    let keys = CoordinationKeys::new("test");
    let ours = Arc::new(DistributedJobCoordinator::new(backend.clone(), keys.clone(), "ours"));
    let theirs = DistributedJobCoordinator::new(backend.clone(), keys, "theirs");

    let store = Arc::new(InMemoryCronJobStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let service = service(store.clone(), dispatcher.clone()).with_coordinator(ours);
    store
        .add_job(
            CronJobBuilder::new("job-1")
                .with_cron(YEARLY)
                .due_in(ChronoDuration::minutes(-1))
                .build(),
        )
        .await
        .unwrap();

    let held = theirs
        .try_acquire_lock("cron:job-1", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    let summary = service.process_due_jobs(Utc::now()).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(dispatcher.count(), 0);

    held.release().await.unwrap();
    let summary = service.process_due_jobs(Utc::now()).await.unwrap();
    assert_eq!(summary.succeeded, 1);

    assert!(theirs
        .try_acquire_lock("cron:job-1", Duration::from_secs(30))
        .await
        .unwrap()
        .is_some());
}
