use dispatch_domain::StepResult;
use dispatch_errors::{DispatchError, DispatchResult};
use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct ScheduledStep {
    name: String,
    handle: JoinHandle<DispatchResult<StepResult>>,
}

/// Append-only collection of saga steps running in the background.
///
/// Steps are spawned with [`schedule`](Self::schedule) and joined with
/// [`wait_for_scheduled_steps`](Self::wait_for_scheduled_steps). Clones share
/// the same collection.
#[derive(Clone, Default)]
pub struct ScheduledStepTracker {
    steps: Arc<Mutex<Vec<ScheduledStep>>>,
}

impl ScheduledStepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<S, F>(&self, name: S, step: F)
    where
        S: Into<String>,
        F: Future<Output = DispatchResult<StepResult>> + Send + 'static,
    {
        let name = name.into();
        debug!(step = %name, "Scheduling background saga step");
        let handle = tokio::spawn(step);
        self.lock().push(ScheduledStep { name, handle });
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Aborts every step not yet drained. Aborted steps surface as
    /// `DispatchError::Cancelled` from the next drain.
    pub fn cancel_all(&self) {
        for step in self.lock().iter() {
            step.handle.abort();
        }
    }

    /// Joins every scheduled step, including steps scheduled while draining.
    ///
    /// A step returning `Err` is reported as a failed `StepResult`. All steps
    /// are awaited before the first cancellation or panic is returned.
    pub async fn wait_for_scheduled_steps(&self) -> DispatchResult<Vec<(String, StepResult)>> {
        let mut results = Vec::new();
        let mut first_error: Option<DispatchError> = None;

        loop {
            let batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                break;
            }

            let (names, handles): (Vec<_>, Vec<_>) =
                batch.into_iter().map(|step| (step.name, step.handle)).unzip();
            let joined = join_all(handles).await;

            for (name, outcome) in names.into_iter().zip(joined) {
                match outcome {
                    Ok(Ok(result)) => results.push((name, result)),
                    Ok(Err(e)) => {
                        warn!(step = %name, error = %e, "Background saga step failed");
                        let result = StepResult::failure_with_error(
                            format!("Step '{name}' failed"),
                            &e,
                        );
                        results.push((name, result));
                    }
                    Err(join_error) => {
                        let error = DispatchError::from(join_error);
                        warn!(step = %name, error = %error, "Background saga step did not finish");
                        first_error.get_or_insert(error);
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(results),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ScheduledStep>> {
        self.steps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
