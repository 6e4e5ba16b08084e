use std::sync::Arc;

use tokio::sync::{Semaphore, oneshot};
use tokio::time::Instant;
use tracing::{Instrument, debug};

use titlebot_common::types::ChannelName;
use titlebot_titles::TitleFetcher;

use crate::alert::Alerter;
use crate::job::{FetchJob, FetchOutcome, run_fetch_job};

/// Bounded pool of fetch jobs for one channel.
///
/// Every submitted job gets its own task, but at most `max_workers` of them
/// run a fetch at any moment; the rest wait for a permit. Completion order is
/// unspecified.
pub struct WorkerPool {
    channel: ChannelName,
    permits: Arc<Semaphore>,
    max_workers: usize,
    fetcher: Arc<dyn TitleFetcher>,
    alerter: Alerter,
}

impl WorkerPool {
    pub fn new(
        channel: ChannelName,
        max_workers: usize,
        fetcher: Arc<dyn TitleFetcher>,
        alerter: Alerter,
    ) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            channel,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            fetcher,
            alerter,
        }
    }

    /// Start `job` in the background and return a handle to its outcome.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, job: FetchJob) -> ResultHandle {
        let (tx, rx) = oneshot::channel();
        let job = Arc::new(job);

        let span = tracing::debug_span!(
            "fetch_job",
            channel = %self.channel,
            job_id = %job.id,
        );
        let permits = Arc::clone(&self.permits);
        let fetcher = Arc::clone(&self.fetcher);
        let alerter = self.alerter.clone();
        let task_job = Arc::clone(&job);

        debug!(
            channel = %self.channel,
            job_id = %job.id,
            url = %job.url,
            idle_workers = self.idle_workers(),
            "Submitting fetch job"
        );

        tokio::spawn(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let outcome = run_fetch_job(&task_job, fetcher.as_ref(), &alerter).await;
                // The receiver is gone once the delivery stage has timed out
                // on this job; the late outcome is dropped.
                let _ = tx.send(outcome);
            }
            .instrument(span),
        );

        ResultHandle {
            job,
            submitted_at: Instant::now(),
            outcome: rx,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Number of jobs that could start a fetch right now.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }
}

/// The not-yet-known outcome of one submitted job.
///
/// Consumed exactly once by the channel's delivery consumer.
pub struct ResultHandle {
    job: Arc<FetchJob>,
    submitted_at: Instant,
    outcome: oneshot::Receiver<FetchOutcome>,
}

impl ResultHandle {
    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub(crate) fn into_parts(self) -> (Arc<FetchJob>, oneshot::Receiver<FetchOutcome>) {
        (self.job, self.outcome)
    }
}

impl std::fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandle")
            .field("job", &self.job)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}
