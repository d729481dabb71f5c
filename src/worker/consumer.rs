use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::scheduler::JobQueue;
use crate::worker::executor::JobRunner;

/// Drain the shared queue until `shutdown` is cancelled.
///
/// The blocking dequeue runs on the blocking pool with `poll` as its
/// timeout, so shutdown is noticed within one poll interval. Jobs are taken
/// in global order whoever owns them; results go back through
/// [`JobQueue::task_done`], which files them under the job's own owner.
pub async fn run_worker(
    queue: Arc<dyn JobQueue>,
    runner: Arc<dyn JobRunner>,
    poll: Duration,
    shutdown: CancellationToken,
) {
    tracing::info!(poll_ms = poll.as_millis() as u64, "Worker started");

    while !shutdown.is_cancelled() {
        let q = queue.clone();
        let next = match tokio::task::spawn_blocking(move || q.get(Some(poll))).await {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(error = %e, "Dequeue task failed");
                break;
            }
        };

        let Some((job, execution_id)) = next else {
            continue;
        };

        let outcome = runner.run(&job).await;
        if let Err(e) = queue.task_done(execution_id, outcome.outputs, Some(outcome.status)) {
            tracing::error!(job_id = %job.id, execution_id, error = %e, "Failed to record job result");
        }
    }

    tracing::info!("Worker stopped");
}
