use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use sentinel_lite::identity::{IdentityContext, Owner, UserId};
use sentinel_lite::scheduler::{
    ExecutionStatus, HistoryQuery, JobDescriptor, JobQueue, NewJob, TenantQueue,
};
use sentinel_lite::worker::{run_worker, JobRunner, NoopRunner, RunOutcome};

/// Records the order jobs were run in and fails any job tagged `fail`.
#[derive(Default)]
struct RecordingRunner {
    seen: Mutex<Vec<i64>>,
}

#[async_trait]
impl JobRunner for RecordingRunner {
    async fn run(&self, job: &JobDescriptor) -> RunOutcome {
        self.seen.lock().push(job.priority);
        let status = if job.payload.get("fail").is_some() {
            ExecutionStatus::error("requested failure")
        } else {
            ExecutionStatus::success()
        };
        RunOutcome {
            outputs: json!({ "priority": job.priority }),
            status,
        }
    }
}

async fn wait_for_history(queue: &TenantQueue, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while queue.history_len() < expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {expected} history entries"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_worker_files_results_under_job_owner() {
    let ctx = IdentityContext::new(true);
    let alice = ctx.set_current_user(Some(UserId::new("alice").unwrap()), false);
    let bob = ctx.set_current_user(Some(UserId::new("bob").unwrap()), false);
    let queue = TenantQueue::shared(100);

    let a = queue.put(&alice, NewJob::new(1, json!({ "x": 1 }))).unwrap();
    let b = queue.put(&bob, NewJob::new(2, json!({ "x": 2 }))).unwrap();

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(run_worker(
        queue.clone(),
        Arc::new(NoopRunner),
        Duration::from_millis(20),
        shutdown.clone(),
    ));

    wait_for_history(&queue, 2).await;
    shutdown.cancel();
    worker.await.unwrap();

    let alice_history = queue.history(&alice, &HistoryQuery::default());
    assert_eq!(alice_history.len(), 1);
    let entry = &alice_history[&a.id];
    assert_eq!(entry.owner, Owner::User(UserId::new("alice").unwrap()));
    assert_eq!(entry.outputs["payload"]["x"], 1);

    let bob_history = queue.history(&bob, &HistoryQuery::default());
    assert_eq!(bob_history.len(), 1);
    assert!(bob_history.contains_key(&b.id));
    assert_eq!(queue.running_len(), 0);
}

#[tokio::test]
async fn test_worker_runs_jobs_in_global_order() {
    let ctx = IdentityContext::new(true);
    let alice = ctx.set_current_user(Some(UserId::new("alice").unwrap()), false);
    let bob = ctx.set_current_user(Some(UserId::new("bob").unwrap()), false);
    let queue = TenantQueue::shared(100);

    for (caller, priority) in [(&alice, 5), (&bob, 3), (&alice, 9), (&bob, 1)] {
        queue.put(caller, NewJob::new(priority, json!({}))).unwrap();
    }
    queue.put(&alice, NewJob::new(7, json!({ "fail": true }))).unwrap();

    let runner = Arc::new(RecordingRunner::default());
    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(run_worker(
        queue.clone(),
        runner.clone(),
        Duration::from_millis(20),
        shutdown.clone(),
    ));

    wait_for_history(&queue, 5).await;
    shutdown.cancel();
    worker.await.unwrap();

    assert_eq!(*runner.seen.lock(), vec![1, 3, 5, 7, 9]);

    let failed: Vec<_> = queue
        .history(&alice, &HistoryQuery::default())
        .into_values()
        .filter(|e| e.status.as_ref().is_some_and(|s| !s.completed))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job.priority, 7);
}

#[tokio::test]
async fn test_worker_stops_on_shutdown_with_empty_queue() {
    let queue = TenantQueue::shared(10);
    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(run_worker(
        queue.clone(),
        Arc::new(NoopRunner),
        Duration::from_millis(20),
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker did not stop")
        .unwrap();
    assert_eq!(queue.stats().executions, 0);
}
