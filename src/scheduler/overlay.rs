use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use tokio::sync::watch;

use crate::error::{Result, SentinelError};
use crate::identity::Caller;
use crate::scheduler::history::HistoryQuery;
use crate::scheduler::job::{
    ExecutionStatus, HistoryEntry, JobDescriptor, JobId, NewJob, OwnedJob,
};
use crate::scheduler::queue::{QueueSnapshot, QueueState, QueueStats, RunningJob};

/// Queue interface used by request handlers and the background worker.
///
/// Nothing else may reach the pending heap, the running set or the history
/// directly; every implementation is responsible for its own locking.
pub trait JobQueue: Send + Sync {
    /// Stamp `job` with the caller's owner and queue it.
    ///
    /// Fails with [`SentinelError::DuplicateJob`] if the id is already
    /// pending or running, or belongs to another owner's history record.
    fn put(&self, caller: &Caller, job: NewJob) -> Result<JobDescriptor>;

    /// Take the globally next job. `None` once `timeout` has elapsed with
    /// nothing to do; `timeout = None` waits indefinitely.
    fn get(&self, timeout: Option<Duration>) -> Option<(JobDescriptor, u64)>;

    /// Move a running job into history.
    fn task_done(
        &self,
        execution_id: u64,
        outputs: Value,
        status: Option<ExecutionStatus>,
    ) -> Result<()>;

    /// Running and pending jobs owned by the caller.
    fn current_queue(&self, caller: &Caller) -> QueueSnapshot;

    /// Remove the first pending job owned by the caller for which
    /// `predicate` holds.
    fn delete_queue_item(
        &self,
        caller: &Caller,
        predicate: &dyn Fn(&JobDescriptor) -> bool,
    ) -> bool;

    /// Remove every pending job owned by the caller.
    fn wipe_queue(&self, caller: &Caller) -> usize;

    fn history(&self, caller: &Caller, query: &HistoryQuery) -> IndexMap<JobId, HistoryEntry>;

    fn wipe_history(&self, caller: &Caller) -> usize;

    fn delete_history_item(&self, caller: &Caller, id: &JobId) -> bool;

    /// Receives a new version number whenever queue state changes.
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// Unfiltered counters. Only for privileged internal views.
    fn stats(&self) -> QueueStats;
}

/// Owner-aware view over the single shared queue.
///
/// Scheduling stays global: jobs from every owner sit in one heap and
/// [`JobQueue::get`] always serves the overall head. Only reads and
/// destructive operations issued on behalf of a caller are narrowed to
/// that caller's owner.
#[derive(Debug)]
pub struct TenantQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    updates: watch::Sender<u64>,
}

impl TenantQueue {
    pub fn new(max_history_size: usize) -> Self {
        let (updates, _rx) = watch::channel(0);
        Self {
            state: Mutex::new(QueueState::new(max_history_size)),
            not_empty: Condvar::new(),
            updates,
        }
    }

    pub fn shared(max_history_size: usize) -> Arc<Self> {
        Arc::new(Self::new(max_history_size))
    }

    fn queue_updated(&self) {
        self.updates.send_modify(|version| *version += 1);
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.state.lock().running.len()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Every owner's running and pending jobs. Privileged internal view.
    pub fn global_snapshot(&self) -> QueueSnapshot {
        self.snapshot_matching(|_| true)
    }

    fn snapshot_matching<F>(&self, filter: F) -> QueueSnapshot
    where
        F: Fn(&OwnedJob) -> bool,
    {
        let state = self.state.lock();

        let mut running: Vec<RunningJob> = state
            .running
            .iter()
            .filter(|(_, job)| filter(job))
            .map(|(execution_id, job)| RunningJob {
                execution_id: *execution_id,
                job: job.job.clone(),
            })
            .collect();
        running.sort_by_key(|r| r.execution_id);

        let pending = state
            .pending
            .sorted_matching(&filter)
            .into_iter()
            .map(|job| job.job.clone())
            .collect();

        QueueSnapshot { running, pending }
    }
}

impl JobQueue for TenantQueue {
    fn put(&self, caller: &Caller, job: NewJob) -> Result<JobDescriptor> {
        let owner = caller.owner();
        let descriptor = {
            let mut state = self.state.lock();
            if !state.admits(&job.id, &owner) {
                tracing::warn!(job_id = %job.id, owner = %owner, "Rejected duplicate job id");
                return Err(SentinelError::DuplicateJob(job.id));
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            let descriptor = JobDescriptor::from_new(job, sequence);
            state.pending.push(OwnedJob {
                job: descriptor.clone(),
                owner: owner.clone(),
            });
            self.not_empty.notify_one();
            descriptor
        };
        tracing::debug!(
            job_id = %descriptor.id,
            owner = %owner,
            priority = descriptor.priority,
            sequence = descriptor.sequence,
            "Job queued"
        );
        self.queue_updated();
        Ok(descriptor)
    }

    fn get(&self, timeout: Option<Duration>) -> Option<(JobDescriptor, u64)> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while state.pending.is_empty() {
            match deadline {
                Some(deadline) => {
                    let result = self.not_empty.wait_until(&mut state, deadline);
                    if result.timed_out() && state.pending.is_empty() {
                        return None;
                    }
                }
                None => self.not_empty.wait(&mut state),
            }
        }

        let item = state.pending.pop()?;
        let execution_id = state.task_counter;
        // The running record is a separate copy from what we hand out.
        state.running.insert(execution_id, item.clone());
        state.task_counter += 1;
        drop(state);

        tracing::debug!(
            job_id = %item.job.id,
            owner = %item.owner,
            execution_id,
            "Job dequeued"
        );
        self.queue_updated();
        Some((item.job, execution_id))
    }

    fn task_done(
        &self,
        execution_id: u64,
        outputs: Value,
        status: Option<ExecutionStatus>,
    ) -> Result<()> {
        let (job_id, owner, evicted) = {
            let mut state = self.state.lock();
            let running = state
                .running
                .remove(&execution_id)
                .ok_or(SentinelError::JobNotRunning(execution_id))?;
            let job_id = running.job.id;
            let owner = running.owner.clone();
            let evicted = state.history.insert(HistoryEntry {
                job: running.job,
                outputs,
                status,
                owner: running.owner,
                completed_at: Utc::now(),
            });
            (job_id, owner, evicted)
        };

        for id in &evicted {
            tracing::debug!(job_id = %id, "History entry evicted");
        }
        tracing::info!(job_id = %job_id, owner = %owner, execution_id, "Job completed");
        self.queue_updated();
        Ok(())
    }

    fn current_queue(&self, caller: &Caller) -> QueueSnapshot {
        let owner = caller.owner();
        self.snapshot_matching(|job| job.owner == owner)
    }

    fn delete_queue_item(
        &self,
        caller: &Caller,
        predicate: &dyn Fn(&JobDescriptor) -> bool,
    ) -> bool {
        let owner = caller.owner();
        let removed = {
            let mut state = self.state.lock();
            state
                .pending
                .remove_first(|job| predicate(&job.job) && job.owner == owner)
        };
        match removed {
            Some(job) => {
                tracing::info!(job_id = %job.job.id, owner = %owner, "Pending job cancelled");
                self.queue_updated();
                true
            }
            None => false,
        }
    }

    fn wipe_queue(&self, caller: &Caller) -> usize {
        let owner = caller.owner();
        let removed = self.state.lock().pending.retain(|job| job.owner != owner);
        tracing::info!(owner = %owner, removed, "Pending queue wiped");
        self.queue_updated();
        removed
    }

    fn history(&self, caller: &Caller, query: &HistoryQuery) -> IndexMap<JobId, HistoryEntry> {
        let owner = caller.owner();
        self.state.lock().history.query(&owner, query)
    }

    fn wipe_history(&self, caller: &Caller) -> usize {
        let owner = caller.owner();
        let removed = self.state.lock().history.wipe(&owner);
        tracing::info!(owner = %owner, removed, "History wiped");
        self.queue_updated();
        removed
    }

    fn delete_history_item(&self, caller: &Caller, id: &JobId) -> bool {
        let owner = caller.owner();
        let removed = self.state.lock().history.remove(&owner, id);
        if removed {
            tracing::info!(job_id = %id, owner = %owner, "History entry deleted");
            self.queue_updated();
        }
        removed
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            pending: state.pending.len(),
            running: state.running.len(),
            history: state.history.len(),
            max_history: state.history.max_size(),
            executions: state.task_counter,
        }
    }
}
