use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::Serialize;

use crate::identity::Owner;
use crate::scheduler::history::History;
use crate::scheduler::job::{JobDescriptor, JobId, OwnedJob};

/// Heap slot ordered so the lowest `(priority, sequence)` sits on top.
#[derive(Debug, Clone)]
struct Pending(OwnedJob);

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.0.job.order_key() == other.0.job.order_key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.job.order_key().cmp(&self.0.job.order_key())
    }
}

/// Global min-heap of pending jobs from every owner.
#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<Pending>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: OwnedJob) {
        self.heap.push(Pending(job));
    }

    /// Remove the global head, whoever owns it.
    pub fn pop(&mut self) -> Option<OwnedJob> {
        self.heap.pop().map(|p| p.0)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Entries in internal heap order (not dequeue order).
    pub fn iter(&self) -> impl Iterator<Item = &OwnedJob> {
        self.heap.iter().map(|p| &p.0)
    }

    /// Entries matching `filter`, in the order they would be dequeued.
    pub fn sorted_matching<F>(&self, filter: F) -> Vec<&OwnedJob>
    where
        F: Fn(&OwnedJob) -> bool,
    {
        let mut out: Vec<&OwnedJob> = self.iter().filter(|j| filter(j)).collect();
        out.sort_by_key(|j| j.job.order_key());
        out
    }

    /// Remove the first entry (in heap storage order) matching `pred`.
    pub fn remove_first<F>(&mut self, pred: F) -> Option<OwnedJob>
    where
        F: Fn(&OwnedJob) -> bool,
    {
        let index = self.iter().position(|j| pred(j))?;
        if self.heap.len() == 1 {
            return self.heap.pop().map(|p| p.0);
        }
        let mut items = std::mem::take(&mut self.heap).into_vec();
        let removed = items.remove(index);
        self.heap = BinaryHeap::from(items);
        self.assert_heap_order();
        Some(removed.0)
    }

    /// Keep only entries matching `keep`. Returns the number removed.
    pub fn retain<F>(&mut self, keep: F) -> usize
    where
        F: Fn(&OwnedJob) -> bool,
    {
        let before = self.heap.len();
        self.heap.retain(|p| keep(&p.0));
        self.assert_heap_order();
        before - self.heap.len()
    }

    fn assert_heap_order(&self) {
        let slice = self.heap.as_slice();
        for child in 1..slice.len() {
            let parent = (child - 1) / 2;
            assert!(
                slice[parent] >= slice[child],
                "pending queue heap order broken at index {}",
                child
            );
        }
    }
}

/// Everything the queue lock protects, as one unit.
#[derive(Debug)]
pub struct QueueState {
    pub pending: PendingQueue,
    pub running: HashMap<u64, OwnedJob>,
    pub history: History,
    /// Next execution id handed out by a dequeue.
    pub task_counter: u64,
    /// Next tie-break sequence handed out by an enqueue.
    pub next_sequence: u64,
}

impl QueueState {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            pending: PendingQueue::new(),
            running: HashMap::new(),
            history: History::new(max_history_size),
            task_counter: 0,
            next_sequence: 0,
        }
    }

    /// Whether a job with `id` may be queued for `owner`.
    ///
    /// Ids are unique while a job is pending or running. A completed id
    /// may only be reused by the owner of its history record, so nobody
    /// can replace another owner's result.
    pub fn admits(&self, id: &JobId, owner: &Owner) -> bool {
        let live = self.pending.iter().any(|j| &j.job.id == id)
            || self.running.values().any(|j| &j.job.id == id);
        if live {
            return false;
        }
        self.history
            .owner_of(id)
            .map_or(true, |existing| existing == owner)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunningJob {
    pub execution_id: u64,
    pub job: JobDescriptor,
}

/// One caller's view of the queue, taken under a single lock acquisition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub running: Vec<RunningJob>,
    pub pending: Vec<JobDescriptor>,
}

impl QueueSnapshot {
    pub fn contains(&self, id: &uuid::Uuid) -> bool {
        self.running.iter().any(|r| &r.job.id == id) || self.pending.iter().any(|j| &j.id == id)
    }
}

/// Unfiltered counters for privileged views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub history: usize,
    pub max_history: usize,
    pub executions: u64,
}
