use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::identity::Owner;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Error,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Success => write!(f, "success"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

/// Final status of one execution, stored with its history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub status_str: JobStatus,
    pub completed: bool,
    pub messages: Vec<Value>,
}

impl ExecutionStatus {
    pub fn success() -> Self {
        Self {
            status_str: JobStatus::Success,
            completed: true,
            messages: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status_str: JobStatus::Error,
            completed: false,
            messages: vec![Value::String(message.into())],
        }
    }
}

/// A job as submitted, before the queue has stamped it.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub priority: i64,
    pub payload: Value,
    pub extra: Value,
    pub outputs_to_execute: Vec<String>,
}

impl NewJob {
    pub fn new(priority: i64, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            priority,
            payload,
            extra: Value::Null,
            outputs_to_execute: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<String>) -> Self {
        self.outputs_to_execute = outputs;
        self
    }
}

/// Queued unit of work. Ordered by `(priority, sequence)`, lowest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: JobId,
    pub priority: i64,
    pub sequence: u64,
    pub payload: Value,
    pub extra: Value,
    pub outputs_to_execute: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl JobDescriptor {
    pub fn from_new(job: NewJob, sequence: u64) -> Self {
        Self {
            id: job.id,
            priority: job.priority,
            sequence,
            payload: job.payload,
            extra: job.extra,
            outputs_to_execute: job.outputs_to_execute,
            created_at: Utc::now(),
        }
    }

    pub fn order_key(&self) -> (i64, u64) {
        (self.priority, self.sequence)
    }
}

/// A descriptor tagged with the owner that submitted it.
///
/// `Clone` copies the whole payload tree; the running set relies on that to
/// hold a record independent of anything handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedJob {
    pub job: JobDescriptor,
    pub owner: Owner,
}

/// A completed job kept in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub job: JobDescriptor,
    pub outputs: Value,
    pub status: Option<ExecutionStatus>,
    pub owner: Owner,
    pub completed_at: DateTime<Utc>,
}
