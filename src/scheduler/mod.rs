pub mod history;
pub mod job;
pub mod overlay;
pub mod queue;

pub use history::{History, HistoryQuery};
pub use job::{ExecutionStatus, HistoryEntry, JobDescriptor, JobId, JobStatus, NewJob, OwnedJob};
pub use overlay::{JobQueue, TenantQueue};
pub use queue::{QueueSnapshot, QueueStats, RunningJob};
