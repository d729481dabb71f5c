//! Background consumer for the shared queue.
//!
//! - [`run_worker`]: dequeues the globally next job, runs it, records the result
//! - [`JobRunner`]: the execution engine seam
//! - [`NoopRunner`] / [`SandboxRunner`]: bundled runners
//!
//! # Execution Flow
//!
//! 1. Worker blocks on [`JobQueue::get`](crate::scheduler::JobQueue::get) with a poll timeout
//! 2. [`JobRunner::run`] executes the descriptor
//! 3. [`JobQueue::task_done`](crate::scheduler::JobQueue::task_done) moves it into history

pub mod consumer;
pub mod executor;

pub use consumer::run_worker;
pub use executor::{JobRunner, NoopRunner, RunOutcome, SandboxRunner};
