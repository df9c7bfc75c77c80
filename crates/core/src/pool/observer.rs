//! Observer seam between the pool and any UI.

use super::types::{Job, PoolSnapshot, QueueSummary};

/// Receives pipeline events as they happen.
///
/// All methods default to no-ops. Callbacks run on the scheduler task, so
/// implementations must be cheap and non-blocking; anything expensive
/// belongs behind the observer's own channel. Progress callbacks are
/// unthrottled; coalescing is the observer's responsibility.
///
/// Ordering per job: `file_added` precedes `job_started` precedes any
/// `job_progress` precedes exactly one `job_completed`. No ordering holds
/// across jobs.
pub trait PoolObserver: Send + Sync {
    /// A discovered file was enqueued.
    fn file_added(&self, _job: &Job) {}

    /// A job transitioned to running; its encoder child is about to spawn.
    fn job_started(&self, _job: &Job) {}

    /// A progress sample was parsed from a running job's child.
    fn job_progress(&self, _job_id: u64, _percent: u8, _time_secs: f64) {}

    /// A job reached a terminal state.
    fn job_completed(&self, _job: &Job) {}

    /// The walker finished enumerating.
    fn scan_complete(&self) {}

    /// The pool finished; emitted exactly once.
    fn queue_complete(&self, _summary: &QueueSummary) {}

    /// Counters changed.
    fn state_changed(&self, _snapshot: &PoolSnapshot) {}
}

/// Observer that ignores every event.
pub struct NullObserver;

impl PoolObserver for NullObserver {}
