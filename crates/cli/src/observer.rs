//! Console observer: logs pipeline events as they happen.

use tracing::{debug, info, warn};
use voxtract_core::{Job, JobState, PoolObserver, PoolSnapshot, QueueSummary};

/// Forwards pool events to the log. Progress samples arrive unthrottled,
/// so they are coalesced to one line per decile per job.
pub struct ConsoleObserver;

impl PoolObserver for ConsoleObserver {
    fn file_added(&self, job: &Job) {
        debug!(source = %job.source.display(), "queued");
    }

    fn job_started(&self, job: &Job) {
        info!(source = %job.source.display(), "converting");
    }

    fn job_progress(&self, job_id: u64, percent: u8, _time_secs: f64) {
        if percent % 10 == 0 {
            debug!(job_id, percent, "progress");
        }
    }

    fn job_completed(&self, job: &Job) {
        match job.state {
            JobState::Completed => info!(
                source = %job.source.display(),
                output_bytes = job.output_bytes.unwrap_or(0),
                "converted"
            ),
            JobState::Failed => warn!(
                source = %job.source.display(),
                error = job.error_text.as_deref().unwrap_or("unknown"),
                "conversion failed"
            ),
            JobState::Cancelled => info!(source = %job.source.display(), "cancelled"),
            _ => {}
        }
    }

    fn scan_complete(&self) {
        info!("scan complete");
    }

    fn queue_complete(&self, summary: &QueueSummary) {
        info!(
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "all conversions finished"
        );
    }

    fn state_changed(&self, snapshot: &PoolSnapshot) {
        debug!(
            active = snapshot.active,
            pending = snapshot.pending,
            completed = snapshot.completed,
            "pool state"
        );
    }
}
