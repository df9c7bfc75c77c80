//! Types for the work pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::walker::DiscoveredFile;

/// Lifecycle state of one conversion job. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One conversion job: immutable identity plus a mutable lifecycle record.
#[derive(Debug, Clone)]
pub struct Job {
    /// Monotonic id assigned at enqueue.
    pub id: u64,
    /// Input video file.
    pub source: PathBuf,
    /// Output audio file.
    pub target: PathBuf,
    /// Source size at discovery time.
    pub source_bytes: u64,
    pub state: JobState,
    /// Percent complete, `[0, 100]`, monotonically non-decreasing.
    pub percent: u8,
    /// Parsed input duration, once known.
    pub duration_secs: Option<f64>,
    /// Most recent parsed position.
    pub current_time_secs: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Classified failure text; present exactly when the job failed.
    pub error_text: Option<String>,
    /// Output size; present exactly when the job completed.
    pub output_bytes: Option<u64>,
}

impl Job {
    pub(crate) fn new(id: u64, file: DiscoveredFile) -> Self {
        Self {
            id,
            source: file.path,
            target: file.target_path,
            source_bytes: file.size_bytes,
            state: JobState::Pending,
            percent: 0,
            duration_secs: None,
            current_time_secs: None,
            started_at: None,
            finished_at: None,
            error_text: None,
            output_bytes: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == JobState::Completed
    }
}

/// Pool configuration.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Maximum concurrent encoder children, clamped to `[1, 25]`.
    pub concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { concurrency: 10 }
    }
}

/// Read-only snapshot of the pool's counters. The pool keeps no per-job
/// records after completion; at library scale an unbounded per-job array
/// is the largest memory risk, so observers get counters plus bounded
/// per-event data only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub total_added: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub pending: usize,
    pub active: usize,
    pub total_output_bytes: u64,
}

/// Final summary of one pool run. Resolves the start future; emitted
/// exactly once per invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub total_added: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total_output_bytes: u64,
    pub elapsed_ms: u64,
}
