//! Types for the encoder driver.

use std::path::PathBuf;

/// One unit of work handed to the encoder: convert `source` into `target`.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    /// Pool-assigned job id; keys the global child registry.
    pub job_id: u64,
    /// Input video file.
    pub source: PathBuf,
    /// Output audio file.
    pub target: PathBuf,
}

/// Progress sample parsed from the child's diagnostic stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub job_id: u64,
    /// Percent complete, clamped to `[0, 100]`, monotonically non-decreasing.
    pub percent: u8,
    /// Position in the input, seconds.
    pub time_secs: f64,
    /// Total input duration, seconds, once parsed.
    pub duration_secs: Option<f64>,
}

/// Terminal result of one encoder child.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    /// Child exited 0. A missing target file is tolerated and reported
    /// as zero bytes.
    Completed { output_bytes: u64 },
    /// Spawn error or non-zero exit, with classified error text.
    Failed { error_text: String },
    /// The child was terminated by a kill request. No guarantees about
    /// the partial output.
    Cancelled,
}

impl EncodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
