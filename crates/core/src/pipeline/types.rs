//! Types for the pipeline controller.

use std::path::PathBuf;
use thiserror::Error;

use crate::encoder::{EncoderError, EncoderSettings};
use crate::ledger::LedgerError;
use crate::pool::QueueSummary;
use crate::walker::WalkStats;

/// Errors that terminate an invocation before or during the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input root does not exist.
    #[error("input root not found: {}", .0.display())]
    InputRootNotFound(PathBuf),

    /// Input root exists but is not a directory.
    #[error("input root is not a directory: {}", .0.display())]
    InputRootNotDirectory(PathBuf),

    /// Encoder preflight failed.
    #[error(transparent)]
    Encoder(#[from] EncoderError),

    /// Ledger could not be opened or read.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// An internal task failed.
    #[error("pipeline task failed: {0}")]
    Internal(String),
}

/// Shutdown escalation levels delivered by the signal handler. The first
/// interrupt requests a graceful drain, the second an immediate abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownRequest {
    Graceful,
    Immediate,
}

/// Why a scan produced nothing to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// No recognized video files under the root.
    NoCandidates,
    /// Every candidate already has a companion artifact.
    AllHaveCompanions,
}

/// Immutable options for one invocation.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub input_root: PathBuf,
    pub recursive: bool,
    /// Worker pool size, clamped to `[1, 25]`.
    pub concurrency: usize,
    /// Walker directory concurrency, clamped to `[1, 20]`.
    pub scanners: usize,
    /// Scan and classify only; no ledger writes, no children.
    pub dry_run: bool,
    /// Forward the encoder diagnostic stream to the log.
    pub verbose: bool,
    pub encoder: EncoderSettings,
}

impl PipelineOptions {
    pub fn new(input_root: PathBuf) -> Self {
        Self {
            input_root,
            recursive: false,
            concurrency: 10,
            scanners: 5,
            dry_run: false,
            verbose: false,
            encoder: EncoderSettings::default(),
        }
    }
}

/// Result of one pipeline invocation.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Dry run: classification totals only.
    DryRun {
        stats: WalkStats,
        idle: Option<IdleReason>,
    },
    /// Live run: scan totals plus the pool's final summary.
    Completed {
        stats: WalkStats,
        summary: QueueSummary,
        idle: Option<IdleReason>,
    },
}

impl RunOutcome {
    pub fn stats(&self) -> &WalkStats {
        match self {
            Self::DryRun { stats, .. } | Self::Completed { stats, .. } => stats,
        }
    }
}

pub(crate) fn idle_reason(stats: &WalkStats) -> Option<IdleReason> {
    if stats.to_process > 0 {
        return None;
    }
    if stats.total_found == 0 {
        Some(IdleReason::NoCandidates)
    } else {
        Some(IdleReason::AllHaveCompanions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_reason_no_candidates() {
        let stats = WalkStats::default();
        assert_eq!(idle_reason(&stats), Some(IdleReason::NoCandidates));
    }

    #[test]
    fn test_idle_reason_all_have_companions() {
        let stats = WalkStats {
            total_found: 3,
            skipped_audio: 2,
            skipped_subtitle: 1,
            ..Default::default()
        };
        assert_eq!(idle_reason(&stats), Some(IdleReason::AllHaveCompanions));
    }

    #[test]
    fn test_idle_reason_none_when_work_exists() {
        let stats = WalkStats {
            total_found: 3,
            to_process: 1,
            skipped_audio: 2,
            ..Default::default()
        };
        assert_eq!(idle_reason(&stats), None);
    }

    #[test]
    fn test_options_defaults() {
        let options = PipelineOptions::new(PathBuf::from("/media"));
        assert_eq!(options.concurrency, 10);
        assert_eq!(options.scanners, 5);
        assert!(!options.recursive);
        assert!(!options.dry_run);
    }
}
