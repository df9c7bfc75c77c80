//! Types for the conversion ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Underlying database error.
    #[error("ledger database error: {0}")]
    Database(String),

    /// No record exists for the given source path.
    #[error("no ledger record for {0}")]
    NotFound(String),
}

/// Durable state of one conversion attempt.
///
/// A `Processing` record left behind at process exit marks an interrupted
/// run; the cleanup mode treats it as cleanable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Processing,
    Complete,
    Failed,
}

impl RecordState {
    /// The string persisted in the `state` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Parses a persisted `state` column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Self::Processing),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the ledger, keyed uniquely by source path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Video file this attempt converts.
    pub source_path: PathBuf,
    /// Audio file the attempt produces.
    pub target_path: PathBuf,
    /// Outcome so far.
    pub state: RecordState,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt finished, for `complete`/`failed` records.
    pub completed_at: Option<DateTime<Utc>>,
    /// Classified failure text, for `failed` records.
    pub error: Option<String>,
    /// Size of the source at attempt start.
    pub source_bytes: Option<u64>,
    /// Size of the produced target, for `complete` records.
    pub output_bytes: Option<u64>,
}

/// Per-state row counts, reported by the verify mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub processing: u64,
    pub complete: u64,
    pub failed: u64,
}

impl LedgerStats {
    pub fn total(&self) -> u64 {
        self.processing + self.complete + self.failed
    }
}
