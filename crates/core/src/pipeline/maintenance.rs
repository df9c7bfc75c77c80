//! Verify/cleanup mode over the ledger.
//!
//! `processing` records mark interrupted runs, `failed` records mark
//! conversions whose encoder exited non-zero. Verify lists both without
//! touching anything; cleanup deletes their target files and drops the
//! records so the next run reconverts them.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::ledger::{LedgerError, LedgerRecord, RecordState, SqliteLedger};

/// One row of the verify/cleanup report.
#[derive(Debug, Clone)]
pub struct MaintenanceEntry {
    pub record: LedgerRecord,
    /// Whether the target file currently exists on disk.
    pub target_exists: bool,
}

/// Read-only report of cleanable ledger state.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub processing: Vec<MaintenanceEntry>,
    pub failed: Vec<MaintenanceEntry>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.processing.is_empty() && self.failed.is_empty()
    }
}

/// Result of one cleanup pass.
#[derive(Debug, Clone)]
pub struct CleanupOutcome {
    /// Entries examined (everything `processing` or `failed`).
    pub entries: Vec<MaintenanceEntry>,
    /// Target files actually deleted. Empty on a dry run.
    pub deleted_targets: Vec<PathBuf>,
    /// Ledger rows dropped. Zero on a dry run.
    pub removed_records: usize,
    pub dry_run: bool,
}

fn collect(
    ledger: &SqliteLedger,
    state: RecordState,
) -> Result<Vec<MaintenanceEntry>, LedgerError> {
    Ok(ledger
        .records_in_state(state)?
        .into_iter()
        .map(|record| MaintenanceEntry {
            target_exists: record.target_path.exists(),
            record,
        })
        .collect())
}

/// Enumerates `processing` and `failed` records without modifying anything.
pub fn verify(ledger: &SqliteLedger) -> Result<VerifyReport, LedgerError> {
    Ok(VerifyReport {
        processing: collect(ledger, RecordState::Processing)?,
        failed: collect(ledger, RecordState::Failed)?,
    })
}

/// Deletes the target files of `processing`/`failed` records and drops
/// those records, re-enabling reconversion. With `dry_run`, reports what
/// would be removed without touching the filesystem or the ledger.
pub fn cleanup(ledger: &SqliteLedger, dry_run: bool) -> Result<CleanupOutcome, LedgerError> {
    let mut entries = collect(ledger, RecordState::Processing)?;
    entries.extend(collect(ledger, RecordState::Failed)?);

    if dry_run {
        return Ok(CleanupOutcome {
            entries,
            deleted_targets: Vec::new(),
            removed_records: 0,
            dry_run: true,
        });
    }

    let mut deleted_targets = Vec::new();
    let mut removed_records = 0;

    for entry in &entries {
        if entry.target_exists {
            match std::fs::remove_file(&entry.record.target_path) {
                Ok(()) => deleted_targets.push(entry.record.target_path.clone()),
                Err(e) => warn!(
                    target = %entry.record.target_path.display(),
                    error = %e,
                    "failed to delete stray target"
                ),
            }
        }
        match ledger.delete(&entry.record.source_path) {
            Ok(()) => removed_records += 1,
            Err(e) => warn!(
                source = %entry.record.source_path.display(),
                error = %e,
                "failed to drop ledger record"
            ),
        }
    }

    info!(
        removed_records,
        deleted_targets = deleted_targets.len(),
        "cleanup complete"
    );

    Ok(CleanupOutcome {
        entries,
        deleted_targets,
        removed_records,
        dry_run: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn seed(ledger: &SqliteLedger, dir: &Path, name: &str, state: RecordState) -> PathBuf {
        let source = dir.join(format!("{name}.mp4"));
        let target = dir.join(format!("{name}.mp3"));
        ledger.start(&source, &target, Some(100)).unwrap();
        match state {
            RecordState::Processing => {}
            RecordState::Complete => ledger.complete(&source, 50).unwrap(),
            RecordState::Failed => ledger.fail(&source, "encoder_exit_1").unwrap(),
        }
        target
    }

    #[test]
    fn test_verify_lists_processing_and_failed() {
        let dir = TempDir::new().unwrap();
        let ledger = SqliteLedger::open(dir.path()).unwrap();
        seed(&ledger, dir.path(), "interrupted", RecordState::Processing);
        seed(&ledger, dir.path(), "broken", RecordState::Failed);
        seed(&ledger, dir.path(), "done", RecordState::Complete);

        let report = verify(&ledger).unwrap();
        assert_eq!(report.processing.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_verify_reports_target_existence() {
        let dir = TempDir::new().unwrap();
        let ledger = SqliteLedger::open(dir.path()).unwrap();
        let target = seed(&ledger, dir.path(), "partial", RecordState::Processing);
        std::fs::write(&target, b"partial").unwrap();
        seed(&ledger, dir.path(), "gone", RecordState::Processing);

        let report = verify(&ledger).unwrap();
        let by_name = |name: &str| {
            report
                .processing
                .iter()
                .find(|e| e.record.source_path.ends_with(format!("{name}.mp4")))
                .unwrap()
                .target_exists
        };
        assert!(by_name("partial"));
        assert!(!by_name("gone"));
    }

    #[test]
    fn test_cleanup_dry_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let ledger = SqliteLedger::open(dir.path()).unwrap();
        let target = seed(&ledger, dir.path(), "stray", RecordState::Processing);
        std::fs::write(&target, b"partial").unwrap();

        let outcome = cleanup(&ledger, true).unwrap();
        assert!(outcome.dry_run);
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.removed_records, 0);
        assert!(outcome.deleted_targets.is_empty());

        // Neither the file nor the record was touched.
        assert!(target.exists());
        assert_eq!(ledger.stats().unwrap().processing, 1);
    }

    #[test]
    fn test_cleanup_removes_targets_and_records() {
        let dir = TempDir::new().unwrap();
        let ledger = SqliteLedger::open(dir.path()).unwrap();
        let target = seed(&ledger, dir.path(), "stray", RecordState::Processing);
        std::fs::write(&target, b"partial").unwrap();
        seed(&ledger, dir.path(), "broken", RecordState::Failed);
        seed(&ledger, dir.path(), "done", RecordState::Complete);

        let outcome = cleanup(&ledger, false).unwrap();
        assert_eq!(outcome.removed_records, 2);
        assert_eq!(outcome.deleted_targets, vec![target.clone()]);
        assert!(!target.exists());

        // Complete records are untouched.
        let stats = ledger.stats().unwrap();
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.complete, 1);
    }

    #[test]
    fn test_cleanup_tolerates_missing_targets() {
        let dir = TempDir::new().unwrap();
        let ledger = SqliteLedger::open(dir.path()).unwrap();
        seed(&ledger, dir.path(), "gone", RecordState::Processing);

        let outcome = cleanup(&ledger, false).unwrap();
        assert_eq!(outcome.removed_records, 1);
        assert!(outcome.deleted_targets.is_empty());
    }
}
