//! Durable per-directory record of every conversion attempt.
//!
//! The ledger is the source of truth for "is this file done?". The walker
//! reads it to decide what to skip, the work pool writes it on every job
//! transition, and the verify/cleanup mode enumerates it to recover from
//! interrupted runs.

mod sqlite;
mod types;

pub use sqlite::{SqliteLedger, LEDGER_FILE_NAME};
pub use types::{LedgerError, LedgerRecord, LedgerStats, RecordState};
