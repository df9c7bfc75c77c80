//! SQLite-backed conversion ledger.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::types::{LedgerError, LedgerRecord, LedgerStats, RecordState};

/// Name of the ledger file created at the input root.
pub const LEDGER_FILE_NAME: &str = ".voxtract.db";

/// SQLite-backed ledger. One file per input root.
///
/// Callable concurrently from many worker tasks; the connection mutex is the
/// synchronization point. The pool guarantees at most one in-flight job per
/// source path, so there is never a concurrent writer for the same key.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Opens (or creates) the ledger at the given input root.
    pub fn open(root: &Path) -> Result<Self, LedgerError> {
        Self::open_file(&root.join(LEDGER_FILE_NAME))
    }

    /// Opens (or creates) the ledger at an explicit file path.
    pub fn open_file(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path).map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory ledger (useful for testing).
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn =
            Connection::open_in_memory().map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversions (
                id            INTEGER PRIMARY KEY,
                source_path   TEXT    UNIQUE NOT NULL,
                target_path   TEXT    NOT NULL,
                state         TEXT    NOT NULL,
                started_at    INTEGER NOT NULL,
                completed_at  INTEGER,
                error         TEXT,
                source_bytes  INTEGER,
                output_bytes  INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_conversions_state ON conversions(state);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_conversions_source ON conversions(source_path);
            "#,
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(())
    }

    /// Records the start of a conversion attempt.
    ///
    /// A restart wipes the previous record for the same source path rather
    /// than updating it: completion fields from the prior attempt are
    /// cleared so an interrupted row is never half-old, half-new.
    pub fn start(
        &self,
        source: &Path,
        target: &Path,
        source_bytes: Option<u64>,
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO conversions
                 (source_path, target_path, state, started_at, completed_at, error, source_bytes, output_bytes)
             VALUES (?, ?, 'processing', ?, NULL, NULL, ?, NULL)
             ON CONFLICT(source_path) DO UPDATE SET
                 target_path = excluded.target_path,
                 state = 'processing',
                 started_at = excluded.started_at,
                 completed_at = NULL,
                 error = NULL,
                 source_bytes = excluded.source_bytes,
                 output_bytes = NULL",
            params![
                path_key(source),
                path_key(target),
                Utc::now().timestamp_millis(),
                source_bytes.map(|b| b as i64),
            ],
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(())
    }

    /// Marks a conversion as complete and records the output size.
    pub fn complete(&self, source: &Path, output_bytes: u64) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE conversions
                 SET state = 'complete', completed_at = ?, output_bytes = ?
                 WHERE source_path = ?",
                params![
                    Utc::now().timestamp_millis(),
                    output_bytes as i64,
                    path_key(source),
                ],
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(LedgerError::NotFound(path_key(source)));
        }
        Ok(())
    }

    /// Marks a conversion as failed with the classified error text.
    pub fn fail(&self, source: &Path, error_text: &str) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE conversions
                 SET state = 'failed', completed_at = ?, error = ?
                 WHERE source_path = ?",
                params![
                    Utc::now().timestamp_millis(),
                    error_text,
                    path_key(source),
                ],
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(LedgerError::NotFound(path_key(source)));
        }
        Ok(())
    }

    /// Looks up the record for a source path, if any.
    pub fn get(&self, source: &Path) -> Result<Option<LedgerRecord>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT source_path, target_path, state, started_at, completed_at,
                    error, source_bytes, output_bytes
             FROM conversions WHERE source_path = ?",
            params![path_key(source)],
            row_to_record,
        )
        .optional()
        .map_err(|e| LedgerError::Database(e.to_string()))
    }

    /// Enumerates all records in the given state, oldest first.
    pub fn records_in_state(&self, state: RecordState) -> Result<Vec<LedgerRecord>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT source_path, target_path, state, started_at, completed_at,
                        error, source_bytes, output_bytes
                 FROM conversions WHERE state = ? ORDER BY started_at ASC",
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![state.as_str()], row_to_record)
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| LedgerError::Database(e.to_string()))?);
        }
        Ok(records)
    }

    /// Drops the record for a source path, re-enabling reconversion.
    pub fn delete(&self, source: &Path) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM conversions WHERE source_path = ?",
                params![path_key(source)],
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        if deleted == 0 {
            return Err(LedgerError::NotFound(path_key(source)));
        }
        Ok(())
    }

    /// Per-state row counts.
    pub fn stats(&self) -> Result<LedgerStats, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT state, COUNT(*) FROM conversions GROUP BY state")
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let state: String = row.get(0)?;
                let count: u64 = row.get(1)?;
                Ok((state, count))
            })
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let mut stats = LedgerStats::default();
        for row in rows {
            let (state, count) = row.map_err(|e| LedgerError::Database(e.to_string()))?;
            match RecordState::parse(&state) {
                Some(RecordState::Processing) => stats.processing = count,
                Some(RecordState::Complete) => stats.complete = count,
                Some(RecordState::Failed) => stats.failed = count,
                None => {}
            }
        }
        Ok(stats)
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<LedgerRecord> {
    let state_str: String = row.get(2)?;
    let started_at: i64 = row.get(3)?;
    let completed_at: Option<i64> = row.get(4)?;
    let source_bytes: Option<i64> = row.get(6)?;
    let output_bytes: Option<i64> = row.get(7)?;

    Ok(LedgerRecord {
        source_path: PathBuf::from(row.get::<_, String>(0)?),
        target_path: PathBuf::from(row.get::<_, String>(1)?),
        // Unknown states cannot appear: every writer goes through RecordState.
        state: RecordState::parse(&state_str).unwrap_or(RecordState::Failed),
        started_at: millis_to_utc(started_at),
        completed_at: completed_at.map(millis_to_utc),
        error: row.get(5)?,
        source_bytes: source_bytes.map(|b| b as u64),
        output_bytes: output_bytes.map(|b| b as u64),
    })
}
