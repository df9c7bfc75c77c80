//! Process-global registry of live encoder children.
//!
//! Keyed by job id so shutdown can reach every live child without being
//! plumbed through the pool. Entries mirror the pool's active set: a job is
//! registered immediately after spawn and deregistered on every exit path.
//! Both the exit handler and the kill path tolerate a missing entry, since
//! a child can exit on its own at the same moment a kill arrives.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tokio::sync::watch;
use tracing::{debug, warn};

struct Registered {
    kill_tx: watch::Sender<bool>,
    target: PathBuf,
}

fn registry() -> &'static Mutex<HashMap<u64, Registered>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, Registered>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers a spawned child. Returns the receiver its supervisor selects
/// on for kill requests.
pub(crate) fn register(job_id: u64, target: PathBuf) -> watch::Receiver<bool> {
    let (kill_tx, kill_rx) = watch::channel(false);
    let mut map = registry().lock().unwrap();
    if map.insert(job_id, Registered { kill_tx, target }).is_some() {
        warn!(job_id, "encoder registry already held an entry for this job");
    }
    kill_rx
}

/// Removes a child on exit. A missing entry (already drained by
/// `kill_all`) is a no-op.
pub(crate) fn deregister(job_id: u64) {
    registry().lock().unwrap().remove(&job_id);
}

/// Signals one child for orderly termination. Returns whether a live child
/// was found. The entry stays registered; the supervisor deregisters when
/// the child exits.
pub fn kill(job_id: u64) -> bool {
    let map = registry().lock().unwrap();
    match map.get(&job_id) {
        Some(entry) => {
            let _ = entry.kill_tx.send(true);
            true
        }
        None => false,
    }
}

/// Hard-kills every registered child. When `cleanup_outputs` is set, each
/// registered target path is deleted on a best-effort basis; the list of
/// paths actually deleted is returned.
///
/// Entries are drained synchronously so `active_count()` reads zero as soon
/// as this returns, without waiting for the supervisors to observe the exit.
pub fn kill_all(cleanup_outputs: bool) -> Vec<PathBuf> {
    let drained: Vec<Registered> = {
        let mut map = registry().lock().unwrap();
        map.drain().map(|(_, entry)| entry).collect()
    };

    let mut deleted = Vec::new();
    for entry in drained {
        let _ = entry.kill_tx.send(true);
        if cleanup_outputs {
            match std::fs::remove_file(&entry.target) {
                Ok(()) => {
                    debug!(target_path = %entry.target.display(), "deleted partial output");
                    deleted.push(entry.target);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(
                        target_path = %entry.target.display(),
                        error = %e,
                        "failed to delete partial output"
                    );
                }
            }
        }
    }
    deleted
}

/// Number of live children.
pub fn active_count() -> usize {
    registry().lock().unwrap().len()
}
