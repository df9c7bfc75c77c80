//! Trait definition for the encoder driver.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

use super::error::EncoderError;
use super::types::{EncodeOutcome, EncodeRequest, ProgressEvent};

/// Drives one external encoder child per job and supervises the set of
/// live children for shutdown.
///
/// `run` never fails at the Rust level: spawn errors and non-zero exits are
/// folded into [`EncodeOutcome::Failed`] so the pool records them against
/// the job and continues.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Name of this encoder implementation.
    fn name(&self) -> &str;

    /// Converts one file, streaming progress samples as they are parsed.
    ///
    /// Progress is unthrottled: a sample is sent for every parsed update,
    /// and coalescing is the observer's responsibility. A closed receiver
    /// is tolerated; conversion continues without progress reporting.
    async fn run(
        &self,
        request: EncodeRequest,
        progress_tx: mpsc::UnboundedSender<ProgressEvent>,
    ) -> EncodeOutcome;

    /// Signals one child for orderly termination. Returns whether a live
    /// child was found.
    fn kill(&self, job_id: u64) -> bool;

    /// Hard-kills every live child; optionally deletes their partial
    /// outputs, returning the paths actually deleted.
    fn kill_all(&self, cleanup_outputs: bool) -> Vec<PathBuf>;

    /// Number of live children.
    fn active_count(&self) -> usize;

    /// Preflight check that the encoder is usable (binaries present and
    /// functional). Run once at startup.
    async fn validate(&self) -> Result<(), EncoderError>;
}
