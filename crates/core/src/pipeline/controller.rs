//! Single-shot pipeline orchestration.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::encoder::Encoder;
use crate::ledger::SqliteLedger;
use crate::pool::{NullObserver, PoolConfig, PoolObserver, WorkPool};
use crate::walker::{self, WalkEvent, WalkStats, WalkerConfig};

use super::types::{
    idle_reason, PipelineError, PipelineOptions, RunOutcome, ShutdownRequest,
};

/// Orchestrates one invocation: preflight, then either a dry-run scan or
/// the live walker→pool pipeline. Owns the ledger handle for the run.
pub struct PipelineController<E: Encoder + 'static> {
    options: PipelineOptions,
    encoder: Arc<E>,
    observer: Arc<dyn PoolObserver>,
}

impl<E: Encoder + 'static> PipelineController<E> {
    pub fn new(options: PipelineOptions, encoder: Arc<E>) -> Self {
        Self {
            options,
            encoder,
            observer: Arc::new(NullObserver),
        }
    }

    /// Attaches a UI observer.
    pub fn with_observer(mut self, observer: Arc<dyn PoolObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Runs the invocation to completion. Shutdown requests received on
    /// `shutdown_rx` translate into the pool's two-level protocol.
    pub async fn run(
        &self,
        shutdown_rx: broadcast::Receiver<ShutdownRequest>,
    ) -> Result<RunOutcome, PipelineError> {
        self.preflight().await?;

        if self.options.dry_run {
            self.dry_run().await
        } else {
            self.live(shutdown_rx).await
        }
    }

    async fn preflight(&self) -> Result<(), PipelineError> {
        self.encoder.validate().await?;

        let root = &self.options.input_root;
        let metadata = tokio::fs::metadata(root)
            .await
            .map_err(|_| PipelineError::InputRootNotFound(root.clone()))?;
        if !metadata.is_dir() {
            return Err(PipelineError::InputRootNotDirectory(root.clone()));
        }
        Ok(())
    }

    /// Scan-only mode: classification totals, no ledger writes, no
    /// encoder children.
    async fn dry_run(&self) -> Result<RunOutcome, PipelineError> {
        let ledger = Arc::new(SqliteLedger::open(&self.options.input_root)?);
        let (mut events, _handle) = walker::spawn(
            self.options.input_root.clone(),
            self.walker_config(),
            ledger,
        );

        let mut stats = WalkStats::default();
        while let Some(event) = events.recv().await {
            if let WalkEvent::Complete(s) = event {
                stats = s;
            }
        }

        info!(
            found = stats.total_found,
            to_process = stats.to_process,
            skipped_audio = stats.skipped_audio,
            skipped_subtitle = stats.skipped_subtitle,
            "dry run complete"
        );
        Ok(RunOutcome::DryRun {
            idle: idle_reason(&stats),
            stats,
        })
    }

    async fn live(
        &self,
        mut shutdown_rx: broadcast::Receiver<ShutdownRequest>,
    ) -> Result<RunOutcome, PipelineError> {
        let ledger = Arc::new(SqliteLedger::open(&self.options.input_root)?);

        let (pool, mut pool_handle) = WorkPool::start(
            PoolConfig {
                concurrency: self.options.concurrency,
            },
            Arc::clone(&self.encoder),
            Arc::clone(&ledger),
            Arc::clone(&self.observer),
        );

        let (events, walker_handle) = walker::spawn(
            self.options.input_root.clone(),
            self.walker_config(),
            Arc::clone(&ledger),
        );

        // The pool executes jobs the walker has already emitted while the
        // walker is still enumerating.
        let pump = tokio::spawn(pump_events(events, pool.clone()));

        let mut signals_live = true;
        let summary = loop {
            tokio::select! {
                result = &mut pool_handle => {
                    break result.map_err(|e| PipelineError::Internal(e.to_string()))?;
                }
                signal = shutdown_rx.recv(), if signals_live => match signal {
                    Ok(ShutdownRequest::Graceful) => {
                        info!("graceful shutdown: draining running conversions");
                        walker_handle.stop();
                        pool.request_graceful_shutdown();
                    }
                    Ok(ShutdownRequest::Immediate) => {
                        info!("immediate shutdown: killing running conversions");
                        walker_handle.stop();
                        pool.request_immediate_shutdown();
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => signals_live = false,
                },
            }
        };

        let stats = pump
            .await
            .map_err(|e| PipelineError::Internal(e.to_string()))?;

        Ok(RunOutcome::Completed {
            idle: idle_reason(&stats),
            stats,
            summary,
        })
    }

    fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            recursive: self.options.recursive,
            scanners: self.options.scanners,
        }
    }
}

/// Routes walker events into the pool until the stream closes. Returns the
/// stats from the terminal event.
async fn pump_events(mut events: mpsc::Receiver<WalkEvent>, pool: WorkPool) -> WalkStats {
    let mut stats = WalkStats::default();
    while let Some(event) = events.recv().await {
        match event {
            WalkEvent::File(file) => pool.add(file),
            WalkEvent::Directory(path) => {
                debug!(path = %path.display(), "descending");
            }
            WalkEvent::Skipped { path, reason } => {
                debug!(path = %path.display(), ?reason, "skipped");
            }
            WalkEvent::Error { path, message } => {
                warn!(path = %path.display(), message, "walk error");
            }
            WalkEvent::Complete(s) => {
                stats = s;
                pool.mark_scan_complete();
            }
        }
    }
    stats
}
