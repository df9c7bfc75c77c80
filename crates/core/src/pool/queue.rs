//! The pool scheduler.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::encoder::{EncodeOutcome, EncodeRequest, Encoder, ProgressEvent};
use crate::ledger::SqliteLedger;
use crate::walker::DiscoveredFile;

use super::observer::PoolObserver;
use super::types::{Job, JobState, PoolConfig, PoolSnapshot, QueueSummary};

enum PoolCommand {
    Add(DiscoveredFile),
    ScanComplete,
    Pause,
    Resume,
    Cancel(u64),
    GracefulShutdown,
    ImmediateShutdown,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ShutdownMode {
    Graceful,
    Immediate,
}

/// Handle to a running pool. Cheap to clone; all methods are non-blocking
/// and unbounded, since the walker's natural rate is slow relative to the
/// worker count.
#[derive(Clone)]
pub struct WorkPool {
    cmd_tx: mpsc::UnboundedSender<PoolCommand>,
    state_rx: watch::Receiver<PoolSnapshot>,
}

impl WorkPool {
    /// Starts a pool. The returned future resolves with the final summary
    /// once the queue completes; exactly one summary is produced.
    pub fn start<E: Encoder + 'static>(
        config: PoolConfig,
        encoder: Arc<E>,
        ledger: Arc<SqliteLedger>,
        observer: Arc<dyn PoolObserver>,
    ) -> (Self, JoinHandle<QueueSummary>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PoolSnapshot::default());
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();

        let scheduler = Scheduler {
            concurrency: config.concurrency.clamp(1, 25),
            encoder,
            ledger,
            observer,
            cmd_rx,
            cmd_closed: false,
            done_tx,
            done_rx,
            progress_tx,
            progress_rx,
            state_tx,
            pending: VecDeque::new(),
            active: HashMap::new(),
            next_id: 1,
            total_added: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            total_output_bytes: 0,
            scan_complete: false,
            paused: false,
            shutdown: None,
            started: Instant::now(),
            summary: None,
        };

        let handle = tokio::spawn(scheduler.run());

        (Self { cmd_tx, state_rx }, handle)
    }

    /// Enqueues a discovered file.
    pub fn add(&self, file: DiscoveredFile) {
        let _ = self.cmd_tx.send(PoolCommand::Add(file));
    }

    /// Signals that the producer has finished. Once the queues drain, the
    /// pool completes.
    pub fn mark_scan_complete(&self) {
        let _ = self.cmd_tx.send(PoolCommand::ScanComplete);
    }

    /// Stops dispatching without dropping anything.
    pub fn pause(&self) {
        let _ = self.cmd_tx.send(PoolCommand::Pause);
    }

    /// Resumes dispatching.
    pub fn resume(&self) {
        let _ = self.cmd_tx.send(PoolCommand::Resume);
    }

    /// Best-effort cancellation of one job, pending or running.
    pub fn cancel(&self, job_id: u64) {
        let _ = self.cmd_tx.send(PoolCommand::Cancel(job_id));
    }

    /// Drops the pending queue and lets running jobs finish.
    pub fn request_graceful_shutdown(&self) {
        let _ = self.cmd_tx.send(PoolCommand::GracefulShutdown);
    }

    /// Drops pending, kills all running children, deletes their partial
    /// outputs, and completes.
    pub fn request_immediate_shutdown(&self) {
        let _ = self.cmd_tx.send(PoolCommand::ImmediateShutdown);
    }

    /// Current counters.
    pub fn snapshot(&self) -> PoolSnapshot {
        *self.state_rx.borrow()
    }
}

struct Scheduler<E: Encoder> {
    concurrency: usize,
    encoder: Arc<E>,
    ledger: Arc<SqliteLedger>,
    observer: Arc<dyn PoolObserver>,

    cmd_rx: mpsc::UnboundedReceiver<PoolCommand>,
    cmd_closed: bool,
    done_tx: mpsc::UnboundedSender<(u64, EncodeOutcome)>,
    done_rx: mpsc::UnboundedReceiver<(u64, EncodeOutcome)>,
    progress_tx: mpsc::UnboundedSender<ProgressEvent>,
    progress_rx: mpsc::UnboundedReceiver<ProgressEvent>,
    state_tx: watch::Sender<PoolSnapshot>,

    pending: VecDeque<Job>,
    active: HashMap<u64, Job>,
    next_id: u64,
    total_added: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
    total_output_bytes: u64,
    scan_complete: bool,
    paused: bool,
    shutdown: Option<ShutdownMode>,
    started: Instant,
    summary: Option<QueueSummary>,
}

impl<E: Encoder + 'static> Scheduler<E> {
    async fn run(mut self) -> QueueSummary {
        loop {
            if let Some(summary) = self.summary {
                return summary;
            }

            tokio::select! {
                biased;
                Some((job_id, outcome)) = self.done_rx.recv() => {
                    self.handle_job_finished(job_id, outcome);
                }
                Some(event) = self.progress_rx.recv() => {
                    self.handle_progress(event);
                }
                cmd = self.cmd_rx.recv(), if !self.cmd_closed => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        // Every handle dropped: nothing more can arrive,
                        // drain what is running and finish.
                        self.cmd_closed = true;
                        self.handle_command(PoolCommand::GracefulShutdown);
                    }
                },
            }
        }
    }

    fn handle_command(&mut self, cmd: PoolCommand) {
        match cmd {
            PoolCommand::Add(file) => self.handle_add(file),
            PoolCommand::ScanComplete => {
                self.scan_complete = true;
                debug!("scan complete");
                self.observer.scan_complete();
                self.maybe_complete();
            }
            PoolCommand::Pause => self.paused = true,
            PoolCommand::Resume => {
                self.paused = false;
                self.dispatch();
                self.maybe_complete();
            }
            PoolCommand::Cancel(job_id) => self.handle_cancel(job_id),
            PoolCommand::GracefulShutdown => self.handle_shutdown(ShutdownMode::Graceful),
            PoolCommand::ImmediateShutdown => self.handle_shutdown(ShutdownMode::Immediate),
        }
    }

    fn handle_add(&mut self, file: DiscoveredFile) {
        let job = Job::new(self.next_id, file);
        self.next_id += 1;
        self.total_added += 1;
        self.observer.file_added(&job);
        self.pending.push_back(job);
        self.dispatch();
    }

    fn handle_cancel(&mut self, job_id: u64) {
        if let Some(pos) = self.pending.iter().position(|job| job.id == job_id) {
            let mut job = self.pending.remove(pos).expect("position just found");
            job.state = JobState::Cancelled;
            job.finished_at = Some(Utc::now());
            self.cancelled += 1;
            self.observer.job_completed(&job);
            self.publish_state();
            self.maybe_complete();
        } else if self.active.contains_key(&job_id) {
            // The kill resolves through the normal completion path.
            self.encoder.kill(job_id);
        }
    }

    fn handle_shutdown(&mut self, mode: ShutdownMode) {
        if self.summary.is_some() {
            return;
        }
        // A second request can only escalate.
        if self.shutdown == Some(ShutdownMode::Immediate) {
            return;
        }
        self.shutdown = Some(mode);
        info!(
            immediate = (mode == ShutdownMode::Immediate),
            pending = self.pending.len(),
            active = self.active.len(),
            "shutdown requested"
        );

        self.drop_pending();

        if mode == ShutdownMode::Immediate && !self.active.is_empty() {
            let deleted = self.encoder.kill_all(true);
            if !deleted.is_empty() {
                info!(count = deleted.len(), "deleted partial outputs");
            }
            let mut jobs: Vec<Job> = self.active.drain().map(|(_, job)| job).collect();
            jobs.sort_by_key(|job| job.id);
            for mut job in jobs {
                job.state = JobState::Cancelled;
                job.finished_at = Some(Utc::now());
                // The ledger row stays `processing`; it marks the
                // interruption for the next run and for cleanup.
                self.cancelled += 1;
                self.observer.job_completed(&job);
            }
        }

        self.publish_state();
        self.maybe_complete();
    }

    fn drop_pending(&mut self) {
        while let Some(mut job) = self.pending.pop_front() {
            job.state = JobState::Cancelled;
            job.finished_at = Some(Utc::now());
            self.cancelled += 1;
            self.observer.job_completed(&job);
        }
    }

    fn handle_progress(&mut self, event: ProgressEvent) {
        // Late samples from a child that already finished are dropped.
        if let Some(job) = self.active.get_mut(&event.job_id) {
            job.percent = job.percent.max(event.percent.min(100));
            job.current_time_secs = Some(event.time_secs);
            if job.duration_secs.is_none() {
                job.duration_secs = event.duration_secs;
            }
            self.observer
                .job_progress(event.job_id, job.percent, event.time_secs);
        }
    }

    fn handle_job_finished(&mut self, job_id: u64, outcome: EncodeOutcome) {
        // Immediate shutdown may have already drained this entry.
        let Some(mut job) = self.active.remove(&job_id) else {
            return;
        };
        job.finished_at = Some(Utc::now());

        match outcome {
            EncodeOutcome::Completed { output_bytes } => {
                job.state = JobState::Completed;
                job.percent = 100;
                job.output_bytes = Some(output_bytes);
                self.completed += 1;
                self.total_output_bytes += output_bytes;
                if let Err(e) = self.ledger.complete(&job.source, output_bytes) {
                    error!(source = %job.source.display(), error = %e, "ledger complete failed");
                }
            }
            EncodeOutcome::Failed { error_text } => {
                job.state = JobState::Failed;
                job.error_text = Some(error_text.clone());
                self.failed += 1;
                if let Err(e) = self.ledger.fail(&job.source, &error_text) {
                    error!(source = %job.source.display(), error = %e, "ledger fail failed");
                }
            }
            EncodeOutcome::Cancelled => {
                job.state = JobState::Cancelled;
                self.cancelled += 1;
                // Ledger row stays `processing`.
            }
        }

        // The next job starts spawning before the observer is told about
        // this one; keeps the workers saturated under slow observers.
        self.dispatch();

        self.observer.job_completed(&job);
        self.publish_state();
        self.maybe_complete();
    }

    fn dispatch(&mut self) {
        while self.active.len() < self.concurrency
            && !self.pending.is_empty()
            && self.shutdown.is_none()
            && !self.paused
        {
            let job = self.pending.pop_front().expect("pending is non-empty");
            self.start_job(job);
        }
        self.publish_state();
    }

    fn start_job(&mut self, mut job: Job) {
        job.state = JobState::Running;
        job.started_at = Some(Utc::now());
        self.observer.job_started(&job);

        // The ledger write precedes the spawn so an interruption between
        // the two leaves a `processing` marker, never an untracked child.
        if let Err(e) = self
            .ledger
            .start(&job.source, &job.target, Some(job.source_bytes))
        {
            error!(source = %job.source.display(), error = %e, "ledger start failed");
            job.state = JobState::Failed;
            job.finished_at = Some(Utc::now());
            job.error_text = Some(format!("ledger: {e}"));
            self.failed += 1;
            self.observer.job_completed(&job);
            return;
        }

        let request = EncodeRequest {
            job_id: job.id,
            source: job.source.clone(),
            target: job.target.clone(),
        };
        self.active.insert(job.id, job);

        let encoder = Arc::clone(&self.encoder);
        let done_tx = self.done_tx.clone();
        let progress_tx = self.progress_tx.clone();
        tokio::spawn(async move {
            let job_id = request.job_id;
            let outcome = encoder.run(request, progress_tx).await;
            let _ = done_tx.send((job_id, outcome));
        });
    }

    fn maybe_complete(&mut self) {
        if self.summary.is_some() {
            return;
        }
        let done = match self.shutdown {
            // Draining: pending is already dropped, only actives matter.
            Some(_) => self.active.is_empty(),
            None => self.scan_complete && self.pending.is_empty() && self.active.is_empty(),
        };
        if done {
            self.complete();
        }
    }

    fn complete(&mut self) {
        // Files added while draining never dispatched; count them out.
        self.drop_pending();
        let summary = QueueSummary {
            total_added: self.total_added,
            completed: self.completed,
            failed: self.failed,
            cancelled: self.cancelled,
            total_output_bytes: self.total_output_bytes,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        };
        info!(
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "queue complete"
        );
        self.publish_state();
        self.observer.queue_complete(&summary);
        self.summary = Some(summary);
    }

    fn publish_state(&self) {
        let snapshot = PoolSnapshot {
            total_added: self.total_added,
            completed: self.completed,
            failed: self.failed,
            cancelled: self.cancelled,
            pending: self.pending.len(),
            active: self.active.len(),
            total_output_bytes: self.total_output_bytes,
        };
        if *self.state_tx.borrow() != snapshot {
            let _ = self.state_tx.send(snapshot);
            self.observer.state_changed(&snapshot);
        }
    }
}
