//! Mock encoder for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};

use crate::encoder::{
    EncodeOutcome, EncodeRequest, Encoder, EncoderError, ProgressEvent,
};

/// Mock implementation of the [`Encoder`] trait.
///
/// Controllable behavior for tests:
/// - simulated per-job duration and output size
/// - optional partial output written before the work "runs"
/// - per-source failure injection with classified error text
/// - optional progress samples
/// - a kill-aware active-child registry mirroring the real driver
pub struct MockEncoder {
    duration: Duration,
    output_bytes: u64,
    partial_bytes: u64,
    progress_steps: u32,
    failures: RwLock<HashMap<PathBuf, String>>,
    started: RwLock<Vec<EncodeRequest>>,
    active: StdMutex<HashMap<u64, ActiveChild>>,
}

struct ActiveChild {
    kill_tx: watch::Sender<bool>,
    target: PathBuf,
}

impl Default for MockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEncoder {
    pub fn new() -> Self {
        Self {
            duration: Duration::from_millis(10),
            output_bytes: 1024,
            partial_bytes: 0,
            progress_steps: 0,
            failures: RwLock::new(HashMap::new()),
            started: RwLock::new(Vec::new()),
            active: StdMutex::new(HashMap::new()),
        }
    }

    /// Sets the simulated conversion duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the size of the output file written on success.
    pub fn with_output_bytes(mut self, bytes: u64) -> Self {
        self.output_bytes = bytes;
        self
    }

    /// Writes this many bytes to the target before the simulated work, so
    /// an interrupted job leaves a partial output on disk.
    pub fn with_partial_bytes(mut self, bytes: u64) -> Self {
        self.partial_bytes = bytes;
        self
    }

    /// Emits this many progress samples spread over the duration.
    pub fn with_progress_steps(mut self, steps: u32) -> Self {
        self.progress_steps = steps;
        self
    }

    /// Configures the given source to fail with the given error text.
    pub async fn fail_source(&self, source: impl Into<PathBuf>, error_text: &str) {
        self.failures
            .write()
            .await
            .insert(source.into(), error_text.to_string());
    }

    /// Every request passed to `run`, in start order.
    pub async fn started_requests(&self) -> Vec<EncodeRequest> {
        self.started.read().await.clone()
    }

    /// Number of jobs started.
    pub async fn started_count(&self) -> usize {
        self.started.read().await.len()
    }

    fn register(&self, job_id: u64, target: PathBuf) -> watch::Receiver<bool> {
        let (kill_tx, kill_rx) = watch::channel(false);
        self.active
            .lock()
            .unwrap()
            .insert(job_id, ActiveChild { kill_tx, target });
        kill_rx
    }

    fn deregister(&self, job_id: u64) {
        self.active.lock().unwrap().remove(&job_id);
    }

    async fn simulate_work(
        &self,
        request: &EncodeRequest,
        kill_rx: &mut watch::Receiver<bool>,
        progress_tx: &mpsc::UnboundedSender<ProgressEvent>,
    ) -> bool {
        let steps = self.progress_steps.max(1);
        let step = self.duration / steps;
        let duration_secs = self.duration.as_secs_f64();

        for i in 1..=steps {
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                changed = kill_rx.changed() => {
                    if changed.is_err() || *kill_rx.borrow() {
                        return true;
                    }
                }
            }
            if self.progress_steps > 0 {
                let percent = ((i * 100) / steps).min(100) as u8;
                let _ = progress_tx.send(ProgressEvent {
                    job_id: request.job_id,
                    percent,
                    time_secs: duration_secs * f64::from(i) / f64::from(steps),
                    duration_secs: Some(duration_secs),
                });
            }
        }
        false
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(
        &self,
        request: EncodeRequest,
        progress_tx: mpsc::UnboundedSender<ProgressEvent>,
    ) -> EncodeOutcome {
        self.started.write().await.push(request.clone());

        // Configured failures behave like a fast-failing child.
        if let Some(error_text) = self.failures.read().await.get(&request.source) {
            return EncodeOutcome::Failed {
                error_text: error_text.clone(),
            };
        }

        let mut kill_rx = self.register(request.job_id, request.target.clone());

        if self.partial_bytes > 0 {
            let _ = std::fs::write(&request.target, vec![0u8; self.partial_bytes as usize]);
        }

        let killed = self.simulate_work(&request, &mut kill_rx, &progress_tx).await;
        self.deregister(request.job_id);

        if killed {
            return EncodeOutcome::Cancelled;
        }

        match std::fs::write(&request.target, vec![0u8; self.output_bytes as usize]) {
            Ok(()) => EncodeOutcome::Completed {
                output_bytes: self.output_bytes,
            },
            Err(e) => EncodeOutcome::Failed {
                error_text: e.to_string(),
            },
        }
    }

    fn kill(&self, job_id: u64) -> bool {
        let map = self.active.lock().unwrap();
        match map.get(&job_id) {
            Some(child) => {
                let _ = child.kill_tx.send(true);
                true
            }
            None => false,
        }
    }

    fn kill_all(&self, cleanup_outputs: bool) -> Vec<PathBuf> {
        let drained: Vec<ActiveChild> = {
            let mut map = self.active.lock().unwrap();
            map.drain().map(|(_, child)| child).collect()
        };

        let mut deleted = Vec::new();
        for child in drained {
            let _ = child.kill_tx.send(true);
            if cleanup_outputs && std::fs::remove_file(&child.target).is_ok() {
                deleted.push(child.target);
            }
        }
        deleted
    }

    fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(dir: &Path, job_id: u64, name: &str) -> EncodeRequest {
        EncodeRequest {
            job_id,
            source: dir.join(format!("{name}.mp4")),
            target: dir.join(format!("{name}.mp3")),
        }
    }

    #[tokio::test]
    async fn test_success_writes_output() {
        let dir = TempDir::new().unwrap();
        let encoder = MockEncoder::new().with_output_bytes(32);
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = encoder.run(request(dir.path(), 1, "a"), tx).await;
        assert_eq!(outcome, EncodeOutcome::Completed { output_bytes: 32 });
        assert_eq!(
            std::fs::metadata(dir.path().join("a.mp3")).unwrap().len(),
            32
        );
        assert_eq!(encoder.started_count().await, 1);
        assert_eq!(encoder.active_count(), 0);
    }

    #[tokio::test]
    async fn test_configured_failure() {
        let dir = TempDir::new().unwrap();
        let encoder = MockEncoder::new();
        encoder
            .fail_source(dir.path().join("bad.mp4"), "disk_full")
            .await;
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = encoder.run(request(dir.path(), 1, "bad"), tx).await;
        assert_eq!(
            outcome,
            EncodeOutcome::Failed {
                error_text: "disk_full".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_progress_samples() {
        let dir = TempDir::new().unwrap();
        let encoder = MockEncoder::new()
            .with_duration(Duration::from_millis(40))
            .with_progress_steps(4);
        let (tx, mut rx) = mpsc::unbounded_channel();

        encoder.run(request(dir.path(), 1, "a"), tx).await;

        let mut percents = Vec::new();
        while let Ok(event) = rx.try_recv() {
            percents.push(event.percent);
        }
        assert_eq!(percents, vec![25, 50, 75, 100]);
    }

    #[tokio::test]
    async fn test_kill_all_deletes_partial_outputs() {
        let dir = TempDir::new().unwrap();
        let encoder = std::sync::Arc::new(
            MockEncoder::new()
                .with_duration(Duration::from_secs(30))
                .with_partial_bytes(2048),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let run = tokio::spawn({
            let encoder = std::sync::Arc::clone(&encoder);
            let request = request(dir.path(), 1, "slow");
            async move { encoder.run(request, tx).await }
        });

        // Wait for the partial output to appear.
        for _ in 0..100 {
            if dir.path().join("slow.mp3").exists() && encoder.active_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            std::fs::metadata(dir.path().join("slow.mp3")).unwrap().len(),
            2048
        );

        let deleted = encoder.kill_all(true);
        assert_eq!(deleted, vec![dir.path().join("slow.mp3")]);
        assert!(!dir.path().join("slow.mp3").exists());

        let outcome = run.await.unwrap();
        assert_eq!(outcome, EncodeOutcome::Cancelled);
        assert_eq!(encoder.active_count(), 0);
    }
}
