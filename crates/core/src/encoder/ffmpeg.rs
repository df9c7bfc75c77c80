//! FFmpeg-based encoder driver.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use super::config::EncoderSettings;
use super::error::{EncoderError, FailureKind};
use super::progress::ProgressParser;
use super::registry;
use super::traits::Encoder;
use super::types::{EncodeOutcome, EncodeRequest, ProgressEvent};

/// Retained diagnostic output is capped; the tail is kept because late
/// failures (disk full) surface at the end of the stream.
const DIAGNOSTICS_CAP: usize = 8 * 1024;

/// FFmpeg-based encoder driver.
pub struct FfmpegEncoder {
    settings: EncoderSettings,
    verbose: bool,
}

impl FfmpegEncoder {
    /// Creates a new driver with the given settings.
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            settings,
            verbose: false,
        }
    }

    /// Creates a driver with default speech-extraction settings.
    pub fn with_defaults() -> Self {
        Self::new(EncoderSettings::default())
    }

    /// Forwards the child's diagnostic stream to the log when set.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builds the fixed argument shape for one conversion.
    fn build_args(&self, source: &Path, target: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            source.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-ar".to_string(),
            self.settings.sample_rate.to_string(),
            "-ac".to_string(),
            self.settings.channels.to_string(),
            "-b:a".to_string(),
            self.settings.bitrate.clone(),
            "-acodec".to_string(),
            self.settings.codec.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-y".to_string(),
            target.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn run(
        &self,
        request: EncodeRequest,
        progress_tx: mpsc::UnboundedSender<ProgressEvent>,
    ) -> EncodeOutcome {
        let args = self.build_args(&request.source, &request.target);

        let mut child = match Command::new(self.settings.encoder_binary())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return EncodeOutcome::Failed {
                    error_text: e.to_string(),
                }
            }
        };

        let mut kill_rx = registry::register(request.job_id, request.target.clone());

        let stderr = child.stderr.take().expect("stderr is piped");
        let mut reader = BufReader::new(stderr).lines();
        let mut parser = ProgressParser::new();
        let mut diagnostics = String::new();
        let mut killed = false;
        let mut kill_watch_live = true;

        loop {
            tokio::select! {
                line = reader.next_line() => match line {
                    Ok(Some(line)) => {
                        if self.verbose {
                            debug!(job_id = request.job_id, "{line}");
                        }
                        capture_diagnostic(&mut diagnostics, &line);
                        if let Some(sample) = parser.feed(&line) {
                            let _ = progress_tx.send(ProgressEvent {
                                job_id: request.job_id,
                                percent: sample.percent,
                                time_secs: sample.time_secs,
                                duration_secs: parser.duration_secs(),
                            });
                        }
                    }
                    Ok(None) | Err(_) => break,
                },
                changed = kill_rx.changed(), if kill_watch_live => match changed {
                    Ok(()) => {
                        if *kill_rx.borrow_and_update() {
                            killed = true;
                            let _ = child.start_kill();
                            break;
                        }
                    }
                    Err(_) => kill_watch_live = false,
                },
            }
        }

        let status = child.wait().await;
        registry::deregister(request.job_id);

        if killed {
            return EncodeOutcome::Cancelled;
        }

        match status {
            Ok(status) if status.success() => {
                // A missing target is tolerated and reported as zero bytes.
                let output_bytes = tokio::fs::metadata(&request.target)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                EncodeOutcome::Completed { output_bytes }
            }
            Ok(status) => match status.code() {
                Some(code) => EncodeOutcome::Failed {
                    error_text: FailureKind::classify(code, &diagnostics).as_error_text(),
                },
                // Terminated by a signal we did not send.
                None => EncodeOutcome::Cancelled,
            },
            Err(e) => EncodeOutcome::Failed {
                error_text: e.to_string(),
            },
        }
    }

    fn kill(&self, job_id: u64) -> bool {
        registry::kill(job_id)
    }

    fn kill_all(&self, cleanup_outputs: bool) -> Vec<PathBuf> {
        registry::kill_all(cleanup_outputs)
    }

    fn active_count(&self) -> usize {
        registry::active_count()
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        let encoder = self.settings.encoder_binary();
        check_binary(&encoder)
            .await
            .map_err(|e| match e {
                BinaryCheck::Missing => EncoderError::BinaryNotFound { path: encoder },
                BinaryCheck::Io(e) => EncoderError::Io(e),
            })?;

        let probe = self.settings.probe_binary();
        check_binary(&probe).await.map_err(|e| match e {
            BinaryCheck::Missing => EncoderError::ProbeNotFound { path: probe },
            BinaryCheck::Io(e) => EncoderError::Io(e),
        })?;

        Ok(())
    }
}

enum BinaryCheck {
    Missing,
    Io(std::io::Error),
}

async fn check_binary(path: &Path) -> Result<(), BinaryCheck> {
    match Command::new(path).arg("-version").output().await {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(BinaryCheck::Missing),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BinaryCheck::Missing),
        Err(e) => Err(BinaryCheck::Io(e)),
    }
}

/// Retains non-progress diagnostic lines for failure classification. The
/// `-progress pipe:2` key-value stream floods stderr and carries nothing
/// classifiable, so it is filtered out.
fn capture_diagnostic(diagnostics: &mut String, line: &str) {
    if is_progress_line(line) {
        return;
    }
    if diagnostics.len() + line.len() > DIAGNOSTICS_CAP {
        let excess = (diagnostics.len() + line.len()).saturating_sub(DIAGNOSTICS_CAP);
        let cut = diagnostics
            .char_indices()
            .map(|(i, _)| i)
            .find(|&i| i >= excess)
            .unwrap_or(diagnostics.len());
        diagnostics.drain(..cut);
    }
    diagnostics.push_str(line);
    diagnostics.push('\n');
}

fn is_progress_line(line: &str) -> bool {
    match line.split_once('=') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_fixed_shape() {
        let encoder = FfmpegEncoder::with_defaults();
        let args = encoder.build_args(Path::new("/in/clip.mp4"), Path::new("/in/clip.mp3"));

        assert_eq!(
            args,
            vec![
                "-i",
                "/in/clip.mp4",
                "-vn",
                "-ar",
                "16000",
                "-ac",
                "1",
                "-b:a",
                "32k",
                "-acodec",
                "libmp3lame",
                "-progress",
                "pipe:2",
                "-y",
                "/in/clip.mp3",
            ]
        );
    }

    #[test]
    fn test_build_args_custom_settings() {
        let settings = EncoderSettings::default()
            .with_sample_rate(22_050)
            .with_channels(2);
        let encoder = FfmpegEncoder::new(settings);
        let args = encoder.build_args(Path::new("/a.mkv"), Path::new("/a.mp3"));

        assert!(args.contains(&"22050".to_string()));
        assert!(args.contains(&"2".to_string()));
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(is_progress_line("out_time_ms=50000000"));
        assert!(is_progress_line("progress=continue"));
        assert!(is_progress_line("speed=12.5x"));
        assert!(!is_progress_line("  Duration: 00:01:00.00, start: 0.0"));
        assert!(!is_progress_line("bad.mp4: No such file or directory"));
        assert!(!is_progress_line("size= 128kB time=00:00:30.00"));
    }

    #[test]
    fn test_capture_diagnostic_keeps_tail_under_cap() {
        let mut diagnostics = String::new();
        for i in 0..2000 {
            capture_diagnostic(&mut diagnostics, &format!("error line number {i}"));
        }
        assert!(diagnostics.len() <= DIAGNOSTICS_CAP + 64);
        assert!(diagnostics.contains("error line number 1999"));
        assert!(!diagnostics.contains("error line number 0\n"));
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;
        use tokio::sync::mpsc;

        fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        fn encoder_with_script(script: PathBuf) -> FfmpegEncoder {
            FfmpegEncoder::new(EncoderSettings::default().with_binary_path(script))
        }

        #[tokio::test]
        async fn test_run_success_reports_progress_and_output_size() {
            let dir = TempDir::new().unwrap();
            let script = write_script(
                dir.path(),
                "fake-encoder",
                r#"for a; do target=$a; done
echo "Duration: 00:01:40.00, start: 0.000000" >&2
echo "out_time_ms=50000000" >&2
echo "out_time_ms=100000000" >&2
printf 'audio' > "$target"
exit 0
"#,
            );

            let encoder = encoder_with_script(script);
            let target = dir.path().join("clip.mp3");
            let (tx, mut rx) = mpsc::unbounded_channel();

            let outcome = encoder
                .run(
                    EncodeRequest {
                        job_id: 8_000_001,
                        source: dir.path().join("clip.mp4"),
                        target: target.clone(),
                    },
                    tx,
                )
                .await;

            assert_eq!(outcome, EncodeOutcome::Completed { output_bytes: 5 });
            assert_eq!(encoder.active_count(), 0);

            let mut percents = Vec::new();
            while let Ok(event) = rx.try_recv() {
                percents.push(event.percent);
            }
            assert_eq!(percents, vec![50, 100]);
        }

        #[tokio::test]
        async fn test_run_failure_is_classified() {
            let dir = TempDir::new().unwrap();
            let script = write_script(
                dir.path(),
                "fake-encoder",
                "echo 'Invalid data found when processing input' >&2\nexit 1\n",
            );

            let encoder = encoder_with_script(script);
            let (tx, _rx) = mpsc::unbounded_channel();

            let outcome = encoder
                .run(
                    EncodeRequest {
                        job_id: 8_000_002,
                        source: dir.path().join("bad.mp4"),
                        target: dir.path().join("bad.mp3"),
                    },
                    tx,
                )
                .await;

            assert_eq!(
                outcome,
                EncodeOutcome::Failed {
                    error_text: "invalid_input".to_string()
                }
            );
        }

        #[tokio::test]
        async fn test_run_spawn_error_is_failed() {
            let encoder = encoder_with_script(PathBuf::from("/nonexistent/encoder"));
            let (tx, _rx) = mpsc::unbounded_channel();

            let outcome = encoder
                .run(
                    EncodeRequest {
                        job_id: 8_000_003,
                        source: PathBuf::from("/a.mp4"),
                        target: PathBuf::from("/a.mp3"),
                    },
                    tx,
                )
                .await;

            assert!(matches!(outcome, EncodeOutcome::Failed { .. }));
        }

        #[tokio::test]
        async fn test_kill_cancels_running_child() {
            let dir = TempDir::new().unwrap();
            let script = write_script(dir.path(), "fake-encoder", "sleep 30\n");
            let encoder = std::sync::Arc::new(encoder_with_script(script));
            let (tx, _rx) = mpsc::unbounded_channel();

            let job_id = 8_000_004;
            let run = tokio::spawn({
                let encoder = std::sync::Arc::clone(&encoder);
                let source = dir.path().join("slow.mp4");
                let target = dir.path().join("slow.mp3");
                async move {
                    encoder
                        .run(
                            EncodeRequest {
                                job_id,
                                source,
                                target,
                            },
                            tx,
                        )
                        .await
                }
            });

            // Wait for the child to register, then kill it.
            for _ in 0..100 {
                if registry::kill(job_id) {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }

            let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), run)
                .await
                .expect("kill must terminate the child promptly")
                .unwrap();
            assert_eq!(outcome, EncodeOutcome::Cancelled);
        }

        #[tokio::test]
        async fn test_validate_missing_binary() {
            let encoder = encoder_with_script(PathBuf::from("/nonexistent/encoder"));
            let result = encoder.validate().await;
            assert!(matches!(
                result,
                Err(EncoderError::BinaryNotFound { .. })
            ));
        }
    }
}
