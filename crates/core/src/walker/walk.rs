//! Parallel traversal over a shared directory queue.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;
use tracing::warn;

use crate::ledger::{RecordState, SqliteLedger};

use super::types::{is_video_file, DiscoveredFile, SkipReason, WalkEvent, WalkStats};

/// Capacity of the event channel between the walker and its consumer.
const EVENT_BUFFER: usize = 256;

/// Inputs shaping one walk.
#[derive(Debug, Clone, Copy)]
pub struct WalkerConfig {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Number of cooperative directory workers, clamped to `[1, 20]`.
    pub scanners: usize,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            scanners: 5,
        }
    }
}

/// Handle for stopping a walk early (shutdown cooperation).
#[derive(Clone)]
pub struct WalkerHandle {
    shared: Arc<Shared>,
}

impl WalkerHandle {
    /// Asks the workers to stop. The walk still ends with a `Complete`
    /// event carrying the partial stats.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }
}

#[derive(Default)]
struct StatCounters {
    total_found: AtomicU64,
    to_process: AtomicU64,
    skipped_audio: AtomicU64,
    skipped_subtitle: AtomicU64,
    errors: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> WalkStats {
        WalkStats {
            total_found: self.total_found.load(Ordering::Relaxed),
            to_process: self.to_process.load(Ordering::Relaxed),
            skipped_audio: self.skipped_audio.load(Ordering::Relaxed),
            skipped_subtitle: self.skipped_subtitle.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

struct Shared {
    queue: Mutex<VecDeque<PathBuf>>,
    /// Directories queued or currently being enumerated. The walk is
    /// quiescent when this reaches zero.
    outstanding: AtomicUsize,
    notify: Notify,
    stop: AtomicBool,
    stats: StatCounters,
    recursive: bool,
    ledger: Arc<SqliteLedger>,
    events: mpsc::Sender<WalkEvent>,
}

/// Starts a walk rooted at `root`. Returns the event stream and a handle
/// for early termination. The stream always ends with exactly one
/// `Complete(stats)` event.
pub fn spawn(
    root: PathBuf,
    config: WalkerConfig,
    ledger: Arc<SqliteLedger>,
) -> (mpsc::Receiver<WalkEvent>, WalkerHandle) {
    let (events, rx) = mpsc::channel(EVENT_BUFFER);
    let scanners = config.scanners.clamp(1, 20);

    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::from([root])),
        outstanding: AtomicUsize::new(1),
        notify: Notify::new(),
        stop: AtomicBool::new(false),
        stats: StatCounters::default(),
        recursive: config.recursive,
        ledger,
        events,
    });

    let handle = WalkerHandle {
        shared: Arc::clone(&shared),
    };

    tokio::spawn(async move {
        let mut workers = JoinSet::new();
        for _ in 0..scanners {
            let shared = Arc::clone(&shared);
            workers.spawn(worker(shared));
        }
        while workers.join_next().await.is_some() {}

        let stats = shared.stats.snapshot();
        let _ = shared.events.send(WalkEvent::Complete(stats)).await;
    });

    (rx, handle)
}

async fn worker(shared: Arc<Shared>) {
    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }

        let dir = shared.queue.lock().unwrap().pop_front();
        if let Some(dir) = dir {
            process_directory(&shared, &dir).await;
            if shared.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
                shared.notify.notify_waiters();
                break;
            }
            continue;
        }

        if shared.outstanding.load(Ordering::SeqCst) == 0 {
            break;
        }

        // Enable the waiter before re-checking so a wakeup between the
        // check and the await cannot be lost.
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if shared.stop.load(Ordering::SeqCst)
            || shared.outstanding.load(Ordering::SeqCst) == 0
            || !shared.queue.lock().unwrap().is_empty()
        {
            continue;
        }
        notified.await;
    }
}

fn push_directory(shared: &Shared, dir: PathBuf) {
    shared.outstanding.fetch_add(1, Ordering::SeqCst);
    shared.queue.lock().unwrap().push_back(dir);
    shared.notify.notify_one();
}

async fn emit(shared: &Shared, event: WalkEvent) {
    // A dropped consumer aborts the walk; nothing is listening anymore.
    if shared.events.send(event).await.is_err() {
        shared.stop.store(true, Ordering::SeqCst);
        shared.notify.notify_waiters();
    }
}

async fn emit_error(shared: &Shared, path: &Path, error: impl std::fmt::Display) {
    shared.stats.errors.fetch_add(1, Ordering::Relaxed);
    emit(
        shared,
        WalkEvent::Error {
            path: path.to_path_buf(),
            message: error.to_string(),
        },
    )
    .await;
}

async fn process_directory(shared: &Shared, dir: &Path) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            emit_error(shared, dir, e).await;
            return;
        }
    };

    loop {
        if shared.stop.load(Ordering::SeqCst) {
            return;
        }
        match entries.next_entry().await {
            Ok(Some(entry)) => handle_entry(shared, entry).await,
            Ok(None) => return,
            Err(e) => {
                emit_error(shared, dir, e).await;
                return;
            }
        }
    }
}

async fn handle_entry(shared: &Shared, entry: tokio::fs::DirEntry) {
    let path = entry.path();

    let file_type = match entry.file_type().await {
        Ok(file_type) => file_type,
        Err(e) => {
            emit_error(shared, &path, e).await;
            return;
        }
    };

    if file_type.is_dir() {
        if shared.recursive && !is_hidden(&path) {
            push_directory(shared, path.clone());
            emit(shared, WalkEvent::Directory(path)).await;
        }
        return;
    }

    if !file_type.is_file() || !is_video_file(&path) {
        return;
    }

    classify_candidate(shared, entry, path).await;
}

async fn classify_candidate(shared: &Shared, entry: tokio::fs::DirEntry, path: PathBuf) {
    shared.stats.total_found.fetch_add(1, Ordering::Relaxed);

    let metadata = match entry.metadata().await {
        Ok(metadata) => metadata,
        Err(e) => {
            emit_error(shared, &path, e).await;
            return;
        }
    };

    let basename = match path.file_stem() {
        Some(stem) => stem.to_string_lossy().to_string(),
        None => return,
    };
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let directory = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let target_path = directory.join(format!("{basename}.mp3"));
    let subtitle_path = directory.join(format!("{basename}.srt"));

    let has_sibling_audio = tokio::fs::try_exists(&target_path).await.unwrap_or(false);
    let has_sibling_subtitle = tokio::fs::try_exists(&subtitle_path).await.unwrap_or(false);

    if has_sibling_subtitle {
        shared
            .stats
            .skipped_subtitle
            .fetch_add(1, Ordering::Relaxed);
        emit(
            shared,
            WalkEvent::Skipped {
                path,
                reason: SkipReason::SiblingSubtitle,
            },
        )
        .await;
        return;
    }

    let record = match shared.ledger.get(&path) {
        Ok(record) => record,
        Err(e) => {
            // An unreadable ledger never blocks the walk; reconvert.
            warn!(path = %path.display(), error = %e, "ledger lookup failed");
            None
        }
    };

    // An existing target skips the file unless the ledger marks the prior
    // attempt as interrupted or failed; those partial outputs are
    // reconverted.
    let finished = match &record {
        Some(record) => record.state == RecordState::Complete,
        None => true,
    };

    if has_sibling_audio && finished {
        shared.stats.skipped_audio.fetch_add(1, Ordering::Relaxed);
        emit(
            shared,
            WalkEvent::Skipped {
                path,
                reason: SkipReason::SiblingAudio,
            },
        )
        .await;
        return;
    }

    shared.stats.to_process.fetch_add(1, Ordering::Relaxed);
    emit(
        shared,
        WalkEvent::File(DiscoveredFile {
            basename,
            extension,
            directory,
            size_bytes: metadata.len(),
            target_path,
            has_sibling_audio,
            has_sibling_subtitle,
            path,
        }),
    )
    .await;
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn collect_events(
        root: &Path,
        config: WalkerConfig,
        ledger: Arc<SqliteLedger>,
    ) -> (Vec<WalkEvent>, WalkStats) {
        let (mut rx, _handle) = spawn(root.to_path_buf(), config, ledger);
        let mut events = Vec::new();
        let mut stats = WalkStats::default();
        while let Some(event) = rx.recv().await {
            if let WalkEvent::Complete(s) = &event {
                stats = *s;
            }
            events.push(event);
        }
        (events, stats)
    }

    fn test_ledger(root: &Path) -> Arc<SqliteLedger> {
        Arc::new(SqliteLedger::open(root).unwrap())
    }

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[tokio::test]
    async fn test_flat_walk_finds_candidates() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("one.mp4"));
        touch(&dir.path().join("two.mkv"));
        touch(&dir.path().join("notes.txt"));

        let (events, stats) =
            collect_events(dir.path(), WalkerConfig::default(), test_ledger(dir.path())).await;

        let files: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                WalkEvent::File(f) => Some(f.basename.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(files.len(), 2);
        assert!(files.contains(&"one".to_string()));
        assert!(files.contains(&"two".to_string()));
        assert_eq!(stats.total_found, 2);
        assert_eq!(stats.to_process, 2);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_target_path_is_sibling_mp3() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("talk.mp4"));

        let (events, _) =
            collect_events(dir.path(), WalkerConfig::default(), test_ledger(dir.path())).await;

        let file = events
            .iter()
            .find_map(|e| match e {
                WalkEvent::File(f) => Some(f),
                _ => None,
            })
            .unwrap();
        assert_eq!(file.target_path, dir.path().join("talk.mp3"));
        assert_eq!(file.extension, "mp4");
        assert!(!file.has_sibling_audio);
    }

    #[tokio::test]
    async fn test_sibling_audio_skips() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("done.mp4"));
        touch(&dir.path().join("done.mp3"));

        let (events, stats) =
            collect_events(dir.path(), WalkerConfig::default(), test_ledger(dir.path())).await;

        assert!(events.iter().any(|e| matches!(
            e,
            WalkEvent::Skipped {
                reason: SkipReason::SiblingAudio,
                ..
            }
        )));
        assert_eq!(stats.skipped_audio, 1);
        assert_eq!(stats.to_process, 0);
    }

    #[tokio::test]
    async fn test_sibling_subtitle_wins_over_audio() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("talk.mp4"));
        touch(&dir.path().join("talk.mp3"));
        touch(&dir.path().join("talk.srt"));

        let (events, stats) =
            collect_events(dir.path(), WalkerConfig::default(), test_ledger(dir.path())).await;

        assert!(events.iter().any(|e| matches!(
            e,
            WalkEvent::Skipped {
                reason: SkipReason::SiblingSubtitle,
                ..
            }
        )));
        assert_eq!(stats.skipped_subtitle, 1);
        assert_eq!(stats.skipped_audio, 0);
    }

    #[tokio::test]
    async fn test_failed_ledger_state_reconverts_despite_sibling() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("retry.mp4");
        touch(&source);
        touch(&dir.path().join("retry.mp3"));

        let ledger = test_ledger(dir.path());
        ledger
            .start(&source, &dir.path().join("retry.mp3"), None)
            .unwrap();
        ledger.fail(&source, "encoder_exit_1").unwrap();

        let (_, stats) = collect_events(dir.path(), WalkerConfig::default(), ledger).await;
        assert_eq!(stats.to_process, 1);
        assert_eq!(stats.skipped_audio, 0);
    }

    #[tokio::test]
    async fn test_complete_ledger_with_missing_target_reconverts() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("gone.mp4");
        touch(&source);

        let ledger = test_ledger(dir.path());
        ledger
            .start(&source, &dir.path().join("gone.mp3"), None)
            .unwrap();
        ledger.complete(&source, 100).unwrap();
        // Target was deleted out of band.

        let (_, stats) = collect_events(dir.path(), WalkerConfig::default(), ledger).await;
        assert_eq!(stats.to_process, 1);
    }

    #[tokio::test]
    async fn test_non_recursive_ignores_subdirectories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested/inner.mp4"));
        touch(&dir.path().join("outer.mp4"));

        let (_, stats) =
            collect_events(dir.path(), WalkerConfig::default(), test_ledger(dir.path())).await;
        assert_eq!(stats.total_found, 1);
    }

    #[tokio::test]
    async fn test_recursive_descends_and_emits_directory_events() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        touch(&dir.path().join("a/one.mp4"));
        touch(&dir.path().join("a/b/two.mp4"));

        let config = WalkerConfig {
            recursive: true,
            scanners: 4,
        };
        let (events, stats) = collect_events(dir.path(), config, test_ledger(dir.path())).await;

        assert_eq!(stats.total_found, 2);
        let dirs = events
            .iter()
            .filter(|e| matches!(e, WalkEvent::Directory(_)))
            .count();
        assert_eq!(dirs, 2);
    }

    #[tokio::test]
    async fn test_hidden_directories_not_descended() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".cache")).unwrap();
        touch(&dir.path().join(".cache/clip.mp4"));

        let config = WalkerConfig {
            recursive: true,
            scanners: 2,
        };
        let (_, stats) = collect_events(dir.path(), config, test_ledger(dir.path())).await;
        assert_eq!(stats.total_found, 0);
    }

    #[tokio::test]
    async fn test_missing_root_emits_error_and_completes() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(dir.path());
        let missing = dir.path().join("nope");

        let (events, stats) = collect_events(&missing, WalkerConfig::default(), ledger).await;
        assert!(events.iter().any(|e| matches!(e, WalkEvent::Error { .. })));
        assert!(matches!(events.last(), Some(WalkEvent::Complete(_))));
        assert_eq!(stats.errors, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_directory_is_not_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        touch(&dir.path().join("ok.mp4"));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let config = WalkerConfig {
            recursive: true,
            scanners: 2,
        };
        let (_, stats) = collect_events(dir.path(), config, test_ledger(dir.path())).await;

        // Restore so TempDir can clean up.
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(stats.to_process, 1);
        assert_eq!(stats.errors, 1);
    }

    #[tokio::test]
    async fn test_stop_ends_walk_with_complete_event() {
        let dir = TempDir::new().unwrap();
        for i in 0..50 {
            touch(&dir.path().join(format!("clip{i}.mp4")));
        }

        let (mut rx, handle) = spawn(
            dir.path().to_path_buf(),
            WalkerConfig::default(),
            test_ledger(dir.path()),
        );
        handle.stop();

        let mut saw_complete = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, WalkEvent::Complete(_)) {
                saw_complete = true;
            }
        }
        assert!(saw_complete);
    }
}
