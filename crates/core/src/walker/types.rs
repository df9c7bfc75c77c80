//! Types for the directory walker.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Video file extensions recognized by the walker (case-insensitive).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "wmv", "mov", "webm", "flv"];

/// Checks if a path has a recognized video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Why the walker declined to queue a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The converted audio already exists alongside the video.
    SiblingAudio,
    /// A transcript already exists alongside the video.
    SiblingSubtitle,
}

/// A video file the walker has classified as needing conversion.
///
/// Created by the walker, consumed by the pool's enqueue, then discarded.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Full path to the video file.
    pub path: PathBuf,
    /// File name without extension.
    pub basename: String,
    /// Lowercased extension.
    pub extension: String,
    /// Containing directory.
    pub directory: PathBuf,
    /// File size at discovery time.
    pub size_bytes: u64,
    /// Derived conversion target: `<directory>/<basename>.mp3`.
    pub target_path: PathBuf,
    pub has_sibling_audio: bool,
    pub has_sibling_subtitle: bool,
}

/// Counters accumulated over one walk, returned in the terminal event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkStats {
    /// Recognized video files seen.
    pub total_found: u64,
    /// Files emitted for conversion.
    pub to_process: u64,
    /// Files skipped because converted audio already exists.
    pub skipped_audio: u64,
    /// Files skipped because a transcript already exists.
    pub skipped_subtitle: u64,
    /// Directories or files that could not be read.
    pub errors: u64,
}

/// One event in the walker's lazy output sequence.
#[derive(Debug)]
pub enum WalkEvent {
    /// A file that needs conversion.
    File(DiscoveredFile),
    /// A recognized video file that will not be converted.
    Skipped { path: PathBuf, reason: SkipReason },
    /// A subdirectory queued for descent.
    Directory(PathBuf),
    /// A directory or file that could not be read; the walk continues.
    Error { path: PathBuf, message: String },
    /// The walk is finished. Always the last event.
    Complete(WalkStats),
}
