//! Parallel directory walker.
//!
//! Traverses an input root with a small pool of cooperative workers,
//! filters to recognized video extensions, probes for companion artifacts,
//! consults the ledger, and emits a lazy stream of typed events over a
//! bounded channel. The pipeline controller is the sole consumer.

mod types;
mod walk;

pub use types::{
    is_video_file, DiscoveredFile, SkipReason, WalkEvent, WalkStats, VIDEO_EXTENSIONS,
};
pub use walk::{spawn, WalkerConfig, WalkerHandle};
