//! Core pipeline for batch speech-audio extraction.
//!
//! Given a root directory, a parallel walker discovers video files, a
//! bounded work pool drives one external encoder child per job, and a
//! durable per-directory ledger records every attempt so interrupted or
//! failed runs can be resumed or cleaned up deterministically.
//!
//! Data flow: walker → pool → encoder driver → ledger → observer.
//! Control flow: signal handler → controller → pool shutdown → child kill.

pub mod config;
pub mod encoder;
pub mod ledger;
pub mod pipeline;
pub mod pool;
pub mod testing;
pub mod walker;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use encoder::{Encoder, EncoderError, EncoderSettings, FfmpegEncoder};
pub use ledger::{LedgerError, LedgerRecord, LedgerStats, RecordState, SqliteLedger};
pub use pipeline::{
    cleanup, verify, IdleReason, PipelineController, PipelineError, PipelineOptions, RunOutcome,
    ShutdownRequest, VerifyReport,
};
pub use pool::{
    Job, JobState, NullObserver, PoolConfig, PoolObserver, PoolSnapshot, QueueSummary, WorkPool,
};
pub use walker::{DiscoveredFile, SkipReason, WalkEvent, WalkStats, WalkerConfig};
