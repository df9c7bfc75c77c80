//! External encoder driver.
//!
//! One child process per job. The driver spawns the encoder, stream-parses
//! its diagnostic output for duration and progress, classifies failures,
//! and cooperates with kill requests through a process-global registry of
//! live children.

mod config;
mod error;
mod ffmpeg;
mod progress;
pub(crate) mod registry;
mod traits;
mod types;

pub use config::EncoderSettings;
pub use error::{EncoderError, FailureKind};
pub use ffmpeg::FfmpegEncoder;
pub use progress::ProgressParser;
pub use traits::Encoder;
pub use types::{EncodeOutcome, EncodeRequest, ProgressEvent};
