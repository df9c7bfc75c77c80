//! Error types and failure classification for the encoder driver.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by encoder preflight validation.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// Encoder binary not found or not executable.
    #[error("encoder binary not found: {path}")]
    BinaryNotFound { path: PathBuf },

    /// Probe binary not found or not executable.
    #[error("probe binary not found: {path}")]
    ProbeNotFound { path: PathBuf },

    /// I/O error while validating the binaries.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classified reason a child exited non-zero, matched against its captured
/// diagnostic output. Matching is case-insensitive substring, in the order
/// the variants are declared; the first hit wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InputNotFound,
    PermissionDenied,
    InvalidInput,
    DiskFull,
    CodecUnavailable,
    EncoderExit(i32),
}

impl FailureKind {
    /// Classifies a non-zero exit by its diagnostic output.
    pub fn classify(exit_code: i32, diagnostics: &str) -> Self {
        let lower = diagnostics.to_lowercase();
        if lower.contains("no such file or directory") {
            Self::InputNotFound
        } else if lower.contains("permission denied") {
            Self::PermissionDenied
        } else if lower.contains("invalid data found") {
            Self::InvalidInput
        } else if lower.contains("no space left on device") {
            Self::DiskFull
        } else if lower.contains("unknown encoder") {
            Self::CodecUnavailable
        } else {
            Self::EncoderExit(exit_code)
        }
    }

    /// The stable error text recorded against the job and the ledger.
    pub fn as_error_text(&self) -> String {
        match self {
            Self::InputNotFound => "input_not_found".to_string(),
            Self::PermissionDenied => "permission_denied".to_string(),
            Self::InvalidInput => "invalid_input".to_string(),
            Self::DiskFull => "disk_full".to_string(),
            Self::CodecUnavailable => "codec_unavailable".to_string(),
            Self::EncoderExit(code) => format!("encoder_exit_{code}"),
        }
    }
}
