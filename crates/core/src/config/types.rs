use serde::{Deserialize, Serialize};

use crate::encoder::EncoderSettings;

/// Root configuration (`voxtract.toml`). Every section is optional;
/// command-line flags override anything set here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub encoder: EncoderSettings,
}

/// Pipeline defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Worker pool size.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Walker directory concurrency.
    #[serde(default = "default_scanners")]
    pub scanners: usize,
    /// Recursive walk.
    #[serde(default)]
    pub recursive: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            scanners: default_scanners(),
            recursive: false,
        }
    }
}

fn default_concurrency() -> usize {
    10
}

fn default_scanners() -> usize {
    5
}
