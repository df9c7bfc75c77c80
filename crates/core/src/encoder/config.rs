//! Configuration for the external encoder.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings applied to every encoder invocation.
///
/// Defaults target speech: 16 kHz mono MP3 at 32 kbit/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Explicit path to the encoder binary. When absent, `ffmpeg` is
    /// resolved through the ambient executable search path.
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Output sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Output channel count (1 = mono).
    #[serde(default = "default_channels")]
    pub channels: u8,

    /// Output audio bitrate, encoder syntax (e.g. "32k").
    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// Output audio codec.
    #[serde(default = "default_codec")]
    pub codec: String,
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_channels() -> u8 {
    1
}

fn default_bitrate() -> String {
    "32k".to_string()
}

fn default_codec() -> String {
    "libmp3lame".to_string()
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            binary_path: None,
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bitrate: default_bitrate(),
            codec: default_codec(),
        }
    }
}

impl EncoderSettings {
    /// The encoder binary to spawn: the configured path, or `ffmpeg` for
    /// search-path resolution.
    pub fn encoder_binary(&self) -> PathBuf {
        self.binary_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }

    /// The sibling probe binary: `ffprobe` next to an explicit encoder
    /// path, or `ffprobe` from the search path.
    pub fn probe_binary(&self) -> PathBuf {
        match &self.binary_path {
            Some(path) => match path.parent() {
                Some(dir) if dir != std::path::Path::new("") => dir.join("ffprobe"),
                _ => PathBuf::from("ffprobe"),
            },
            None => PathBuf::from("ffprobe"),
        }
    }

    /// Sets an explicit encoder binary path.
    pub fn with_binary_path(mut self, path: PathBuf) -> Self {
        self.binary_path = Some(path);
        self
    }

    /// Sets the output sample rate.
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Sets the output channel count.
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = EncoderSettings::default();
        assert_eq!(settings.sample_rate, 16_000);
        assert_eq!(settings.channels, 1);
        assert_eq!(settings.bitrate, "32k");
        assert_eq!(settings.codec, "libmp3lame");
        assert!(settings.binary_path.is_none());
    }

    #[test]
    fn test_binary_resolution_falls_back_to_search_path() {
        let settings = EncoderSettings::default();
        assert_eq!(settings.encoder_binary(), PathBuf::from("ffmpeg"));
        assert_eq!(settings.probe_binary(), PathBuf::from("ffprobe"));
    }

    #[test]
    fn test_probe_binary_is_sibling_of_explicit_path() {
        let settings = EncoderSettings::default()
            .with_binary_path(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(
            settings.encoder_binary(),
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg")
        );
        assert_eq!(
            settings.probe_binary(),
            PathBuf::from("/opt/ffmpeg/bin/ffprobe")
        );
    }

    #[test]
    fn test_probe_binary_bare_name() {
        let settings = EncoderSettings::default().with_binary_path(PathBuf::from("ffmpeg"));
        assert_eq!(settings.probe_binary(), PathBuf::from("ffprobe"));
    }

    #[test]
    fn test_settings_serialization() {
        let settings = EncoderSettings::default().with_sample_rate(22_050);
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: EncoderSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, settings);
    }
}
