use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
/// (`VOXTRACT_` prefix, `__` as the section separator, e.g.
/// `VOXTRACT_ENCODER__SAMPLE_RATE=22050`).
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("VOXTRACT_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[pipeline]
concurrency = 4
recursive = true

[encoder]
sample_rate = 22050
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.pipeline.concurrency, 4);
        assert!(config.pipeline.recursive);
        assert_eq!(config.encoder.sample_rate, 22050);
        // Untouched sections keep their defaults.
        assert_eq!(config.pipeline.scanners, 5);
        assert_eq!(config.encoder.codec, "libmp3lame");
    }

    #[test]
    fn test_load_config_from_str_empty_is_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.pipeline.concurrency, 10);
    }

    #[test]
    fn test_load_config_from_str_invalid() {
        let result = load_config_from_str("[pipeline]\nconcurrency = \"lots\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/voxtract.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[encoder]
bitrate = "64k"
channels = 2
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.encoder.bitrate, "64k");
        assert_eq!(config.encoder.channels, 2);
    }
}
