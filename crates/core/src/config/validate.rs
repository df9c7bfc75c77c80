use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Pool and walker concurrency are non-zero
/// - Encoder settings are well-formed
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.pipeline.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.concurrency cannot be 0".to_string(),
        ));
    }
    if config.pipeline.scanners == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.scanners cannot be 0".to_string(),
        ));
    }
    if config.encoder.sample_rate == 0 {
        return Err(ConfigError::ValidationError(
            "encoder.sample_rate cannot be 0".to_string(),
        ));
    }
    if config.encoder.channels == 0 {
        return Err(ConfigError::ValidationError(
            "encoder.channels cannot be 0".to_string(),
        ));
    }
    if config.encoder.bitrate.is_empty() {
        return Err(ConfigError::ValidationError(
            "encoder.bitrate cannot be empty".to_string(),
        ));
    }
    if config.encoder.codec.is_empty() {
        return Err(ConfigError::ValidationError(
            "encoder.codec cannot be empty".to_string(),
        ));
    }

    Ok(())
}
