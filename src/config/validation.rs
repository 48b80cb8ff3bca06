use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_stream_config(config)?;
    validate_replay_config(config)?;
    validate_log_level(config)?;
    validate_log_format(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_stream_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.stream.max_line_bytes == 0 {
        return Err(validation_err(
            "stream.max_line_bytes must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_replay_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.replay.chunk_size == 0 {
        return Err(validation_err("replay.chunk_size must be greater than 0"));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

fn validate_log_format(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_formats = ["text", "json"];
    if !valid_formats.contains(&config.features.log_format.to_lowercase().as_str()) {
        return Err(validation_err(format!(
            "log_format must be one of {valid_formats:?}"
        )));
    }
    Ok(())
}
