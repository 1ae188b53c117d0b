use crate::config::Config;
use crate::error::ConfigError;

/// Longest accepted shutdown timeout, in milliseconds.
pub const MAX_SHUTDOWN_TIMEOUT_MS: u64 = 60_000;

/// Validate a [`Config`], returning every violation found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.client.name.trim().is_empty() {
        errors.push(ConfigError::validation("client.name", "must not be empty"));
    }

    let timeout = config.client.shutdown_timeout_ms;
    if timeout == 0 || timeout > MAX_SHUTDOWN_TIMEOUT_MS {
        errors.push(ConfigError::validation(
            "client.shutdown_timeout_ms",
            format!("must be between 1 and {MAX_SHUTDOWN_TIMEOUT_MS}, got {timeout}"),
        ));
    }

    // A zero window would let every close through.
    if config.recovery.max_restarts > 0 && config.recovery.restart_window_secs == 0 {
        errors.push(ConfigError::validation(
            "recovery.restart_window_secs",
            "must be greater than 0 when max_restarts is set",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Collapse [`validate`] to its first violation.
pub(crate) fn validate_first(config: &Config) -> Result<(), ConfigError> {
    validate(config).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::validation("config", "validation failed"))
    })
}
