use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, merging or validating client settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// The commented default `config.toml` could not be written.
    #[error("failed to create default config: {0}")]
    CreateDefault(String),

    /// A config source is not valid TOML or does not match the schema.
    #[error("TOML parse error: {0}")]
    Parse(String),

    /// A setting is out of range.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// The dotted field path (e.g. `client.shutdown_timeout_ms`).
        field: String,
        /// What is wrong with the value.
        message: String,
    },

    /// Reading or writing a config file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
