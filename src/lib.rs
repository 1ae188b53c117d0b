//! extlink: client-side lifecycle engine for extension/server connections.
//!
//! Re-exports the client and configuration crates and wires them together:
//! [`client_options`] turns a loaded [`Config`] into [`ClientOptions`], and
//! [`logging::init_logging`] installs the `tracing` subscriber.
pub mod logging;

pub use extlink_client::*;
pub use extlink_config::{
    load_config, load_file, load_from_str, ClientConfig, Config, ConfigError, LogConfig,
    LogLevel, RecoveryConfig,
};

/// Build [`ClientOptions`] from the `[client]` and `[recovery]` sections.
///
/// The recovery settings become a [`RestartLimitErrorHandler`].
///
/// # Errors
///
/// [`ConfigError::Validation`] when `client.initialization_options` cannot be
/// converted to JSON.
pub fn client_options(
    config: &Config,
    transport: impl TransportFactory + 'static,
) -> Result<ClientOptions, ConfigError> {
    let recovery = &config.recovery;
    let mut options = ClientOptions::new(transport)
        .with_shutdown_timeout(config.client.shutdown_timeout())
        .with_error_handler(RestartLimitErrorHandler::new(
            recovery.max_errors,
            recovery.max_restarts,
            recovery.restart_window(),
        ));

    if let Some(root_uri) = &config.client.root_uri {
        options = options.with_root_uri(root_uri.clone());
    }
    if let Some(table) = &config.client.initialization_options {
        let value = serde_json::to_value(table).map_err(|e| ConfigError::Validation {
            field: "client.initialization_options".to_string(),
            message: e.to_string(),
        })?;
        options = options.with_initialization_options(value);
    }
    Ok(options)
}

/// Create a [`Client`] named after `config.client.name`.
///
/// # Errors
///
/// As [`client_options`].
pub fn client_from_config(
    id: impl Into<String>,
    config: &Config,
    transport: impl TransportFactory + 'static,
) -> Result<Client, ConfigError> {
    let options = client_options(config, transport)?;
    Ok(Client::new(id, config.client.name.clone(), options))
}
