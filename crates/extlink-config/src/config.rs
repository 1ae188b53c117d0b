use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Lower-case name, as accepted by `tracing` filters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Connection and handshake settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name reported in the initialize request.
    #[serde(default = "default_name")]
    pub name: String,
    /// Workspace root sent to the server.
    #[serde(default)]
    pub root_uri: Option<String>,
    /// Upper bound on the `shutdown` request (1..=60000 ms).
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Passed verbatim to the server as `initializationOptions`.
    #[serde(default)]
    pub initialization_options: Option<toml::Table>,
}

fn default_name() -> String {
    "extlink".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

impl ClientConfig {
    /// The shutdown timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            root_uri: None,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            initialization_options: None,
        }
    }
}

/// Reaction to transport errors and closure.
///
/// The defaults keep the client running on errors and never reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Errors tolerated before shutting down (0 = never shut down).
    #[serde(default)]
    pub max_errors: u32,
    /// Reconnects allowed within the window (0 = never reconnect).
    #[serde(default)]
    pub max_restarts: u32,
    /// Sliding window for `max_restarts`, in seconds.
    #[serde(default = "default_restart_window_secs")]
    pub restart_window_secs: u64,
}

fn default_restart_window_secs() -> u64 {
    180
}

impl RecoveryConfig {
    /// The restart window as a [`Duration`].
    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_errors: 0,
            max_restarts: 0,
            restart_window_secs: default_restart_window_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Log file; stderr when unset. Relative paths land in the platform
    /// log directory.
    pub file: Option<PathBuf>,
}

/// Top-level extlink configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection and handshake settings.
    #[serde(default)]
    pub client: ClientConfig,
    /// Error and close policy.
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.client.name, "extlink");
        assert!(cfg.client.root_uri.is_none());
        assert!(cfg.client.initialization_options.is_none());
        assert_eq!(cfg.client.shutdown_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.recovery.max_errors, 0);
        assert_eq!(cfg.recovery.max_restarts, 0);
        assert_eq!(cfg.recovery.restart_window(), Duration::from_secs(180));
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
    }

    #[test]
    fn parse_from_toml_string() {
        let input = r#"
[client]
name = "editor"
root_uri = "file:///work"
shutdown_timeout_ms = 500

[client.initialization_options]
trace = "verbose"
paths = ["a", "b"]

[recovery]
max_restarts = 4
"#;
        let cfg: Config = toml::from_str(input).expect("parse toml");
        assert_eq!(cfg.client.name, "editor");
        assert_eq!(cfg.client.root_uri.as_deref(), Some("file:///work"));
        assert_eq!(cfg.client.shutdown_timeout_ms, 500);
        let options = cfg.client.initialization_options.expect("options");
        assert_eq!(options.get("trace").and_then(|v| v.as_str()), Some("verbose"));
        assert_eq!(
            options.get("paths").and_then(|v| v.as_array()).map(Vec::len),
            Some(2)
        );
        assert_eq!(cfg.recovery.max_restarts, 4);
        // Unspecified fields keep defaults via serde(default)
        assert_eq!(cfg.recovery.restart_window_secs, 180);
        assert_eq!(cfg.log, LogConfig::default());
    }

    #[test]
    fn toml_roundtrip_keeps_nested_options() {
        let mut options = toml::Table::new();
        options.insert("depth".into(), toml::Value::Integer(3));
        let cfg = Config {
            client: ClientConfig {
                initialization_options: Some(options),
                ..ClientConfig::default()
            },
            log: LogConfig {
                level: LogLevel::Trace,
                file: Some(PathBuf::from("/tmp/extlink.log")),
            },
            ..Config::default()
        };
        let toml_str = toml::to_string(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn log_level_names() {
        assert_eq!(LogLevel::Trace.as_str(), "trace");
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        let level: LogLevel = toml::from_str::<LogConfig>("level = \"error\"")
            .expect("parse")
            .level;
        assert_eq!(level, LogLevel::Error);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").expect("parse empty toml");
        assert_eq!(cfg, Config::default());
    }
}
