//! Configuration for extlink clients.
//!
//! Settings come from `Config::default()`, then the global `config.toml`,
//! then the nearest project `.extlink/config.toml`, later sources winning.
pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod validate;

pub use config::{ClientConfig, Config, LogConfig, LogLevel, RecoveryConfig};
pub use error::ConfigError;
pub use load::{load_config, load_file, load_from_str};
