//! Logging bootstrap.
//!
//! Library crates only emit `tracing` events. This module installs the
//! subscriber for an embedding application and keeps the log file bounded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use extlink_config::{LogConfig, LogLevel};
use tracing_subscriber::EnvFilter;

/// Size at which the log file is rotated (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files kept next to the live one.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// Platform-specific default log file path.
///
/// * macOS: `$HOME/Library/Logs/extlink/extlink.log`
/// * Linux: `$HOME/.local/state/extlink/extlink.log`
/// * Windows: `%LOCALAPPDATA%/extlink/logs/extlink.log`
/// * Fallback: `<tmp>/extlink/extlink.log`
pub fn default_log_file_path() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Logs/extlink/extlink.log");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Some(state) = std::env::var_os("XDG_STATE_HOME") {
            return PathBuf::from(state).join("extlink/extlink.log");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".local/state/extlink/extlink.log");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("LOCALAPPDATA") {
            return PathBuf::from(appdata).join("extlink\\logs\\extlink.log");
        }
    }
    std::env::temp_dir().join("extlink").join("extlink.log")
}

/// Where `file` is written: absolute paths as given, relative ones under
/// the directory of [`default_log_file_path`].
pub fn resolve_log_file(file: &Path) -> PathBuf {
    if file.is_absolute() {
        return file.to_path_buf();
    }
    match default_log_file_path().parent() {
        Some(dir) => dir.join(file),
        None => file.to_path_buf(),
    }
}

/// Create the parent directory of `log_path` if it is missing.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Rotate `log_path` once it reaches `max_size` bytes.
///
/// ```text
///   extlink.log   -> extlink.log.1
///   extlink.log.1 -> extlink.log.2
///   ...
///   extlink.log.<max_files> is deleted
/// ```
///
/// A missing or smaller file is left alone.
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let size = match fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if size < max_size {
        return Ok(());
    }
    if max_files == 0 {
        return fs::remove_file(log_path);
    }

    match fs::remove_file(rotated_path(log_path, max_files)) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    for index in (1..max_files).rev() {
        let from = rotated_path(log_path, index);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, index + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))
}

/// Filter for `level`, unless `RUST_LOG` is set.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global `tracing` subscriber described by `config`.
///
/// With a `file`, output is appended to it (rotating first, ANSI off);
/// otherwise it goes to stderr. A relative `file` is resolved by
/// [`resolve_log_file`].
///
/// # Errors
///
/// Fails when the log file cannot be prepared or a global subscriber is
/// already installed.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(config.level));

    let installed = match &config.file {
        Some(file) => {
            let path = &resolve_log_file(file);
            ensure_log_dir(path)
                .with_context(|| format!("failed to create log directory for {}", path.display()))?;
            rotate_log_files(path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)
                .with_context(|| format!("failed to rotate {}", path.display()))?;
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
    tracing::debug!("logging initialized at level {}", config.level.as_str());
    Ok(())
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{index}"));
    base.with_file_name(name)
}
