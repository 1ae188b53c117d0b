use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate_first;

/// Directory holding a project-level config.
pub const PROJECT_CONFIG_DIR: &str = ".extlink";

/// File name of both the global and the project config.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Content written into a newly-created default config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# extlink configuration
# Uncomment and edit settings below to override defaults.

# [client]
# name = "extlink"
# root_uri = "file:///path/to/workspace"
# shutdown_timeout_ms = 2000

# [client.initialization_options]
# Passed to the server as-is.

# [recovery]
# max_errors = 0            # 0 = keep running on every error
# max_restarts = 0          # 0 = never reconnect after a close
# restart_window_secs = 180

# [log]
# level = "info"
# file = "/path/to/extlink.log"
"#;

/// Load and merge configuration.
///
/// 1. Reads the global config from `config_dir/config.toml`, creating it
///    with commented-out defaults when missing.
/// 2. Looks for `.extlink/config.toml` in `project_dir` and its ancestors.
/// 3. Merges `Config::default() <- global <- project` and validates.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, or
/// validation failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join(CONFIG_FILE_NAME);

    if !global_path.exists() {
        std::fs::create_dir_all(config_dir)?;
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!("created default config at {}", global_path.display());
    }

    let mut config = Config::default();

    let global_content = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global_content) {
        config = merge_configs(&config, &global_content)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!("merging project config {}", project_path.display());
        let project_content = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project_content)?;
    }

    validate_first(&config)?;
    Ok(config)
}

/// Load a single config file layered over the defaults.
///
/// # Errors
///
/// [`ConfigError::NotFound`] when `path` does not exist, otherwise as
/// [`load_from_str`].
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let config = merge_configs(&Config::default(), &content)?;
    validate_first(&config)?;
    Ok(config)
}

/// Walk from `start` upward looking for `.extlink/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_CONFIG_DIR).join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Returns `true` when the content has at least one
/// non-empty, non-comment line.
fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_first(&config)?;
    Ok(config)
}
