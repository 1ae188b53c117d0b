use crate::config::Config;
use crate::error::ConfigError;

/// Layer a TOML fragment over `base`.
///
/// Keys in `overlay_toml` win; everything else keeps its `base` value.
/// Nested tables, including `client.initialization_options`, merge per key.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let mut merged =
        toml::Value::try_from(base).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let overlay: toml::Table =
        toml::from_str(overlay_toml).map_err(|e| ConfigError::Parse(e.to_string()))?;

    merge_table(&mut merged, overlay);

    merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))
}

/// Deep merge. Non-table values (arrays included) are replaced.
fn merge_table(base: &mut toml::Value, overlay: toml::Table) {
    let toml::Value::Table(base_table) = base else {
        *base = toml::Value::Table(overlay);
        return;
    };
    for (key, value) in overlay {
        match value {
            toml::Value::Table(nested)
                if matches!(base_table.get(&key), Some(toml::Value::Table(_))) =>
            {
                if let Some(existing) = base_table.get_mut(&key) {
                    merge_table(existing, nested);
                }
            }
            value => {
                base_table.insert(key, value);
            }
        }
    }
}
