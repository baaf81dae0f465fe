//! Standard locations for pipeline configuration files

use std::path::PathBuf;

/// Get the default configuration directory
///
/// Returns: `<user config dir>/render-core` (e.g. `~/.config/render-core`)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("render-core")
}

/// Get the default path of a config file
///
/// # Arguments
/// * `filename` - Config file name (e.g., "pipeline.yaml")
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
