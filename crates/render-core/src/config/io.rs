//! YAML persistence for configuration types
//!
//! Loading never fails: a missing, unreadable or malformed file yields the
//! type's default so a pipeline can always come up. Saving goes through a
//! sibling temp file and a rename, so a crash mid-write can't leave a
//! truncated config behind.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Parse `path`, or `Ok(None)` if there is nothing there
fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    let config = serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(Some(config))
}

/// Load a configuration from YAML, falling back to `T::default()`
///
/// Fields missing from the file take their defaults when `T` is
/// `#[serde(default)]`.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match read_yaml(path) {
        Ok(Some(config)) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Ok(None) => {
            log::info!("No config at {:?}, using defaults", path);
            T::default()
        }
        Err(e) => {
            log::warn!("{:#}, using defaults", e);
            T::default()
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Save a configuration as YAML, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    let staging = staging_path(path);
    std::fs::write(&staging, yaml).with_context(|| format!("Failed to write {:?}", staging))?;
    std::fs::rename(&staging, path).with_context(|| format!("Failed to replace {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}
