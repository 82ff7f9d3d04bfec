//! YAML configuration loading and saving

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load a configuration from a YAML file
///
/// A missing file gives the defaults. An unreadable or invalid file is
/// logged and also gives the defaults, so a broken config never keeps the
/// server from starting.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("[CONFIG] {} not found, using defaults", path.display());
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("[CONFIG] Cannot read {}: {}, using defaults", path.display(), e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("[CONFIG] Loaded {}", path.display());
            config
        }
        Err(e) => {
            log::warn!("[CONFIG] Invalid {}: {}, using defaults", path.display(), e);
            T::default()
        }
    }
}

/// Save a configuration as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;

    log::info!("[CONFIG] Saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config: ServerConfig = load_config(Path::new("/nonexistent/alchemy/server.yaml"));
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.yaml");
        std::fs::write(&path, "sample_rate: [not, a, number]").unwrap();

        let config: ServerConfig = load_config(&path);
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.yaml");
        let config = ServerConfig {
            sample_rate: 44100,
            delimiter: ';',
            realtime_priority: None,
            ..ServerConfig::default()
        };

        save_config(&config, &path).unwrap();
        let loaded: ServerConfig = load_config(&path);
        assert_eq!(loaded, config);
    }
}
