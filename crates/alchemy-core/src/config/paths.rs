//! Standard locations of configuration and plugin files

use std::path::PathBuf;

/// File name of the server configuration
pub const CONFIG_FILE: &str = "server.yaml";

/// Directory holding alchemy configuration
///
/// Returns: `~/.config/alchemy`
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("alchemy")
}

/// Path of a config file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

/// LADSPA search path
///
/// Entries of `$LADSPA_PATH` first, then the usual system directories.
pub fn default_ladspa_path() -> Vec<PathBuf> {
    let mut path: Vec<PathBuf> = std::env::var_os("LADSPA_PATH")
        .map(|value| std::env::split_paths(&value).collect())
        .unwrap_or_default();
    for dir in ["/usr/lib/ladspa", "/usr/local/lib/ladspa"] {
        let dir = PathBuf::from(dir);
        if !path.contains(&dir) {
            path.push(dir);
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path(CONFIG_FILE);
        assert!(path.ends_with("alchemy/server.yaml"));
    }

    #[test]
    fn test_ladspa_path_has_system_dirs() {
        let path = default_ladspa_path();
        assert!(path.contains(&PathBuf::from("/usr/lib/ladspa")));
    }
}
