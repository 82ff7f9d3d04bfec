//! Effect catalog
//!
//! The list of effects a client may add to the chain, with enough
//! information to instantiate each one: native effects by identifier,
//! LADSPA plugins by `(plugin file, label)`. A default catalog is compiled
//! in; a JSON file configured by the user replaces it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{native, Effect};
use crate::ladspa::{self, PluginError};

const BUILTIN_CATALOG: &str = include_str!("effects.json");

/// Errors that can occur while loading or using the catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("No such effect in the catalog: {0}")]
    NotFound(String),

    #[error("Catalog entry {0} is incomplete: {1}")]
    Incomplete(String, &'static str),

    #[error("Plugin file {0} not found in the LADSPA search path")]
    PluginFileNotFound(String),

    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectCategory {
    AmpModel,
    CabinetModel,
    Distortion,
    Ambient,
    Modulation,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginType {
    Native,
    Ladspa,
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Short name clients use in `ADD_EFFECT`
    pub id: String,
    pub name: String,
    pub category: EffectCategory,
    pub plugin_type: PluginType,
    /// Shared library file name (LADSPA only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_file: Option<String>,
    /// LADSPA label, or the native identifier when it differs from `id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// The set of effects available to clients
#[derive(Debug, Clone, Default)]
pub struct EffectCatalog {
    entries: Vec<CatalogEntry>,
}

impl EffectCatalog {
    /// The compiled-in catalog
    pub fn builtin() -> Self {
        Self::from_json(BUILTIN_CATALOG).unwrap_or_else(|e| {
            log::error!("[CATALOG] Built-in catalog is invalid: {}", e);
            Self::default()
        })
    }

    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Ok(Self { entries })
    }

    /// Load a catalog file
    pub fn load(path: &Path) -> CatalogResult<Self> {
        log::info!("[CATALOG] Loading {:?}", path);
        let catalog = Self::from_json(&std::fs::read_to_string(path)?)?;
        log::info!("[CATALOG] {} effect(s) available", catalog.entries.len());
        Ok(catalog)
    }

    /// Load `path` if given, falling back to the built-in catalog
    pub fn load_or_builtin(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::load(path).unwrap_or_else(|e| {
                log::warn!("[CATALOG] {}, using built-in catalog", e);
                Self::builtin()
            }),
            None => Self::builtin(),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Instantiate the effect `id`
    ///
    /// Native effects get `channels` inputs and outputs; LADSPA plugins
    /// bring their own port layout. Plugin files are looked up in
    /// `search_path` in order (absolute file names are used as is).
    pub fn create_effect(
        &self,
        id: &str,
        channels: usize,
        sample_rate: u32,
        search_path: &[PathBuf],
    ) -> CatalogResult<Box<dyn Effect>> {
        let entry = self
            .get(id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

        match entry.plugin_type {
            PluginType::Native => {
                let native_id = entry.label.as_deref().unwrap_or(&entry.id);
                native::create(native_id, channels.max(1), sample_rate)
                    .ok_or_else(|| CatalogError::NotFound(native_id.to_string()))
            }
            PluginType::Ladspa => {
                let file = entry
                    .plugin_file
                    .as_deref()
                    .ok_or_else(|| CatalogError::Incomplete(entry.id.clone(), "missing plugin_file"))?;
                let label = entry
                    .label
                    .as_deref()
                    .ok_or_else(|| CatalogError::Incomplete(entry.id.clone(), "missing label"))?;
                let path = resolve_plugin_file(file, search_path)
                    .ok_or_else(|| CatalogError::PluginFileNotFound(file.to_string()))?;
                let effect = ladspa::load_effect(&path, label, sample_rate)?;
                Ok(Box::new(effect))
            }
        }
    }
}

/// Find a plugin file in the search path
pub fn resolve_plugin_file(file: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    let direct = Path::new(file);
    if direct.is_absolute() {
        return direct.exists().then(|| direct.to_path_buf());
    }
    search_path
        .iter()
        .map(|dir| dir.join(file))
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Portable;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = EffectCatalog::builtin();
        assert!(catalog.entries().len() >= 4);
        let tone = catalog.get("tone").unwrap();
        assert_eq!(tone.plugin_type, PluginType::Native);
        assert_eq!(tone.label.as_deref(), Some("filter"));
        let cab = catalog.get("cabinet").unwrap();
        assert_eq!(cab.category, EffectCategory::CabinetModel);
    }

    #[test]
    fn test_create_native_effect_with_channels() {
        let catalog = EffectCatalog::builtin();
        let effect = catalog.create_effect("tone", 2, 44100, &[]).unwrap();
        assert_eq!(effect.name(), "Tone Filter");
        assert_eq!(effect.input_count(), 2);
        assert_eq!(effect.sample_rate(), 44100);
    }

    #[test]
    fn test_unknown_effect_is_not_found() {
        let catalog = EffectCatalog::builtin();
        assert!(matches!(
            catalog.create_effect("flanger", 1, 48000, &[]),
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_plugin_file() {
        let catalog = EffectCatalog::from_json(
            r#"[{"id": "x", "name": "X", "category": "other", "plugin_type": "LADSPA",
                 "plugin_file": "does_not_exist.so", "label": "x"}]"#,
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            catalog.create_effect("x", 1, 48000, &[dir.path().to_path_buf()]),
            Err(CatalogError::PluginFileNotFound(_))
        ));
    }

    #[test]
    fn test_incomplete_ladspa_entry() {
        let catalog = EffectCatalog::from_json(
            r#"[{"id": "x", "name": "X", "category": "other", "plugin_type": "LADSPA"}]"#,
        )
        .unwrap();
        assert!(matches!(
            catalog.create_effect("x", 1, 48000, &[]),
            Err(CatalogError::Incomplete(_, _))
        ));
    }

    #[test]
    fn test_load_or_builtin_falls_back() {
        let catalog = EffectCatalog::load_or_builtin(Some(Path::new("/nonexistent/catalog.json")));
        assert!(catalog.get("gain").is_some());
    }

    #[test]
    fn test_resolve_plugin_file_in_search_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fake.so"), b"").unwrap();
        let found = resolve_plugin_file("fake.so", &[PathBuf::from("/nonexistent"), dir.path().to_path_buf()]);
        assert_eq!(found, Some(dir.path().join("fake.so")));
    }
}
