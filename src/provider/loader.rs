//! Provider definition loader
//!
//! Loads provider configs from YAML files:
//! - Global: ~/.config/evalai/providers/*.yaml (XDG_CONFIG_HOME)
//! - Project: .evalai/providers/*.yaml
//!
//! Project configs override global configs with the same name, and both
//! override the built-in presets.

use super::config::ProviderConfig;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Load all provider configs from global and project directories
///
/// Priority: project configs override global configs
pub fn load_provider_configs(working_dir: &Path) -> HashMap<String, ProviderConfig> {
    let mut configs = HashMap::new();

    if let Some(global_dir) = global_config_dir() {
        load_configs_from_dir(&global_dir, &mut configs);
    }

    let project_dir = working_dir.join(".evalai").join("providers");
    load_configs_from_dir(&project_dir, &mut configs);

    configs
}

/// Resolve a provider by name: definition files first, then built-in presets
pub fn resolve_provider(name: &str, working_dir: &Path) -> Result<ProviderConfig> {
    let key = name.to_lowercase();
    if let Some(config) = load_provider_configs(working_dir).remove(&key) {
        return Ok(config);
    }
    ProviderConfig::preset(&key)
        .ok_or_else(|| Error::InvalidRequest(format!("Unknown provider '{}'", name)))
}

/// Uses XDG_CONFIG_HOME or falls back to ~/.config
fn global_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("evalai").join("providers"))
}

/// Load all .yaml files from a directory into the configs map
fn load_configs_from_dir(dir: &Path, configs: &mut HashMap<String, ProviderConfig>) {
    if !dir.is_dir() {
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();

        let ext = path.extension().and_then(|e| e.to_str());
        if !matches!(ext, Some("yaml") | Some("yml")) {
            continue;
        }

        // Provider key is the lowercased file stem
        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(n) => n.to_lowercase(),
            None => continue,
        };

        match load_config_file(&path) {
            Ok(config) => {
                configs.insert(name, config);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load provider config");
            }
        }
    }
}

/// Load a single provider config from a YAML file
pub fn load_config_file(path: &Path) -> Result<ProviderConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidRequest(format!("Failed to read {}: {}", path.display(), e)))?;

    serde_yaml::from_str(&content)
        .map_err(|e| Error::InvalidRequest(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Save a provider config to a YAML file
pub fn save_provider_config(path: &Path, config: &ProviderConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InvalidRequest(format!("Failed to create directory: {}", e)))?;
    }

    let content = serde_yaml::to_string(config)
        .map_err(|e| Error::InvalidRequest(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, content)
        .map_err(|e| Error::InvalidRequest(format!("Failed to write {}: {}", path.display(), e)))
}
