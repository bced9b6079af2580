// ============================================================
// Layer 6 — Node Settings
// ============================================================
// Everything a node needs to build its synapse, in one JSON
// file:
//
//   {
//     "network": { "embedding_dim": 512, "vocab_size": 50258 },
//     "synapse": { "embedding_dim": 512, "num_layers": 3, ... }
//   }
//
// The network section is what the node believes the network
// requires; the synapse section is the local model config.
// They are stored side by side so that a mismatch is caught
// by SynapseConfig::validate() when the model is built, not
// silently papered over when the file is read.
//
// Reference: Rust Book §9 (Error Handling with anyhow)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::domain::network::NetworkParameters;
use crate::ml::config::SynapseConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub network: NetworkParameters,
    pub synapse: SynapseConfig,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            network: NetworkParameters::default(),
            synapse: SynapseConfig::new(),
        }
    }
}

/// Reads and writes NodeSettings at a fixed path.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the settings file. Fails if it is missing or invalid.
    pub fn load(&self) -> Result<NodeSettings> {
        let json = fs::read_to_string(&self.path).with_context(|| {
            format!(
                "Cannot read settings from '{}'. \
                 Run 'init-config' to create one.",
                self.path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid settings in '{}'", self.path.display()))
    }

    /// Load the settings file, or fall back to the network
    /// defaults if it does not exist yet.
    pub fn load_or_default(&self) -> Result<NodeSettings> {
        if self.path.exists() {
            self.load()
        } else {
            tracing::info!("No settings at '{}', using defaults", self.path.display());
            Ok(NodeSettings::default())
        }
    }

    /// Write `settings` as pretty JSON, creating parent
    /// directories as needed.
    pub fn save(&self, settings: &NodeSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Cannot write settings to '{}'", self.path.display()))?;

        tracing::debug!("Saved settings to '{}'", self.path.display());
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("synapse_node_settings_{}_{name}", std::process::id()))
            .join("node.json")
    }

    #[test]
    fn test_save_then_load() {
        let path  = temp_path("save_load");
        let store = SettingsStore::new(&path);

        let mut settings = NodeSettings::default();
        settings.synapse = settings.synapse.with_top_k(4).with_dropout(0.0);
        store.save(&settings).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.network, settings.network);
        assert_eq!(loaded.synapse.top_k, 4);
        assert_eq!(loaded.synapse.dropout, 0.0);
        assert_eq!(loaded.synapse.embedding_dim, 512);

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let store    = SettingsStore::new(temp_path("missing"));
        let settings = store.load_or_default().unwrap();
        assert_eq!(settings.network, NetworkParameters::default());
        assert!(settings.synapse.validate(&settings.network).is_ok());
        assert!(store.load().is_err());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let path = temp_path("invalid");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let err = SettingsStore::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("Invalid settings"));

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
