use crate::config::NetworkName;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

const SETTINGS_FILE: &str = "fundpg_settings.json";

fn default_preferred_network() -> NetworkName {
    NetworkName::Mainnet
}

fn default_ledger_index() -> Option<u32> {
    None // None means use FUNDPG_LEDGER_INDEX or account 0
}

fn default_last_run_id() -> Option<String> {
    None
}

/// User settings that persist between sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSettings {
    /// Network selected when a run supports it
    #[serde(default = "default_preferred_network")]
    pub preferred_network: NetworkName,
    /// Last chosen funding token per network
    #[serde(default)]
    pub preferred_tokens: HashMap<NetworkName, String>,
    /// Custom RPC overrides per chain ID
    #[serde(default)]
    pub custom_rpcs: HashMap<u64, String>,
    /// Ledger Live account index override
    #[serde(default = "default_ledger_index")]
    pub ledger_index: Option<u32>,
    /// Run reopened on startup when none is given on the command line
    #[serde(default = "default_last_run_id")]
    pub last_run_id: Option<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            preferred_network: default_preferred_network(),
            preferred_tokens: HashMap::new(),
            custom_rpcs: HashMap::new(),
            ledger_index: default_ledger_index(),
            last_run_id: default_last_run_id(),
        }
    }
}

impl UserSettings {
    /// Get the settings file path
    fn settings_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            let app_dir = config_dir.join("fundpg");
            if !app_dir.exists() {
                let _ = fs::create_dir_all(&app_dir);
            }
            app_dir.join(SETTINGS_FILE)
        } else {
            PathBuf::from(SETTINGS_FILE)
        }
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        let path = Self::settings_path();
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => {
                        tracing::info!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse settings file: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read settings file: {}", e);
                }
            }
        }
        tracing::info!("Using default settings");
        Self::default()
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::settings_path();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        tracing::info!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn preferred_token(&self, network: NetworkName) -> Option<&str> {
        self.preferred_tokens.get(&network).map(|s| s.as_str())
    }

    /// Remember the network and token of the latest selection
    pub fn remember_selection(&mut self, network: NetworkName, token: &str) {
        self.preferred_network = network;
        self.preferred_tokens.insert(network, token.to_string());
    }
}
