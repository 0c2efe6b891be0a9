use crate::types::SafeEntry;
use crate::utils::same_address;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

const SETTINGS_FILE: &str = "strongbox_settings.json";

/// A user-defined custom network with its own Safe transaction service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomNetwork {
    /// Display name for the network
    pub label: String,
    /// Chain ID (must be unique)
    pub chain_id: u64,
    /// Native token symbol (e.g., "ETH", "xDAI")
    pub native_token: String,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Safe transaction service base URL (…/api)
    pub tx_service_url: String,
}

impl CustomNetwork {
    pub fn new(
        label: String,
        chain_id: u64,
        native_token: String,
        rpc_url: String,
        tx_service_url: String,
    ) -> Self {
        Self {
            label,
            chain_id,
            native_token,
            rpc_url,
            tx_service_url,
        }
    }
}

fn default_use_ledger() -> bool {
    true
}

/// User settings that persist between sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    /// Selected network chain ID
    pub selected_chain_id: u64,
    /// Tracked Safes, in the order they were added
    #[serde(default)]
    pub safes: Vec<SafeEntry>,
    /// Address of the Safe opened on startup
    #[serde(default)]
    pub selected_safe: Option<String>,
    /// Custom RPC overrides per chain ID
    #[serde(default)]
    pub custom_rpcs: HashMap<u64, String>,
    /// User-defined custom networks
    #[serde(default)]
    pub custom_networks: Vec<CustomNetwork>,
    /// Sign with a Ledger device; otherwise PRIVATE_KEY from the environment is used
    #[serde(default = "default_use_ledger")]
    pub use_ledger: bool,
    /// Ledger Live account index used for signing
    #[serde(default)]
    pub ledger_account_index: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            selected_chain_id: 11155111, // Sepolia by default
            safes: Vec::new(),
            selected_safe: None,
            custom_rpcs: HashMap::new(),
            custom_networks: Vec::new(),
            use_ledger: default_use_ledger(),
            ledger_account_index: 0,
        }
    }
}

impl UserSettings {
    /// Get the settings file path
    fn settings_path() -> PathBuf {
        // Try to use the app data directory, fall back to current directory
        if let Some(config_dir) = dirs::config_dir() {
            let app_dir = config_dir.join("strongbox");
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

    /// Get the settings file path for display
    pub fn settings_path_display() -> String {
        Self::settings_path().display().to_string()
    }

    /// Track a Safe. An address that is already tracked only gets its name updated.
    /// Returns true when a new entry was added.
    pub fn add_safe(&mut self, entry: SafeEntry) -> bool {
        if let Some(existing) = self
            .safes
            .iter_mut()
            .find(|s| same_address(&s.address, &entry.address))
        {
            existing.name = entry.name;
            return false;
        }
        self.safes.push(entry);
        true
    }

    /// Stop tracking a Safe; clears the selection if it pointed at it
    pub fn remove_safe(&mut self, address: &str) -> bool {
        let initial_len = self.safes.len();
        self.safes.retain(|s| !same_address(&s.address, address));
        if self
            .selected_safe
            .as_deref()
            .map(|selected| same_address(selected, address))
            .unwrap_or(false)
        {
            self.selected_safe = None;
        }
        self.safes.len() < initial_len
    }

    pub fn rename_safe(&mut self, address: &str, name: &str) -> bool {
        match self
            .safes
            .iter_mut()
            .find(|s| same_address(&s.address, address))
        {
            Some(entry) => {
                entry.name = name.trim().to_string();
                true
            }
            None => false,
        }
    }

    pub fn get_safe(&self, address: &str) -> Option<&SafeEntry> {
        self.safes.iter().find(|s| same_address(&s.address, address))
    }

    /// Get custom RPC for a chain, or None if using default
    pub fn get_custom_rpc(&self, chain_id: u64) -> Option<&String> {
        self.custom_rpcs.get(&chain_id).filter(|s| !s.is_empty())
    }

    /// Set custom RPC for a chain (empty string removes the override)
    pub fn set_custom_rpc(&mut self, chain_id: u64, rpc: String) {
        if rpc.trim().is_empty() {
            self.custom_rpcs.remove(&chain_id);
        } else {
            self.custom_rpcs.insert(chain_id, rpc.trim().to_string());
        }
    }

    /// Add a custom network (returns false if chain_id already exists)
    pub fn add_custom_network(&mut self, network: CustomNetwork) -> bool {
        if self.custom_networks.iter().any(|n| n.chain_id == network.chain_id) {
            return false;
        }
        self.custom_networks.push(network);
        true
    }

    /// Get a custom network by chain_id
    pub fn get_custom_network(&self, chain_id: u64) -> Option<&CustomNetwork> {
        self.custom_networks.iter().find(|n| n.chain_id == chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devnet() -> CustomNetwork {
        CustomNetwork::new(
            "Devnet".to_string(),
            31337,
            "DEV".to_string(),
            "http://localhost:8545".to_string(),
            "http://localhost:8000/api".to_string(),
        )
    }

    // ==================== UserSettings::default tests ====================

    #[test]
    fn test_user_settings_default_values() {
        let settings = UserSettings::default();
        assert_eq!(settings.selected_chain_id, 11155111);
        assert!(settings.safes.is_empty());
        assert!(settings.selected_safe.is_none());
        assert!(settings.use_ledger);
        assert_eq!(settings.ledger_account_index, 0);
    }

    #[test]
    fn test_user_settings_missing_fields_use_defaults() {
        let settings: UserSettings = serde_json::from_str(r#"{"selected_chain_id": 1}"#).unwrap();
        assert_eq!(settings.selected_chain_id, 1);
        assert!(settings.safes.is_empty());
        assert!(settings.use_ledger);
    }

    // ==================== safe tracking tests ====================

    #[test]
    fn test_add_safe_new_entry() {
        let mut settings = UserSettings::default();
        assert!(settings.add_safe(SafeEntry::new("Treasury", "0xAbC1")));
        assert_eq!(settings.safes.len(), 1);
    }

    #[test]
    fn test_add_safe_duplicate_address_renames() {
        let mut settings = UserSettings::default();
        settings.add_safe(SafeEntry::new("Treasury", "0xAbC1"));

        let added = settings.add_safe(SafeEntry::new("Ops", "0xabc1"));

        assert!(!added);
        assert_eq!(settings.safes.len(), 1);
        assert_eq!(settings.safes[0].name, "Ops");
        assert_eq!(settings.safes[0].address, "0xAbC1");
    }

    #[test]
    fn test_remove_safe_clears_selection() {
        let mut settings = UserSettings::default();
        settings.add_safe(SafeEntry::new("Treasury", "0xAbC1"));
        settings.selected_safe = Some("0xABC1".to_string());

        assert!(settings.remove_safe("0xabc1"));
        assert!(settings.safes.is_empty());
        assert!(settings.selected_safe.is_none());
    }

    #[test]
    fn test_remove_safe_non_existing() {
        let mut settings = UserSettings::default();
        assert!(!settings.remove_safe("0x1"));
    }

    #[test]
    fn test_rename_safe() {
        let mut settings = UserSettings::default();
        settings.add_safe(SafeEntry::new("Treasury", "0xAbC1"));

        assert!(settings.rename_safe("0xabc1", "  Vault "));
        assert_eq!(settings.get_safe("0xABC1").unwrap().name, "Vault");
        assert!(!settings.rename_safe("0x2", "x"));
    }

    // ==================== custom network / rpc tests ====================

    #[test]
    fn test_add_custom_network_duplicate_chain_id_fails() {
        let mut settings = UserSettings::default();
        assert!(settings.add_custom_network(devnet()));

        let mut other = devnet();
        other.label = "Other".to_string();

        assert!(!settings.add_custom_network(other));
        assert_eq!(settings.get_custom_network(31337).unwrap().label, "Devnet");
    }

    #[test]
    fn test_set_custom_rpc_trims_and_removes() {
        let mut settings = UserSettings::default();

        settings.set_custom_rpc(1, "  https://my-eth-node.com  ".to_string());
        assert_eq!(settings.get_custom_rpc(1).unwrap(), "https://my-eth-node.com");

        settings.set_custom_rpc(1, "   ".to_string());
        assert!(settings.get_custom_rpc(1).is_none());
    }
}
