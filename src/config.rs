use anyhow::{anyhow, Result};
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use std::env;
use std::sync::Arc;
use url::Url;

/// Network category for grouping in the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkCategory {
    EthereumMainnet,
    EthereumTestnet,
    L2Mainnet,
    OtherMainnet,
}

/// A Safe-enabled EVM network: where to read the chain, where the Safe
/// transaction service lives, and which allowance module serves spending limits.
#[derive(Clone, Debug)]
pub struct EvmNetwork {
    pub label: &'static str,
    pub chain_id: u64,
    pub native_token: &'static str,
    pub native_decimals: u32,
    pub default_rpc: &'static str,
    pub tx_service_url: &'static str,
    pub allowance_module: Option<&'static str>,
    pub category: NetworkCategory,
}

impl EvmNetwork {
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        label: &'static str,
        chain_id: u64,
        native_token: &'static str,
        default_rpc: &'static str,
        tx_service_url: &'static str,
        allowance_module: Option<&'static str>,
        category: NetworkCategory,
    ) -> Self {
        Self {
            label,
            chain_id,
            native_token,
            native_decimals: 18,
            default_rpc,
            tx_service_url,
            allowance_module,
            category,
        }
    }
}

use NetworkCategory::*;

/// Allowance module v0.1.0 (mainnet and Gnosis Chain deployments)
const ALLOWANCE_MODULE_V010: &str = "0xCFbFaC74C26F8647cBDb8c5caf80BB5b32E43134";

/// Allowance module v0.1.1 (newer chains)
const ALLOWANCE_MODULE_V011: &str = "0xAA46724893dedD72658219405185Fb0Fc91e091C";

/// Networks with an official Safe transaction service.
pub const NETWORKS: &[EvmNetwork] = &[
    EvmNetwork::new(
        "Ethereum",
        1,
        "ETH",
        "https://ethereum-rpc.publicnode.com",
        "https://safe-transaction-mainnet.safe.global/api",
        Some(ALLOWANCE_MODULE_V010),
        EthereumMainnet,
    ),
    EvmNetwork::new(
        "Sepolia",
        11155111,
        "ETH",
        "https://ethereum-sepolia-rpc.publicnode.com",
        "https://safe-transaction-sepolia.safe.global/api",
        Some(ALLOWANCE_MODULE_V011),
        EthereumTestnet,
    ),
    EvmNetwork::new(
        "Optimism",
        10,
        "ETH",
        "https://mainnet.optimism.io",
        "https://safe-transaction-optimism.safe.global/api",
        Some(ALLOWANCE_MODULE_V011),
        L2Mainnet,
    ),
    EvmNetwork::new(
        "Arbitrum One",
        42161,
        "ETH",
        "https://arb1.arbitrum.io/rpc",
        "https://safe-transaction-arbitrum.safe.global/api",
        Some(ALLOWANCE_MODULE_V011),
        L2Mainnet,
    ),
    EvmNetwork::new(
        "Base",
        8453,
        "ETH",
        "https://mainnet.base.org",
        "https://safe-transaction-base.safe.global/api",
        Some(ALLOWANCE_MODULE_V011),
        L2Mainnet,
    ),
    EvmNetwork::new(
        "Polygon",
        137,
        "POL",
        "https://polygon-rpc.com",
        "https://safe-transaction-polygon.safe.global/api",
        Some(ALLOWANCE_MODULE_V011),
        L2Mainnet,
    ),
    EvmNetwork::new(
        "Linea",
        59144,
        "ETH",
        "https://rpc.linea.build",
        "https://safe-transaction-linea.safe.global/api",
        None,
        L2Mainnet,
    ),
    EvmNetwork::new(
        "Gnosis Chain",
        100,
        "xDAI",
        "https://rpc.gnosischain.com",
        "https://safe-transaction-gnosis-chain.safe.global/api",
        Some(ALLOWANCE_MODULE_V010),
        L2Mainnet,
    ),
    EvmNetwork::new(
        "BNB Chain",
        56,
        "BNB",
        "https://bsc-dataseed.binance.org",
        "https://safe-transaction-bsc.safe.global/api",
        None,
        OtherMainnet,
    ),
    EvmNetwork::new(
        "Avalanche C-Chain",
        43114,
        "AVAX",
        "https://api.avax.network/ext/bc/C/rpc",
        "https://safe-transaction-avalanche.safe.global/api",
        None,
        OtherMainnet,
    ),
    EvmNetwork::new(
        "Celo",
        42220,
        "CELO",
        "https://forno.celo.org",
        "https://safe-transaction-celo.safe.global/api",
        None,
        OtherMainnet,
    ),
];

/// Find a network by chain ID
pub fn find_network_by_chain_id(chain_id: u64) -> Option<&'static EvmNetwork> {
    NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

/// Find the index of a network in NETWORKS by chain ID
pub fn find_network_index(chain_id: u64) -> Option<usize> {
    NETWORKS.iter().position(|n| n.chain_id == chain_id)
}

/// Get the block explorer URL for a given chain ID
pub fn get_block_explorer_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://etherscan.io"),
        11155111 => Some("https://sepolia.etherscan.io"),
        10 => Some("https://optimistic.etherscan.io"),
        42161 => Some("https://arbiscan.io"),
        8453 => Some("https://basescan.org"),
        137 => Some("https://polygonscan.com"),
        59144 => Some("https://lineascan.build"),
        100 => Some("https://gnosisscan.io"),
        56 => Some("https://bscscan.com"),
        43114 => Some("https://snowtrace.io"),
        42220 => Some("https://celoscan.io"),
        _ => None,
    }
}

/// Get the full URL to view a transaction on the block explorer
pub fn get_tx_explorer_url(chain_id: u64, tx_hash: &str) -> Option<String> {
    get_block_explorer_url(chain_id).map(|base| format!("{}/tx/{}", base, tx_hash))
}

/// Get the full URL to view an address on the block explorer
pub fn get_address_explorer_url(chain_id: u64, address: &str) -> Option<String> {
    get_block_explorer_url(chain_id).map(|base| format!("{}/address/{}", base, address))
}

/// Default interval between transaction list refreshes
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

#[derive(Clone, Debug)]
pub struct Config {
    pub rpc_url: String,
    pub chain_id: u64,
    pub tx_service_url: String,
    pub spending_limit_module: Option<Address>,
    pub poll_interval_secs: u64,
    pub ledger_account_index: u32,
    // Overrides for custom networks
    pub native_token_override: Option<String>,
    pub label_override: Option<String>,
}

/// `TX_SERVICE_URL` wins over the network's own service URL
fn resolve_tx_service_url(env_value: Option<String>, network_url: &str) -> String {
    env_value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| network_url.to_string())
        .trim()
        .trim_end_matches('/')
        .to_string()
}

impl Config {
    pub fn new(rpc_url: String, chain_id: u64) -> Self {
        let network = find_network_by_chain_id(chain_id);

        let tx_service_url = resolve_tx_service_url(
            env::var("TX_SERVICE_URL").ok(),
            network.map(|n| n.tx_service_url).unwrap_or_default(),
        );

        let spending_limit_module = env::var("SPENDING_LIMIT_MODULE")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .or_else(|| {
                network
                    .and_then(|n| n.allowance_module)
                    .and_then(|a| a.parse().ok())
            });

        let poll_interval_secs = env::var("TX_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        Self {
            rpc_url,
            chain_id,
            tx_service_url,
            spending_limit_module,
            poll_interval_secs,
            ledger_account_index: 0,
            native_token_override: None,
            label_override: None,
        }
    }

    pub fn from_network(network: &EvmNetwork) -> Self {
        let rpc_url = env::var("RPC_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| network.default_rpc.to_string());
        Self::new(rpc_url, network.chain_id)
    }

    /// Create config from a custom network
    pub fn from_custom_network(network: &crate::user_settings::CustomNetwork) -> Self {
        let mut config = Self::new(network.rpc_url.clone(), network.chain_id);
        config.tx_service_url =
            resolve_tx_service_url(env::var("TX_SERVICE_URL").ok(), &network.tx_service_url);
        config.native_token_override = Some(network.native_token.clone());
        config.label_override = Some(network.label.clone());
        config
    }

    pub fn native_token(&self) -> &str {
        if let Some(ref token) = self.native_token_override {
            token.as_str()
        } else {
            find_network_by_chain_id(self.chain_id)
                .map(|n| n.native_token)
                .unwrap_or("ETH")
        }
    }

    pub fn native_decimals(&self) -> u32 {
        find_network_by_chain_id(self.chain_id)
            .map(|n| n.native_decimals)
            .unwrap_or(18)
    }

    pub fn network_label(&self) -> &str {
        if let Some(ref label) = self.label_override {
            label.as_str()
        } else {
            find_network_by_chain_id(self.chain_id)
                .map(|n| n.label)
                .unwrap_or("Unknown")
        }
    }

    pub fn get_provider(&self) -> Result<Arc<Provider<Http>>> {
        let url = Url::parse(&self.rpc_url)?;
        let provider = Provider::<Http>::try_from(url.as_str())?;
        Ok(Arc::new(provider))
    }

    /// Allowance module address, required for spending-limit transfers
    pub fn require_spending_limit_module(&self) -> Result<Address> {
        self.spending_limit_module.ok_or_else(|| {
            anyhow!(
                "No spending limit module is known for {} (chain {})",
                self.network_label(),
                self.chain_id
            )
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        // Default to Sepolia testnet - GUI will load user settings and update
        if let Some(sepolia) = find_network_by_chain_id(11155111) {
            Self::from_network(sepolia)
        } else {
            Self::new("https://rpc.sepolia.org".to_string(), 11155111)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== find_network_by_chain_id tests ====================

    #[test]
    fn test_find_network_by_chain_id_ethereum() {
        let network = find_network_by_chain_id(1).unwrap();
        assert_eq!(network.label, "Ethereum");
        assert_eq!(network.native_token, "ETH");
        assert_eq!(network.native_decimals, 18);
        assert!(network.tx_service_url.contains("safe-transaction-mainnet"));
    }

    #[test]
    fn test_find_network_by_chain_id_gnosis() {
        let network = find_network_by_chain_id(100).unwrap();
        assert_eq!(network.native_token, "xDAI");
        assert_eq!(network.allowance_module, Some(ALLOWANCE_MODULE_V010));
    }

    #[test]
    fn test_find_network_by_chain_id_not_found() {
        assert!(find_network_by_chain_id(999999).is_none());
    }

    #[test]
    fn test_find_network_index_ethereum() {
        assert_eq!(find_network_index(1), Some(0));
        assert_eq!(find_network_index(999999), None);
    }

    #[test]
    fn test_all_allowance_modules_parse() {
        for network in NETWORKS {
            if let Some(module) = network.allowance_module {
                assert!(module.parse::<Address>().is_ok(), "{}", network.label);
            }
        }
    }

    // ==================== explorer url tests ====================

    #[test]
    fn test_get_tx_explorer_url() {
        assert_eq!(
            get_tx_explorer_url(1, "0xabc").as_deref(),
            Some("https://etherscan.io/tx/0xabc")
        );
        assert!(get_tx_explorer_url(999999, "0xabc").is_none());
    }

    #[test]
    fn test_get_address_explorer_url() {
        assert_eq!(
            get_address_explorer_url(100, "0x1").as_deref(),
            Some("https://gnosisscan.io/address/0x1")
        );
    }

    // ==================== Config tests ====================

    #[test]
    fn test_config_native_token_builtin() {
        let config = Config::new("https://polygon-rpc.com".to_string(), 137);
        assert_eq!(config.native_token(), "POL");
        assert_eq!(config.network_label(), "Polygon");
    }

    #[test]
    fn test_config_native_token_override() {
        let mut config = Config::new("https://example.com".to_string(), 999999);
        config.native_token_override = Some("CUSTOM".to_string());
        assert_eq!(config.native_token(), "CUSTOM");
    }

    #[test]
    fn test_config_unknown_chain_defaults() {
        let config = Config::new("https://example.com".to_string(), 999999);
        assert_eq!(config.native_token(), "ETH");
        assert_eq!(config.native_decimals(), 18);
        assert_eq!(config.network_label(), "Unknown");
    }

    #[test]
    fn test_config_unknown_chain_requires_module() {
        let config = Config {
            spending_limit_module: None,
            ..Config::new("https://example.com".to_string(), 999999)
        };
        assert!(config.require_spending_limit_module().is_err());
    }

    #[test]
    fn test_config_from_custom_network_trims_service_url() {
        let network = crate::user_settings::CustomNetwork::new(
            "Devnet".to_string(),
            31337,
            "DEV".to_string(),
            "http://localhost:8545".to_string(),
            "http://localhost:8000/api/".to_string(),
        );
        let config = Config::from_custom_network(&network);
        assert_eq!(config.tx_service_url, "http://localhost:8000/api");
        assert_eq!(config.native_token(), "DEV");
        assert_eq!(config.network_label(), "Devnet");
    }

    #[test]
    fn test_resolve_tx_service_url_env_overrides_network() {
        let url = resolve_tx_service_url(
            Some("http://override:9000/api/".to_string()),
            "http://localhost:8000/api",
        );
        assert_eq!(url, "http://override:9000/api");
    }

    #[test]
    fn test_resolve_tx_service_url_blank_env_uses_network() {
        assert_eq!(
            resolve_tx_service_url(Some("  ".to_string()), "http://localhost:8000/api/"),
            "http://localhost:8000/api"
        );
        assert_eq!(resolve_tx_service_url(None, ""), "");
    }

    #[test]
    fn test_get_provider_rejects_bad_url() {
        let config = Config {
            rpc_url: "not a url".to_string(),
            ..Config::new("https://example.com".to_string(), 1)
        };
        assert!(config.get_provider().is_err());
    }
}
