use anyhow::{anyhow, Result};
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// Public site the share links and run routes point to
pub const DEFAULT_APP_URL: &str = "https://fundpublicgoods.ai";

/// Disperse contract (deployed at the same address on every supported chain)
pub const DISPERSE_CONTRACT_ADDRESS: &str = "0xD152f549545093347A162Dce210e7293f1452150";

/// Networks a strategy can be funded on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkName {
    Mainnet,
    Optimism,
    Arbitrum,
    Polygon,
    Base,
    Sepolia,
}

impl NetworkName {
    pub fn chain_id(&self) -> u64 {
        self.network().chain_id
    }

    pub fn label(&self) -> &'static str {
        self.network().label
    }

    /// Chain id in the 0x-prefixed hex form wallets expect for switch requests
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id())
    }

    pub fn network(&self) -> &'static EvmNetwork {
        // Every variant has exactly one row in SUPPORTED_NETWORKS.
        SUPPORTED_NETWORKS
            .iter()
            .find(|n| n.name == *self)
            .unwrap_or(&SUPPORTED_NETWORKS[0])
    }

    pub fn all() -> impl Iterator<Item = NetworkName> {
        SUPPORTED_NETWORKS.iter().map(|n| n.name)
    }
}

impl fmt::Display for NetworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NetworkName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        SUPPORTED_NETWORKS
            .iter()
            .find(|n| n.label.to_lowercase() == wanted || n.slug == wanted)
            .map(|n| n.name)
            .ok_or_else(|| anyhow!("Unsupported network: {}", s))
    }
}

/// A supported EVM network with its label, chain ID and default RPC.
#[derive(Clone, Debug)]
pub struct EvmNetwork {
    pub name: NetworkName,
    pub slug: &'static str,
    pub label: &'static str,
    pub chain_id: u64,
    pub default_rpc: &'static str,
}

impl EvmNetwork {
    pub const fn new(
        name: NetworkName,
        slug: &'static str,
        label: &'static str,
        chain_id: u64,
        default_rpc: &'static str,
    ) -> Self {
        Self {
            name,
            slug,
            label,
            chain_id,
            default_rpc,
        }
    }
}

use NetworkName::*;

/// Networks donations can be executed on, in display order.
pub const SUPPORTED_NETWORKS: &[EvmNetwork] = &[
    EvmNetwork::new(Mainnet, "mainnet", "Mainnet", 1, "https://ethereum-rpc.publicnode.com"),
    EvmNetwork::new(Optimism, "optimism", "Optimism", 10, "https://mainnet.optimism.io"),
    EvmNetwork::new(Arbitrum, "arbitrum", "Arbitrum", 42161, "https://arb1.arbitrum.io/rpc"),
    EvmNetwork::new(Polygon, "polygon", "Polygon", 137, "https://polygon-rpc.com"),
    EvmNetwork::new(Base, "base", "Base", 8453, "https://mainnet.base.org"),
    EvmNetwork::new(Sepolia, "sepolia", "Sepolia", 11155111, "https://ethereum-sepolia-rpc.publicnode.com"),
];

/// Find a network by chain ID
pub fn find_network_by_chain_id(chain_id: u64) -> Option<&'static EvmNetwork> {
    SUPPORTED_NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

/// Get the block explorer URL for a given chain ID
pub fn get_block_explorer_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://etherscan.io"),
        10 => Some("https://optimistic.etherscan.io"),
        42161 => Some("https://arbiscan.io"),
        137 => Some("https://polygonscan.com"),
        8453 => Some("https://basescan.org"),
        11155111 => Some("https://sepolia.etherscan.io"),
        _ => None,
    }
}

/// Get the full URL to view a transaction on the block explorer
pub fn get_tx_explorer_url(chain_id: u64, tx_hash: &str) -> Option<String> {
    get_block_explorer_url(chain_id).map(|base| format!("{}/tx/{}", base, tx_hash))
}

#[derive(Clone, Debug)]
pub struct Config {
    pub app_url: String,
    pub api_url: String,
    pub access_token: Option<String>,
    pub private_key: Option<String>, // Local signer; Ledger is used when absent
    pub ledger_index: u32,
    pub disperse_contract: Option<String>,
    pub custom_rpcs: HashMap<u64, String>,
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn new(app_url: String) -> Self {
        let app_url = app_url.trim_end_matches('/').to_string();
        Self {
            api_url: format!("{}/api", app_url),
            app_url,
            access_token: None,
            private_key: None,
            ledger_index: 0,
            disperse_contract: None,
            custom_rpcs: HashMap::new(),
        }
    }

    /// Build the config from `FUNDPG_*` environment variables (after `.env` is loaded)
    pub fn from_env() -> Self {
        let mut config = Self::new(
            non_empty_env("FUNDPG_APP_URL").unwrap_or_else(|| DEFAULT_APP_URL.to_string()),
        );
        if let Some(api_url) = non_empty_env("FUNDPG_API_URL") {
            config.api_url = api_url.trim_end_matches('/').to_string();
        }
        config.access_token = non_empty_env("FUNDPG_ACCESS_TOKEN");
        config.private_key = non_empty_env("FUNDPG_PRIVATE_KEY");
        config.ledger_index = non_empty_env("FUNDPG_LEDGER_INDEX")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        config.disperse_contract = non_empty_env("FUNDPG_DISPERSE_CONTRACT");
        config
    }

    /// Apply persisted preferences on top of the environment
    pub fn with_settings(mut self, settings: &crate::user_settings::UserSettings) -> Self {
        for (chain_id, rpc) in &settings.custom_rpcs {
            if !rpc.trim().is_empty() {
                self.custom_rpcs.insert(*chain_id, rpc.trim().to_string());
            }
        }
        if let Some(index) = settings.ledger_index {
            self.ledger_index = index;
        }
        self
    }

    pub fn rpc_url(&self, network: NetworkName) -> String {
        self.custom_rpcs
            .get(&network.chain_id())
            .cloned()
            .unwrap_or_else(|| network.network().default_rpc.to_string())
    }

    pub fn disperse_address(&self) -> Result<Address> {
        let raw = self
            .disperse_contract
            .as_deref()
            .unwrap_or(DISPERSE_CONTRACT_ADDRESS);
        raw.parse()
            .map_err(|_| anyhow!("Invalid disperse contract address: {}", raw))
    }

    pub fn get_provider(&self, network: NetworkName) -> Result<Arc<Provider<Http>>> {
        let url = Url::parse(&self.rpc_url(network))?;
        let provider = Provider::<Http>::try_from(url.as_str())?;
        Ok(Arc::new(provider))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_APP_URL.to_string())
    }
}
