//! Funding tokens available on each supported network.

use crate::config::NetworkName;
use anyhow::{anyhow, Result};
use ethers::types::Address;

/// An ERC-20 token donations can be made in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub name: &'static str,
    pub address: &'static str,
    pub decimals: u32,
}

impl Token {
    pub const fn new(name: &'static str, address: &'static str, decimals: u32) -> Self {
        Self {
            name,
            address,
            decimals,
        }
    }

    pub fn contract_address(&self) -> Result<Address> {
        self.address
            .parse()
            .map_err(|_| anyhow!("Invalid {} token address: {}", self.name, self.address))
    }
}

const MAINNET_TOKENS: &[Token] = &[
    Token::new("USDC", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6),
    Token::new("USDT", "0xdAC17F958D2ee523a2206206994597C13D831ec7", 6),
    Token::new("DAI", "0x6B175474E89094C44Da98b954EedeAC495271d0F", 18),
];

const OPTIMISM_TOKENS: &[Token] = &[
    Token::new("USDC", "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85", 6),
    Token::new("USDT", "0x94b008aA00579c1307B0EF2c499aD98a8ce58e58", 6),
    Token::new("DAI", "0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1", 18),
];

const ARBITRUM_TOKENS: &[Token] = &[
    Token::new("USDC", "0xaf88d065e77c8cC2239327C5EDb3A432268e5831", 6),
    Token::new("USDT", "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9", 6),
    Token::new("DAI", "0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1", 18),
];

const POLYGON_TOKENS: &[Token] = &[
    Token::new("USDC", "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", 6),
    Token::new("USDT", "0xc2132D05D31c914a87C6611C10748AEb04B58e8F", 6),
    Token::new("DAI", "0x8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063", 18),
];

const BASE_TOKENS: &[Token] = &[
    Token::new("USDC", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", 6),
    Token::new("DAI", "0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb", 18),
];

const SEPOLIA_TOKENS: &[Token] = &[
    Token::new("USDC", "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238", 6),
];

/// Tokens that can fund donations on `network`, default first
pub fn tokens_for_network(network: NetworkName) -> &'static [Token] {
    match network {
        NetworkName::Mainnet => MAINNET_TOKENS,
        NetworkName::Optimism => OPTIMISM_TOKENS,
        NetworkName::Arbitrum => ARBITRUM_TOKENS,
        NetworkName::Polygon => POLYGON_TOKENS,
        NetworkName::Base => BASE_TOKENS,
        NetworkName::Sepolia => SEPOLIA_TOKENS,
    }
}

/// Token list and current choice for the active network.
#[derive(Clone, Debug)]
pub struct TokenSelection {
    network: NetworkName,
    selected: usize,
}

impl TokenSelection {
    pub fn new(network: NetworkName) -> Self {
        Self {
            network,
            selected: 0,
        }
    }

    /// Start on `preferred` when the network offers it, else on the default token
    pub fn with_preferred(network: NetworkName, preferred: Option<&str>) -> Self {
        let mut selection = Self::new(network);
        if let Some(name) = preferred {
            selection.update_token(name);
        }
        selection
    }

    pub fn network(&self) -> NetworkName {
        self.network
    }

    pub fn tokens(&self) -> &'static [Token] {
        tokens_for_network(self.network)
    }

    pub fn selected(&self) -> Option<Token> {
        self.tokens().get(self.selected).copied()
    }

    /// Tokens other than the selected one, for the dropdown
    pub fn alternatives(&self) -> impl Iterator<Item = &'static Token> + '_ {
        let selected = self.selected();
        self.tokens().iter().filter(move |t| Some(**t) != selected)
    }

    /// Select a token by name. Returns true when the selection changed.
    pub fn update_token(&mut self, name: &str) -> bool {
        match self
            .tokens()
            .iter()
            .position(|t| t.name.eq_ignore_ascii_case(name))
        {
            Some(idx) if idx != self.selected => {
                self.selected = idx;
                true
            }
            _ => false,
        }
    }
}
