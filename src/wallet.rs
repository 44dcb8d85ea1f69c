//! Wallet connection, chain selection and transaction signing.
//!
//! The donation flow only sees the [`WalletProvider`] trait. [`EvmWallet`]
//! implements it for a Ledger device (native ethers-rs support) or a local
//! private key, and also signs the contract calls the chain service sends.

use crate::config::{find_network_by_chain_id, Config, NetworkName};
use crate::ledger_lock;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{HDPath, Ledger};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Maximum number of retry attempts for transient HID errors
const MAX_RETRY_ATTEMPTS: usize = 5;

/// Base delay between retries in milliseconds (multiplied by attempt number)
const RETRY_BASE_DELAY_MS: u64 = 300;

/// Gas estimate headroom, in percent
const GAS_LIMIT_BUFFER_PERCENT: u64 = 120;

/// The account a wallet is connected with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletAccount {
    pub address: Address,
    /// HD path for hardware accounts
    pub derivation_path: Option<String>,
}

// Ledger futures are not Send; callers drive them on a current-thread runtime.
#[async_trait(?Send)]
pub trait WalletProvider: Send + Sync {
    /// Connect (or reconnect) and return the active account
    async fn connect(&self) -> Result<WalletAccount>;

    fn account(&self) -> Option<WalletAccount>;

    /// Chain id the wallet currently signs for
    fn connected_chain(&self) -> Option<u64>;

    /// Ask the wallet to move to another chain
    async fn request_chain_switch(&self, chain_id: u64) -> Result<()>;
}

/// Build the BIP-44 path for an Ethereum account index (Ledger Live layout)
pub fn ledger_hd_path(index: u32) -> String {
    format!("m/44'/60'/{}'/0/0", index)
}

enum SignerSource {
    Ledger { hd_path: String },
    PrivateKey(LocalWallet),
}

pub struct EvmWallet {
    config: Config,
    source: SignerSource,
    account: Mutex<Option<WalletAccount>>,
    chain: Mutex<NetworkName>,
}

impl EvmWallet {
    /// Local key from `FUNDPG_PRIVATE_KEY` when configured, Ledger otherwise
    pub fn new(config: Config, network: NetworkName) -> Result<Self> {
        let source = match &config.private_key {
            Some(key) => {
                let wallet: LocalWallet = key
                    .trim()
                    .trim_start_matches("0x")
                    .parse()
                    .map_err(|e| anyhow!("Invalid FUNDPG_PRIVATE_KEY: {}", e))?;
                SignerSource::PrivateKey(wallet)
            }
            None => SignerSource::Ledger {
                hd_path: ledger_hd_path(config.ledger_index),
            },
        };
        Ok(Self {
            config,
            source,
            account: Mutex::new(None),
            chain: Mutex::new(network),
        })
    }

    pub fn kind_label(&self) -> &'static str {
        match self.source {
            SignerSource::Ledger { .. } => "Ledger",
            SignerSource::PrivateKey(_) => "Local key",
        }
    }

    pub fn connected_network(&self) -> NetworkName {
        *self.chain.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn ledger_address(hd_path: &str) -> Result<Address> {
        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            let lock = ledger_lock::ledger_lock().lock().await;
            info!(
                "Getting Ledger address at path {} (attempt {}/{})",
                hd_path, attempt, MAX_RETRY_ATTEMPTS
            );

            let result = match Ledger::new(HDPath::Other(hd_path.to_string()), 1).await {
                Ok(ledger) => ledger.get_address().await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(address) => return Ok(address),
                Err(err_str) if is_transient_error(&err_str) && attempt < MAX_RETRY_ATTEMPTS => {
                    warn!("Transient Ledger error (attempt {}): {}, retrying...", attempt, err_str);
                    drop(lock);
                    sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64)).await;
                }
                Err(err_str) => return Err(map_ledger_error(err_str)),
            }
        }

        Err(anyhow!("Failed to get Ledger address after {} attempts", MAX_RETRY_ATTEMPTS))
    }

    async fn sign(&self, tx: &TypedTransaction, chain_id: u64) -> Result<Signature> {
        match &self.source {
            SignerSource::PrivateKey(wallet) => wallet
                .clone()
                .with_chain_id(chain_id)
                .sign_transaction(tx)
                .await
                .map_err(|e| anyhow!("Failed to sign transaction: {}", e)),
            SignerSource::Ledger { hd_path } => {
                for attempt in 1..=MAX_RETRY_ATTEMPTS {
                    let lock = ledger_lock::ledger_lock().lock().await;
                    info!(
                        "Signing via Ledger (path: {}, chain_id: {}, attempt {}/{})",
                        hd_path, chain_id, attempt, MAX_RETRY_ATTEMPTS
                    );

                    let result = match Ledger::new(HDPath::Other(hd_path.clone()), chain_id).await {
                        Ok(ledger) => ledger.sign_transaction(tx).await.map_err(|e| e.to_string()),
                        Err(e) => Err(e.to_string()),
                    };

                    match result {
                        Ok(signature) => return Ok(signature),
                        // User rejections and locked devices are never retried.
                        Err(err_str)
                            if is_transient_error(&err_str) && attempt < MAX_RETRY_ATTEMPTS =>
                        {
                            warn!("Transient signing error (attempt {}): {}, retrying...", attempt, err_str);
                            drop(lock);
                            sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64)).await;
                        }
                        Err(err_str) => return Err(map_ledger_error(err_str)),
                    }
                }
                Err(anyhow!("Failed to sign transaction after {} attempts", MAX_RETRY_ATTEMPTS))
            }
        }
    }

    /// Sign a contract call on the connected chain, broadcast it and wait for the receipt
    pub async fn sign_and_send(&self, to: Address, calldata: Vec<u8>) -> Result<TxHash> {
        let account = self
            .account()
            .ok_or_else(|| anyhow!("Wallet is not connected"))?;
        let network = self.connected_network();
        let chain_id = network.chain_id();
        let provider = self.config.get_provider(network)?;

        let nonce = provider.get_transaction_count(account.address, None).await?;
        let (max_fee, max_priority_fee) = provider.estimate_eip1559_fees(None).await?;

        let mut tx: TypedTransaction = Eip1559TransactionRequest::new()
            .from(account.address)
            .to(to)
            .data(calldata)
            .nonce(nonce)
            .max_fee_per_gas(max_fee)
            .max_priority_fee_per_gas(max_priority_fee)
            .chain_id(chain_id)
            .into();
        let gas = provider.estimate_gas(&tx, None).await?;
        tx.set_gas(gas * U256::from(GAS_LIMIT_BUFFER_PERCENT) / U256::from(100u64));

        info!(
            "Contract call built: to={:?}, from={:?}, chain_id={}, gas_limit={}",
            to,
            account.address,
            chain_id,
            gas * U256::from(GAS_LIMIT_BUFFER_PERCENT) / U256::from(100u64)
        );

        let signature = self.sign(&tx, chain_id).await?;
        let pending_tx = provider
            .send_raw_transaction(tx.rlp_signed(&signature))
            .await
            .map_err(|e| anyhow!("Failed to send transaction: {}", e))?;
        let tx_hash = pending_tx.tx_hash();
        info!("Transaction sent: {:?}", tx_hash);

        let receipt = pending_tx
            .await?
            .ok_or_else(|| anyhow!("Transaction {:?} was dropped from the mempool", tx_hash))?;
        if receipt.status != Some(U64::from(1u64)) {
            return Err(anyhow!("Transaction {:?} reverted", tx_hash));
        }
        Ok(tx_hash)
    }
}

#[async_trait(?Send)]
impl WalletProvider for EvmWallet {
    async fn connect(&self) -> Result<WalletAccount> {
        let account = match &self.source {
            SignerSource::PrivateKey(wallet) => WalletAccount {
                address: wallet.address(),
                derivation_path: None,
            },
            SignerSource::Ledger { hd_path } => WalletAccount {
                address: Self::ledger_address(hd_path).await?,
                derivation_path: Some(hd_path.clone()),
            },
        };
        info!("Connected {} account {:?}", self.kind_label(), account.address);
        *self.account.lock().unwrap_or_else(|e| e.into_inner()) = Some(account.clone());
        Ok(account)
    }

    fn account(&self) -> Option<WalletAccount> {
        self.account.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn connected_chain(&self) -> Option<u64> {
        self.account().map(|_| self.connected_network().chain_id())
    }

    async fn request_chain_switch(&self, chain_id: u64) -> Result<()> {
        let network = find_network_by_chain_id(chain_id)
            .ok_or_else(|| anyhow!("Chain {} is not supported", chain_id))?;
        info!("Switching wallet to {} ({})", network.label, network.name.chain_id_hex());
        *self.chain.lock().unwrap_or_else(|e| e.into_inner()) = network.name;
        Ok(())
    }
}

/// Check if an error is transient and worth retrying
fn is_transient_error(err_str: &str) -> bool {
    let lower = err_str.to_lowercase();

    if lower.contains("overlapped i/o operation") || lower.contains("overlapped io operation") {
        return true;
    }
    if lower.contains("busy") {
        return true;
    }
    if lower.contains("hidapi") && !lower.contains("no device") && !lower.contains("device not found") {
        return true;
    }
    if lower.contains("transport") && lower.contains("error") {
        return true;
    }
    lower.contains("i/o error") || lower.contains("io error")
}

/// Map Ledger errors to user-friendly messages
fn map_ledger_error(err_str: String) -> anyhow::Error {
    error!("Ledger error: {}", err_str);

    let lower = err_str.to_lowercase();
    if lower.contains("device not found") || lower.contains("no device") || lower.contains("hidapi") {
        anyhow!("Ledger device not found. Please ensure it's connected and unlocked.")
    } else if lower.contains("locked") || lower.contains("6983") || lower.contains("6985") {
        anyhow!("Ledger is locked or Ethereum app is not open.")
    } else if lower.contains("denied") || lower.contains("rejected") {
        anyhow!("Transaction was rejected on the Ledger device.")
    } else if lower.contains("busy") {
        anyhow!("Ledger device is busy. Please wait and try again.")
    } else {
        anyhow!("Ledger error: {}", err_str)
    }
}
