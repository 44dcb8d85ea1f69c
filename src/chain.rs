//! On-chain donation service: ERC-20 reads, approvals and Disperse.app batches.

use crate::config::NetworkName;
use crate::donation::{DonationBatch, DonationService};
use crate::tokens::Token;
use crate::wallet::{EvmWallet, WalletAccount};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::{Function, Param, ParamType, StateMutability, Token as AbiToken};
use ethers::providers::Middleware;
use ethers::types::{Address, TransactionRequest, TxHash, U256};
use std::sync::Arc;
use tracing::info;

#[allow(deprecated)]
fn param(name: &str, kind: ParamType) -> Param {
    Param {
        name: name.to_string(),
        kind,
        internal_type: None,
    }
}

#[allow(deprecated)]
fn function(
    name: &str,
    inputs: Vec<Param>,
    outputs: Vec<Param>,
    state_mutability: StateMutability,
) -> Function {
    Function {
        name: name.to_string(),
        inputs,
        outputs,
        constant: None,
        state_mutability,
    }
}

/// ERC-20 balanceOf(address)
pub fn encode_balance_of(owner: Address) -> Result<Vec<u8>> {
    let func = function(
        "balanceOf",
        vec![param("account", ParamType::Address)],
        vec![param("", ParamType::Uint(256))],
        StateMutability::View,
    );
    Ok(func.encode_input(&[AbiToken::Address(owner)])?)
}

/// ERC-20 allowance(address,address)
pub fn encode_allowance(owner: Address, spender: Address) -> Result<Vec<u8>> {
    let func = function(
        "allowance",
        vec![
            param("owner", ParamType::Address),
            param("spender", ParamType::Address),
        ],
        vec![param("", ParamType::Uint(256))],
        StateMutability::View,
    );
    Ok(func.encode_input(&[AbiToken::Address(owner), AbiToken::Address(spender)])?)
}

/// ERC-20 approve(address,uint256)
pub fn encode_approve(spender: Address, amount: U256) -> Result<Vec<u8>> {
    let func = function(
        "approve",
        vec![
            param("spender", ParamType::Address),
            param("amount", ParamType::Uint(256)),
        ],
        vec![param("", ParamType::Bool)],
        StateMutability::NonPayable,
    );
    Ok(func.encode_input(&[AbiToken::Address(spender), AbiToken::Uint(amount)])?)
}

/// Disperse.app disperseTokenSimple(address,address[],uint256[])
pub fn encode_disperse_token_simple(
    token: Address,
    recipients: &[Address],
    values: &[U256],
) -> Result<Vec<u8>> {
    if recipients.len() != values.len() {
        return Err(anyhow!(
            "Recipient count ({}) does not match amount count ({})",
            recipients.len(),
            values.len()
        ));
    }
    let func = function(
        "disperseTokenSimple",
        vec![
            param("token", ParamType::Address),
            param("recipients", ParamType::Array(Box::new(ParamType::Address))),
            param("values", ParamType::Array(Box::new(ParamType::Uint(256)))),
        ],
        vec![],
        StateMutability::NonPayable,
    );
    Ok(func.encode_input(&[
        AbiToken::Address(token),
        AbiToken::Array(recipients.iter().map(|r| AbiToken::Address(*r)).collect()),
        AbiToken::Array(values.iter().map(|v| AbiToken::Uint(*v)).collect()),
    ])?)
}

/// Decode a single uint256 return value
fn decode_uint(result: &[u8]) -> Result<U256> {
    if result.len() < 32 {
        return Err(anyhow!("Unexpected return data length {}", result.len()));
    }
    Ok(U256::from_big_endian(&result[..32]))
}

/// [`DonationService`] backed by RPC reads and transactions signed by an [`EvmWallet`]
pub struct ChainDonationService {
    wallet: Arc<EvmWallet>,
}

impl ChainDonationService {
    pub fn new(wallet: Arc<EvmWallet>) -> Self {
        Self { wallet }
    }

    async fn call_uint(&self, network: NetworkName, to: Address, calldata: Vec<u8>) -> Result<U256> {
        let provider = self.wallet.config().get_provider(network)?;
        let tx = TransactionRequest::new().to(to).data(calldata);
        let result = provider.call(&tx.into(), None).await?;
        decode_uint(&result)
    }

    fn ensure_network(&self, network: NetworkName) -> Result<()> {
        let connected = self.wallet.connected_network();
        if connected != network {
            return Err(anyhow!(
                "Wallet is on {} but the donation targets {}",
                connected,
                network
            ));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl DonationService for ChainDonationService {
    async fn balance(&self, wallet: &WalletAccount, token: &Token) -> Result<U256> {
        let network = self.wallet.connected_network();
        let calldata = encode_balance_of(wallet.address)?;
        let balance = self
            .call_uint(network, token.contract_address()?, calldata)
            .await?;
        info!("{} balance of {:?} on {}: {}", token.name, wallet.address, network, balance);
        Ok(balance)
    }

    async fn allowance(&self, wallet: &WalletAccount, token: &Token, network: NetworkName) -> Result<U256> {
        let spender = self.wallet.config().disperse_address()?;
        let calldata = encode_allowance(wallet.address, spender)?;
        self.call_uint(network, token.contract_address()?, calldata)
            .await
    }

    async fn approve(
        &self,
        _wallet: &WalletAccount,
        token: &Token,
        amount: U256,
        network: NetworkName,
    ) -> Result<TxHash> {
        self.ensure_network(network)?;
        let spender = self.wallet.config().disperse_address()?;
        info!("Approving {} {} for {:?} on {}", amount, token.name, spender, network);
        let calldata = encode_approve(spender, amount)?;
        self.wallet
            .sign_and_send(token.contract_address()?, calldata)
            .await
    }

    async fn execute(&self, _wallet: &WalletAccount, batch: &DonationBatch) -> Result<TxHash> {
        self.ensure_network(batch.network)?;
        let (recipients, values) = batch.transfers()?;
        let calldata =
            encode_disperse_token_simple(batch.token.contract_address()?, &recipients, &values)?;
        info!(
            "Dispersing {} to {} recipients on {}",
            batch.token.name,
            recipients.len(),
            batch.network
        );
        self.wallet
            .sign_and_send(self.wallet.config().disperse_address()?, calldata)
            .await
    }
}
