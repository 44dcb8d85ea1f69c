//! Donation execution as an explicit state machine.
//!
//! A submit walks `Idle -> CheckingBalance -> [AwaitingApproval] -> Executing`
//! and ends in `Succeeded` or `Failed`. Three guards halt it early without
//! error: a chain mismatch (after asking the wallet to switch), a missing
//! wallet account, and an amount at or above the fetched balance. A halted
//! flow is resumed only by submitting again.

use crate::amount::{self, format_token_amount, parse_token_amount};
use crate::config::NetworkName;
use crate::strategy::StrategyError;
use crate::tokens::Token;
use crate::wallet::{WalletAccount, WalletProvider};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use std::fmt;
use tracing::{debug, info, warn};

/// One project's share of a donation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DonationRequest {
    pub amount: String,
    pub description: String,
    pub title: String,
    pub recipient: Address,
}

/// Everything `execute` needs to send one batched donation
#[derive(Clone, Debug, PartialEq)]
pub struct DonationBatch {
    pub donations: Vec<DonationRequest>,
    pub network: NetworkName,
    pub token: Token,
}

impl DonationBatch {
    /// Parallel recipient and base-unit amount lists, skipping zero rows.
    /// Fails when a row does not parse or nothing positive is left to send.
    pub fn transfers(&self) -> Result<(Vec<Address>, Vec<U256>)> {
        let mut recipients = Vec::with_capacity(self.donations.len());
        let mut values = Vec::with_capacity(self.donations.len());
        for donation in &self.donations {
            let value = parse_token_amount(&donation.amount, self.token.decimals)
                .map_err(|e| anyhow!("{}: {}", donation.title, e))?;
            if value.is_zero() {
                continue;
            }
            recipients.push(donation.recipient);
            values.push(value);
        }
        if recipients.is_empty() {
            return Err(anyhow!("No donations with a positive amount"));
        }
        Ok((recipients, values))
    }

    /// Sum of the per-project amounts in token base units
    pub fn total(&self) -> Result<U256> {
        let (_, values) = self.transfers()?;
        values
            .iter()
            .try_fold(U256::zero(), |acc, v| acc.checked_add(*v))
            .ok_or_else(|| anyhow!("Donation total overflows"))
    }
}

#[async_trait(?Send)]
pub trait DonationService: Send + Sync {
    async fn balance(&self, wallet: &WalletAccount, token: &Token) -> Result<U256>;

    async fn allowance(&self, wallet: &WalletAccount, token: &Token, network: NetworkName) -> Result<U256>;

    async fn approve(
        &self,
        wallet: &WalletAccount,
        token: &Token,
        amount: U256,
        network: NetworkName,
    ) -> Result<TxHash>;

    async fn execute(&self, wallet: &WalletAccount, batch: &DonationBatch) -> Result<TxHash>;
}

/// Snapshot of the screen state a submit works from
#[derive(Clone, Debug)]
pub struct DonationPlan {
    pub network: NetworkName,
    pub token: Option<Token>,
    pub amount: String,
    pub selected_count: usize,
    pub donations: Result<Vec<DonationRequest>, StrategyError>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DonationState {
    Idle,
    ChainSwitchRequested { chain_id: u64 },
    WalletRequired,
    CheckingBalance,
    InsufficientBalance { balance: String },
    AwaitingApproval { amount: String },
    Executing,
    Succeeded { tx_hash: TxHash },
    Failed { reason: String },
}

impl DonationState {
    /// True for states that end a submit
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            DonationState::Idle
                | DonationState::ChainSwitchRequested { .. }
                | DonationState::WalletRequired
                | DonationState::InsufficientBalance { .. }
                | DonationState::Succeeded { .. }
                | DonationState::Failed { .. }
        )
    }
}

impl fmt::Display for DonationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DonationState::Idle => write!(f, "Idle"),
            DonationState::ChainSwitchRequested { chain_id } => {
                write!(f, "Switch requested to chain {}. Submit again once switched.", chain_id)
            }
            DonationState::WalletRequired => write!(f, "Connect a wallet to donate"),
            DonationState::CheckingBalance => write!(f, "Checking balance..."),
            DonationState::InsufficientBalance { balance } => {
                write!(f, "Insufficient balance ({})", balance)
            }
            DonationState::AwaitingApproval { amount } => write!(f, "Approving {}...", amount),
            DonationState::Executing => write!(f, "Sending donation..."),
            DonationState::Succeeded { tx_hash } => write!(f, "Donation sent: {:?}", tx_hash),
            DonationState::Failed { reason } => write!(f, "Donation failed: {}", reason),
        }
    }
}

/// Guard: nothing to fund
pub fn is_noop(plan: &DonationPlan) -> bool {
    plan.selected_count == 0 || amount::is_unset(&plan.amount)
}

/// Guard: the wallet signs for a different chain than the selected network
pub fn needs_chain_switch(connected_chain: Option<u64>, network: NetworkName) -> bool {
    matches!(connected_chain, Some(id) if id != network.chain_id())
}

/// Guard: the requested amount is not strictly below the balance
pub fn is_insufficient(requested: U256, balance: U256) -> bool {
    requested >= balance
}

/// Guard: the spender may not yet move the requested amount
pub fn needs_approval(allowance: U256, requested: U256) -> bool {
    allowance < requested
}

#[derive(Clone, Debug)]
pub struct DonationFlow {
    state: DonationState,
    history: Vec<DonationState>,
}

impl Default for DonationFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl DonationFlow {
    pub fn new() -> Self {
        Self {
            state: DonationState::Idle,
            history: Vec::new(),
        }
    }

    /// A flow that ended before reaching any service, e.g. a lost worker
    pub fn failed(reason: impl Into<String>) -> Self {
        let mut flow = Self::new();
        flow.transition(DonationState::Failed {
            reason: reason.into(),
        });
        flow
    }

    pub fn state(&self) -> &DonationState {
        &self.state
    }

    /// Every state entered, in order
    pub fn history(&self) -> &[DonationState] {
        &self.history
    }

    pub(crate) fn transition(&mut self, next: DonationState) {
        debug!("Donation flow: {:?} -> {:?}", self.state, next);
        self.history.push(next.clone());
        self.state = next;
    }

    /// Run one submit against the given services and return the finished machine
    pub async fn run(
        plan: &DonationPlan,
        wallet: &dyn WalletProvider,
        service: &dyn DonationService,
    ) -> Self {
        let mut flow = Self::new();
        if let Err(e) = flow.drive(plan, wallet, service).await {
            warn!("Donation failed: {:#}", e);
            flow.transition(DonationState::Failed {
                reason: format!("{:#}", e),
            });
        }
        flow
    }

    async fn drive(
        &mut self,
        plan: &DonationPlan,
        wallet: &dyn WalletProvider,
        service: &dyn DonationService,
    ) -> Result<()> {
        if is_noop(plan) {
            return Ok(());
        }

        let chain_id = plan.network.chain_id();
        if needs_chain_switch(wallet.connected_chain(), plan.network) {
            wallet.request_chain_switch(chain_id).await?;
            self.transition(DonationState::ChainSwitchRequested { chain_id });
            return Ok(());
        }

        let token = plan
            .token
            .ok_or_else(|| anyhow!("No funding token available on {}", plan.network))?;
        let Some(account) = wallet.account() else {
            self.transition(DonationState::WalletRequired);
            return Ok(());
        };

        let entered = parse_token_amount(&plan.amount, token.decimals)?;
        let donations = plan.donations.clone()?;
        let batch = DonationBatch {
            donations,
            network: plan.network,
            token,
        };
        // Validated before any on-chain write.
        let total = batch.total()?;
        // Rows may have been edited by hand; the balance must cover whichever is larger.
        let requested = entered.max(total);

        self.transition(DonationState::CheckingBalance);
        let balance = service.balance(&account, &token).await?;
        if is_insufficient(requested, balance) {
            self.transition(DonationState::InsufficientBalance {
                balance: format_token_amount(balance, token.decimals),
            });
            return Ok(());
        }

        let allowance = service.allowance(&account, &token, plan.network).await?;
        if needs_approval(allowance, total) {
            self.transition(DonationState::AwaitingApproval {
                amount: format_token_amount(total, token.decimals),
            });
            service.approve(&account, &token, total, plan.network).await?;
        }

        self.transition(DonationState::Executing);
        let tx_hash = service.execute(&account, &batch).await?;
        info!(
            "Donated {} {} to {} projects on {}: {:?}",
            format_token_amount(total, token.decimals),
            token.name,
            batch.donations.len(),
            plan.network,
            tx_hash
        );
        self.transition(DonationState::Succeeded { tx_hash });
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::tokens::tokens_for_network;

    fn usdc() -> Token {
        tokens_for_network(NetworkName::Mainnet)[0]
    }

    fn units(whole: u64) -> U256 {
        U256::from(whole) * U256::from(1_000_000u64)
    }

    fn plan(amount: &str) -> DonationPlan {
        DonationPlan {
            network: NetworkName::Mainnet,
            token: Some(usdc()),
            amount: amount.to_string(),
            selected_count: 2,
            donations: Ok(vec![
                DonationRequest {
                    amount: "3".to_string(),
                    description: "first".to_string(),
                    title: "A".to_string(),
                    recipient: Address::repeat_byte(0x11),
                },
                DonationRequest {
                    amount: "2".to_string(),
                    description: "second".to_string(),
                    title: "B".to_string(),
                    recipient: Address::repeat_byte(0x22),
                },
            ]),
        }
    }

    fn run(plan: &DonationPlan, wallet: &FakeWallet, service: &FakeService) -> DonationFlow {
        tokio_test::block_on(DonationFlow::run(plan, wallet, service))
    }

    // ==================== guard tests ====================

    #[test]
    fn test_guards() {
        assert!(needs_chain_switch(Some(10), NetworkName::Mainnet));
        assert!(!needs_chain_switch(Some(1), NetworkName::Mainnet));
        assert!(!needs_chain_switch(None, NetworkName::Mainnet));
        assert!(is_insufficient(units(5), units(5)));
        assert!(!is_insufficient(units(4), units(5)));
        assert!(needs_approval(units(1), units(2)));
        assert!(!needs_approval(units(2), units(2)));
    }

    // ==================== flow tests ====================

    #[test]
    fn test_noop_when_nothing_selected_or_zero_amount() {
        let wallet = FakeWallet::on(NetworkName::Mainnet);
        let service = FakeService::new(units(100), units(100));

        let mut empty = plan("5");
        empty.selected_count = 0;
        let flow = run(&empty, &wallet, &service);
        assert_eq!(flow.state(), &DonationState::Idle);

        let flow = run(&plan("0"), &wallet, &service);
        assert_eq!(flow.state(), &DonationState::Idle);
        assert!(flow.history().is_empty());
        assert!(service.calls().is_empty());
    }

    #[test]
    fn test_chain_mismatch_requests_switch_and_halts() {
        let mut wallet = FakeWallet::on(NetworkName::Mainnet);
        wallet.chain = Some(NetworkName::Optimism.chain_id());
        let service = FakeService::new(units(100), units(100));

        let flow = run(&plan("5"), &wallet, &service);

        assert_eq!(flow.state(), &DonationState::ChainSwitchRequested { chain_id: 1 });
        assert_eq!(wallet.switches(), vec![1]);
        assert!(service.calls().is_empty());
    }

    #[test]
    fn test_missing_account_halts() {
        let mut wallet = FakeWallet::on(NetworkName::Mainnet);
        wallet.account = None;
        wallet.chain = None;
        let service = FakeService::new(units(100), units(100));

        let flow = run(&plan("5"), &wallet, &service);

        assert_eq!(flow.state(), &DonationState::WalletRequired);
        assert!(service.calls().is_empty());
    }

    #[test]
    fn test_insufficient_balance_halts_before_allowance() {
        let wallet = FakeWallet::on(NetworkName::Mainnet);
        let service = FakeService::new(units(3), units(100));

        let flow = run(&plan("5"), &wallet, &service);

        assert_eq!(
            flow.state(),
            &DonationState::InsufficientBalance {
                balance: "3".to_string()
            }
        );
        assert_eq!(service.calls(), vec!["balance"]);
    }

    #[test]
    fn test_amount_equal_to_balance_is_insufficient() {
        let wallet = FakeWallet::on(NetworkName::Mainnet);
        let service = FakeService::new(units(5), units(100));

        let flow = run(&plan("5"), &wallet, &service);

        assert!(matches!(flow.state(), DonationState::InsufficientBalance { .. }));
    }

    #[test]
    fn test_sufficient_allowance_skips_approval() {
        let wallet = FakeWallet::on(NetworkName::Mainnet);
        let service = FakeService::new(units(100), units(100));

        let flow = run(&plan("5"), &wallet, &service);

        assert_eq!(
            flow.history(),
            &[
                DonationState::CheckingBalance,
                DonationState::Executing,
                DonationState::Succeeded {
                    tx_hash: TxHash::repeat_byte(0x02)
                },
            ]
        );
        assert_eq!(service.calls(), vec!["balance", "allowance", "execute"]);
        let batch = service.executed.lock().unwrap().clone().unwrap();
        assert_eq!(batch.donations.len(), 2);
        assert_eq!(batch.total().unwrap(), units(5));
    }

    #[test]
    fn test_low_allowance_approves_then_executes() {
        let wallet = FakeWallet::on(NetworkName::Mainnet);
        let service = FakeService::new(units(100), units(1));

        let flow = run(&plan("5"), &wallet, &service);

        assert!(matches!(flow.state(), DonationState::Succeeded { .. }));
        assert!(flow.history().contains(&DonationState::AwaitingApproval {
            amount: "5".to_string()
        }));
        assert_eq!(
            service.calls(),
            vec![
                "balance".to_string(),
                "allowance".to_string(),
                format!("approve:{}", units(5)),
                "execute".to_string()
            ]
        );
    }

    #[test]
    fn test_execute_failure_ends_failed() {
        let wallet = FakeWallet::on(NetworkName::Mainnet);
        let mut service = FakeService::new(units(100), units(100));
        service.fail_execute = true;

        let flow = run(&plan("5"), &wallet, &service);

        match flow.state() {
            DonationState::Failed { reason } => assert!(reason.contains("execution reverted")),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_missing_recipient_fails_without_spending() {
        let wallet = FakeWallet::on(NetworkName::Mainnet);
        let service = FakeService::new(units(100), units(100));
        let mut bad = plan("5");
        bad.donations = Err(StrategyError::MissingRecipient {
            title: "A".to_string(),
            network: NetworkName::Mainnet,
        });

        let flow = run(&bad, &wallet, &service);

        assert!(matches!(flow.state(), DonationState::Failed { .. }));
        assert!(service.calls().is_empty());
    }

    #[test]
    fn test_hand_edited_rows_raise_requested_amount() {
        let wallet = FakeWallet::on(NetworkName::Mainnet);
        let service = FakeService::new(units(100), units(0));
        // Rows sum to 5 while the entered total is 4.
        let flow = run(&plan("4"), &wallet, &service);

        assert!(flow.history().contains(&DonationState::AwaitingApproval {
            amount: "5".to_string()
        }));
    }

    #[test]
    fn test_zero_rows_fail_before_any_call() {
        let wallet = FakeWallet::on(NetworkName::Mainnet);
        let service = FakeService::new(units(100), units(0));
        let mut zero = plan("5");
        if let Ok(rows) = zero.donations.as_mut() {
            for row in rows.iter_mut() {
                row.amount = "0".to_string();
            }
        }

        let flow = run(&zero, &wallet, &service);

        match flow.state() {
            DonationState::Failed { reason } => assert!(reason.contains("positive amount")),
            other => panic!("unexpected state {:?}", other),
        }
        assert!(service.calls().is_empty());
    }

    #[test]
    fn test_approval_covers_row_total() {
        let wallet = FakeWallet::on(NetworkName::Mainnet);
        let service = FakeService::new(units(6), units(0));
        // Rows sum to 5 while the entered total is 6; the balance check uses 6.
        let flow = run(&plan("6"), &wallet, &service);
        assert!(matches!(flow.state(), DonationState::InsufficientBalance { .. }));

        let service = FakeService::new(units(100), units(0));
        let flow = run(&plan("6"), &wallet, &service);
        assert!(matches!(flow.state(), DonationState::Succeeded { .. }));
        assert!(service.calls().contains(&format!("approve:{}", units(5))));
    }

    // ==================== batch tests ====================

    fn request(amount: &str, byte: u8) -> DonationRequest {
        DonationRequest {
            amount: amount.to_string(),
            description: String::new(),
            title: format!("P{}", byte),
            recipient: Address::repeat_byte(byte),
        }
    }

    #[test]
    fn test_transfers_scale_by_token_decimals() {
        let dai = tokens_for_network(NetworkName::Mainnet)[2];
        let batch = DonationBatch {
            donations: vec![request("1.5", 0x0a), request("0", 0x0b), request("2", 0x0c)],
            network: NetworkName::Mainnet,
            token: dai,
        };

        let (recipients, values) = batch.transfers().unwrap();

        assert_eq!(recipients, vec![Address::repeat_byte(0x0a), Address::repeat_byte(0x0c)]);
        assert_eq!(values[0], U256::from(15u64) * U256::exp10(17));
        assert_eq!(values[1], U256::from(2u64) * U256::exp10(18));
        assert_eq!(batch.total().unwrap(), U256::from(35u64) * U256::exp10(17));
    }

    #[test]
    fn test_transfers_reject_all_zero_and_bad_rows() {
        let usdc = usdc();
        let zero = DonationBatch {
            donations: vec![request("0", 0x0a)],
            network: NetworkName::Mainnet,
            token: usdc,
        };
        assert!(zero.transfers().is_err());

        let too_precise = DonationBatch {
            donations: vec![request("1.0000001", 0x0a)],
            network: NetworkName::Mainnet,
            token: usdc,
        };
        assert!(too_precise.total().is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DonationState::Executing.to_string(), "Sending donation...");
        assert!(DonationState::Failed {
            reason: "boom".to_string()
        }
        .to_string()
        .contains("boom"));
        assert!(DonationState::Succeeded {
            tx_hash: TxHash::zero()
        }
        .is_final());
        assert!(!DonationState::Executing.is_final());
    }
}
