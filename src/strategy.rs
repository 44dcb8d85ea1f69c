//! Strategy entries and the handler that owns their selection and amounts.
//!
//! A strategy is the backend's proposed allocation of one funding amount across
//! several projects. Each entry carries a relative weight; the handler splits
//! the user's total across the selected entries in proportion to those weights
//! and keeps the split consistent as selection, amount and network change.

use crate::amount::{self, format_token_amount, parse_token_amount, AmountError};
use crate::config::NetworkName;
use crate::donation::DonationRequest;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Split precision when no funding token is selected (USDC-style 6 decimals)
pub const DEFAULT_SPLIT_DECIMALS: u32 = 6;

/// Weights are scaled to integers before splitting
const WEIGHT_SCALE: f64 = 1_000_000.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub twitter: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyEntry {
    pub project: Project,
    /// Networks the project can receive funds on
    #[serde(default)]
    pub networks: Vec<NetworkName>,
    /// Recipient address per entry of `networks`
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub impact: Option<f64>,
    #[serde(default)]
    pub interest: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub amount: Option<String>,
    /// Set when the entry cannot receive funds on the active network
    #[serde(default)]
    pub disabled: bool,
}

pub type StrategiesWithProjects = Vec<StrategyEntry>;

impl StrategyEntry {
    pub fn supports(&self, network: NetworkName) -> bool {
        self.networks.contains(&network)
    }

    /// Recipient address on `network`, if the project listed one
    pub fn recipient_for(&self, network: NetworkName) -> Option<&str> {
        self.networks
            .iter()
            .position(|n| *n == network)
            .and_then(|idx| self.recipients.get(idx))
            .map(|s| s.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("no strategy entry at index {0}")]
    IndexOutOfRange(usize),
    #[error("{title} cannot receive funds on this network")]
    RowDisabled { title: String },
    #[error("{title} has no recipient address on {network}")]
    MissingRecipient { title: String, network: NetworkName },
    #[error("{title} has an invalid recipient address: {value}")]
    InvalidRecipient { title: String, value: String },
}

/// Networks with at least one entry able to receive funds, in table order
pub fn available_networks(strategies: &[StrategyEntry]) -> Vec<NetworkName> {
    NetworkName::all()
        .filter(|n| strategies.iter().any(|s| s.supports(*n)))
        .collect()
}

/// Owns per-entry selection and amount state for one strategy.
#[derive(Clone, Debug)]
pub struct StrategiesHandler {
    strategies: Vec<StrategyEntry>,
    total: String,
    network: NetworkName,
    decimals: u32,
    split_error: Option<AmountError>,
}

impl StrategiesHandler {
    /// `decimals` is the precision of the funding token the total is split in
    pub fn new(fetched: StrategiesWithProjects, amount: &str, network: NetworkName, decimals: u32) -> Self {
        let strategies = fetched
            .into_iter()
            .map(|mut s| {
                s.disabled = !s.supports(network);
                s.selected = !s.disabled && s.weight > 0.0;
                s.amount = None;
                s
            })
            .collect();
        let mut handler = Self {
            strategies,
            total: amount.to_string(),
            network,
            decimals,
            split_error: None,
        };
        handler.redistribute();
        handler
    }

    pub fn strategies(&self) -> &[StrategyEntry] {
        &self.strategies
    }

    pub fn network(&self) -> NetworkName {
        self.network
    }

    pub fn total(&self) -> &str {
        &self.total
    }

    pub fn selected_count(&self) -> usize {
        self.strategies.iter().filter(|s| s.selected).count()
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Why the current total could not be split, if it could not
    pub fn split_error(&self) -> Option<&AmountError> {
        self.split_error.as_ref()
    }

    /// Split a new total across the selected entries
    pub fn handle_amount_update(&mut self, total: &str) {
        self.total = total.to_string();
        self.redistribute();
    }

    /// Re-split the total in the precision of a newly selected token
    pub fn handle_decimals_update(&mut self, decimals: u32) {
        if self.decimals != decimals {
            self.decimals = decimals;
            self.redistribute();
        }
    }

    /// Re-evaluate which entries can be funded on `network`
    pub fn handle_network_update(&mut self, network: NetworkName) {
        self.network = network;
        for s in &mut self.strategies {
            s.disabled = !s.supports(network);
            if s.disabled {
                s.selected = false;
            }
        }
        debug!(
            "Network set to {}: {} of {} entries selectable",
            network,
            self.strategies.iter().filter(|s| !s.disabled).count(),
            self.strategies.len()
        );
        self.redistribute();
    }

    pub fn toggle_selection(&mut self, index: usize) -> Result<(), StrategyError> {
        let entry = self
            .strategies
            .get_mut(index)
            .ok_or(StrategyError::IndexOutOfRange(index))?;
        if entry.disabled {
            return Err(StrategyError::RowDisabled {
                title: entry.project.title.clone(),
            });
        }
        entry.selected = !entry.selected;
        self.redistribute();
        Ok(())
    }

    pub fn set_all_selected(&mut self, selected: bool) {
        for s in self.strategies.iter_mut().filter(|s| !s.disabled) {
            s.selected = selected;
        }
        self.redistribute();
    }

    /// Manual edit of one entry's amount. Other entries keep their amounts.
    pub fn handle_row_amount_update(&mut self, index: usize, raw: &str) -> Result<(), StrategyError> {
        let entry = self
            .strategies
            .get_mut(index)
            .ok_or(StrategyError::IndexOutOfRange(index))?;
        if entry.disabled {
            return Err(StrategyError::RowDisabled {
                title: entry.project.title.clone(),
            });
        }
        entry.amount = Some(amount::sanitize_amount(raw));
        Ok(())
    }

    /// Selected entries as donation requests on the active network
    pub fn donations(&self) -> Result<Vec<DonationRequest>, StrategyError> {
        self.strategies
            .iter()
            .filter(|s| s.selected)
            .map(|s| {
                let raw = s.recipient_for(self.network).ok_or_else(|| {
                    StrategyError::MissingRecipient {
                        title: s.project.title.clone(),
                        network: self.network,
                    }
                })?;
                let recipient: Address =
                    raw.trim()
                        .parse()
                        .map_err(|_| StrategyError::InvalidRecipient {
                            title: s.project.title.clone(),
                            value: raw.to_string(),
                        })?;
                Ok(DonationRequest {
                    amount: s.amount.clone().unwrap_or_else(|| "0".to_string()),
                    description: s.project.description.clone(),
                    title: s.project.title.clone(),
                    recipient,
                })
            })
            .collect()
    }

    fn redistribute(&mut self) {
        let shares = match parse_token_amount(&self.total, self.decimals) {
            Ok(total) => self.split(total),
            Err(AmountError::Empty) => self.split(U256::zero()),
            Err(e) => Err(e),
        };

        match shares {
            Ok(shares) => {
                self.split_error = None;
                let decimals = self.decimals;
                for (s, share) in self.strategies.iter_mut().zip(shares) {
                    s.amount = share.map(|v| format_token_amount(v, decimals));
                }
            }
            Err(e) => {
                debug!("Cannot split total '{}': {}", self.total, e);
                for s in &mut self.strategies {
                    s.amount = None;
                }
                self.split_error = Some(e);
            }
        }
    }

    /// Base-unit share of `total` per entry, None for unselected entries
    fn split(&self, total: U256) -> Result<Vec<Option<U256>>, AmountError> {
        let weights: Vec<U256> = self
            .strategies
            .iter()
            .map(|s| {
                if s.selected {
                    U256::from((s.weight.max(0.0) * WEIGHT_SCALE).round() as u64)
                } else {
                    U256::zero()
                }
            })
            .collect();
        let mut weight_sum = weights
            .iter()
            .try_fold(U256::zero(), |acc, w| acc.checked_add(*w))
            .ok_or(AmountError::TooLarge)?;
        let equal_split = weight_sum.is_zero();
        if equal_split {
            weight_sum = U256::from(self.selected_count());
        }

        let mut shares = Vec::with_capacity(self.strategies.len());
        for (s, w) in self.strategies.iter().zip(&weights) {
            if !s.selected || weight_sum.is_zero() {
                shares.push(None);
                continue;
            }
            let w = if equal_split { U256::one() } else { *w };
            let scaled = total.checked_mul(w).ok_or(AmountError::TooLarge)?;
            shares.push(Some(scaled / weight_sum));
        }

        // Integer division leaves dust; give it to the first selected entry.
        let assigned = shares
            .iter()
            .flatten()
            .fold(U256::zero(), |acc, x| acc + *x);
        if let Some(first) = shares.iter_mut().flatten().next() {
            *first += total - assigned;
        }
        Ok(shares)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn project(title: &str, twitter: Option<&str>) -> Project {
        Project {
            id: title.to_lowercase(),
            title: title.to_string(),
            description: format!("{} description", title),
            website: format!("https://{}.example", title.to_lowercase()),
            twitter: twitter.map(|t| t.to_string()),
        }
    }

    pub(crate) fn entry(title: &str, weight: f64, networks: &[NetworkName]) -> StrategyEntry {
        StrategyEntry {
            project: project(title, None),
            networks: networks.to_vec(),
            recipients: networks
                .iter()
                .enumerate()
                .map(|(i, _)| format!("0x{:040x}", i + 1))
                .collect(),
            weight,
            impact: None,
            interest: None,
            reasoning: None,
            selected: false,
            amount: None,
            disabled: false,
        }
    }

    fn amounts(handler: &StrategiesHandler) -> Vec<Option<String>> {
        handler.strategies().iter().map(|s| s.amount.clone()).collect()
    }

    // ==================== construction tests ====================

    #[test]
    fn test_new_selects_weighted_supported_entries() {
        let handler = StrategiesHandler::new(
            vec![
                entry("A", 0.5, &[NetworkName::Mainnet]),
                entry("B", 0.0, &[NetworkName::Mainnet]),
                entry("C", 0.5, &[NetworkName::Polygon]),
            ],
            "0",
            NetworkName::Mainnet,
            DEFAULT_SPLIT_DECIMALS,
        );
        let selected: Vec<bool> = handler.strategies().iter().map(|s| s.selected).collect();
        assert_eq!(selected, vec![true, false, false]);
        assert!(handler.strategies()[2].disabled);
        assert_eq!(handler.selected_count(), 1);
    }

    #[test]
    fn test_available_networks_in_table_order() {
        let strategies = vec![
            entry("A", 1.0, &[NetworkName::Base, NetworkName::Mainnet]),
            entry("B", 1.0, &[NetworkName::Optimism]),
        ];
        assert_eq!(
            available_networks(&strategies),
            vec![NetworkName::Mainnet, NetworkName::Optimism, NetworkName::Base]
        );
    }

    // ==================== amount split tests ====================

    #[test]
    fn test_amount_split_by_weight() {
        let mut handler = StrategiesHandler::new(
            vec![
                entry("A", 0.75, &[NetworkName::Mainnet]),
                entry("B", 0.25, &[NetworkName::Mainnet]),
            ],
            "0",
            NetworkName::Mainnet,
            DEFAULT_SPLIT_DECIMALS,
        );
        handler.handle_amount_update("100");
        assert_eq!(
            amounts(&handler),
            vec![Some("75".to_string()), Some("25".to_string())]
        );
    }

    #[test]
    fn test_amount_split_sums_exactly_to_total() {
        let mut handler = StrategiesHandler::new(
            vec![
                entry("A", 1.0, &[NetworkName::Mainnet]),
                entry("B", 1.0, &[NetworkName::Mainnet]),
                entry("C", 1.0, &[NetworkName::Mainnet]),
            ],
            "0",
            NetworkName::Mainnet,
            DEFAULT_SPLIT_DECIMALS,
        );
        handler.handle_amount_update("10");
        let sum = handler
            .strategies()
            .iter()
            .filter_map(|s| s.amount.as_deref())
            .map(|a| parse_token_amount(a, DEFAULT_SPLIT_DECIMALS).unwrap())
            .fold(U256::zero(), |acc, x| acc + x);
        assert_eq!(sum, parse_token_amount("10", DEFAULT_SPLIT_DECIMALS).unwrap());
        assert_eq!(handler.strategies()[0].amount.as_deref(), Some("3.333334"));
        assert_eq!(handler.strategies()[1].amount.as_deref(), Some("3.333333"));
    }

    #[test]
    fn test_empty_total_gives_zero_amounts() {
        let mut handler = StrategiesHandler::new(
            vec![entry("A", 1.0, &[NetworkName::Mainnet])],
            "0",
            NetworkName::Mainnet,
            DEFAULT_SPLIT_DECIMALS,
        );
        handler.handle_amount_update("");
        assert_eq!(amounts(&handler), vec![Some("0".to_string())]);
        assert!(handler.split_error().is_none());
    }

    #[test]
    fn test_huge_total_is_a_split_error() {
        let mut handler = StrategiesHandler::new(
            vec![
                entry("A", 0.5, &[NetworkName::Mainnet]),
                entry("B", 0.5, &[NetworkName::Mainnet]),
            ],
            "0",
            NetworkName::Mainnet,
            DEFAULT_SPLIT_DECIMALS,
        );
        handler.handle_amount_update(&format!("1{}", "0".repeat(70)));
        assert_eq!(handler.split_error(), Some(&AmountError::TooLarge));
        assert_eq!(amounts(&handler), vec![None, None]);

        handler.handle_amount_update("4");
        assert!(handler.split_error().is_none());
        assert_eq!(amounts(&handler), vec![Some("2".to_string()), Some("2".to_string())]);
    }

    #[test]
    fn test_largest_total_splits_without_overflow() {
        let mut handler = StrategiesHandler::new(
            vec![
                entry("A", 0.5, &[NetworkName::Mainnet]),
                entry("B", 0.5, &[NetworkName::Mainnet]),
            ],
            "0",
            NetworkName::Mainnet,
            18,
        );
        let largest = "9".repeat(amount::MAX_INTEGER_DIGITS);
        handler.handle_amount_update(&largest);
        assert!(handler.split_error().is_none());
        let sum = handler
            .strategies()
            .iter()
            .filter_map(|s| s.amount.as_deref())
            .map(|a| parse_token_amount(a, 18).unwrap())
            .fold(U256::zero(), |acc, x| acc + x);
        assert_eq!(sum, parse_token_amount(&largest, 18).unwrap());
    }

    #[test]
    fn test_split_uses_token_precision() {
        let mut handler = StrategiesHandler::new(
            vec![
                entry("A", 0.5, &[NetworkName::Mainnet]),
                entry("B", 0.5, &[NetworkName::Mainnet]),
            ],
            "1.0000001",
            NetworkName::Mainnet,
            DEFAULT_SPLIT_DECIMALS,
        );
        assert_eq!(handler.split_error(), Some(&AmountError::TooPrecise(6)));
        assert_eq!(amounts(&handler), vec![None, None]);

        handler.handle_decimals_update(18);
        assert!(handler.split_error().is_none());
        assert_eq!(handler.decimals(), 18);
        assert_eq!(
            amounts(&handler),
            vec![Some("0.50000005".to_string()), Some("0.50000005".to_string())]
        );
    }

    #[test]
    fn test_toggle_redistributes() {
        let mut handler = StrategiesHandler::new(
            vec![
                entry("A", 0.5, &[NetworkName::Mainnet]),
                entry("B", 0.5, &[NetworkName::Mainnet]),
            ],
            "8",
            NetworkName::Mainnet,
            DEFAULT_SPLIT_DECIMALS,
        );
        assert_eq!(handler.strategies()[0].amount.as_deref(), Some("4"));
        handler.toggle_selection(1).unwrap();
        assert_eq!(amounts(&handler), vec![Some("8".to_string()), None]);
        assert_eq!(handler.selected_count(), 1);
    }

    #[test]
    fn test_toggle_out_of_range_and_disabled() {
        let mut handler = StrategiesHandler::new(
            vec![entry("A", 1.0, &[NetworkName::Polygon])],
            "1",
            NetworkName::Mainnet,
            DEFAULT_SPLIT_DECIMALS,
        );
        assert_eq!(handler.toggle_selection(3), Err(StrategyError::IndexOutOfRange(3)));
        assert!(matches!(
            handler.toggle_selection(0),
            Err(StrategyError::RowDisabled { .. })
        ));
    }

    #[test]
    fn test_zero_weights_split_equally() {
        let mut handler = StrategiesHandler::new(
            vec![
                entry("A", 0.0, &[NetworkName::Mainnet]),
                entry("B", 0.0, &[NetworkName::Mainnet]),
            ],
            "0",
            NetworkName::Mainnet,
            DEFAULT_SPLIT_DECIMALS,
        );
        handler.set_all_selected(true);
        handler.handle_amount_update("3");
        assert_eq!(
            amounts(&handler),
            vec![Some("1.5".to_string()), Some("1.5".to_string())]
        );
    }

    #[test]
    fn test_row_amount_update_is_sanitized() {
        let mut handler = StrategiesHandler::new(
            vec![entry("A", 1.0, &[NetworkName::Mainnet])],
            "1",
            NetworkName::Mainnet,
            DEFAULT_SPLIT_DECIMALS,
        );
        handler.handle_row_amount_update(0, "0a2.5.0").unwrap();
        assert_eq!(handler.strategies()[0].amount.as_deref(), Some("2.50"));
    }

    // ==================== network update tests ====================

    #[test]
    fn test_network_update_deselects_unsupported() {
        let mut handler = StrategiesHandler::new(
            vec![
                entry("A", 0.5, &[NetworkName::Mainnet, NetworkName::Polygon]),
                entry("B", 0.5, &[NetworkName::Mainnet]),
            ],
            "10",
            NetworkName::Mainnet,
            DEFAULT_SPLIT_DECIMALS,
        );
        handler.handle_network_update(NetworkName::Polygon);
        assert_eq!(handler.network(), NetworkName::Polygon);
        assert!(handler.strategies()[1].disabled);
        assert!(!handler.strategies()[1].selected);
        assert_eq!(amounts(&handler), vec![Some("10".to_string()), None]);
    }

    // ==================== donations tests ====================

    #[test]
    fn test_donations_use_recipient_for_network() {
        let handler = StrategiesHandler::new(
            vec![entry("A", 1.0, &[NetworkName::Mainnet, NetworkName::Base])],
            "2",
            NetworkName::Base,
            DEFAULT_SPLIT_DECIMALS,
        );
        let donations = handler.donations().unwrap();
        assert_eq!(donations.len(), 1);
        assert_eq!(donations[0].title, "A");
        assert_eq!(donations[0].description, "A description");
        assert_eq!(donations[0].amount, "2");
        assert_eq!(
            donations[0].recipient,
            format!("0x{:040x}", 2).parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_donations_missing_recipient() {
        let mut a = entry("A", 1.0, &[NetworkName::Mainnet]);
        a.recipients.clear();
        let handler = StrategiesHandler::new(vec![a], "2", NetworkName::Mainnet, DEFAULT_SPLIT_DECIMALS);
        assert_eq!(
            handler.donations(),
            Err(StrategyError::MissingRecipient {
                title: "A".to_string(),
                network: NetworkName::Mainnet
            })
        );
    }

    #[test]
    fn test_entry_deserializes_from_backend_json() {
        let json = r#"{
            "project": {"id": "p1", "title": "Lib", "description": "d", "twitter": "lib_dev"},
            "networks": ["mainnet", "optimism"],
            "recipients": ["0x0000000000000000000000000000000000000001", "0x0000000000000000000000000000000000000002"],
            "weight": 0.4,
            "impact": 0.9
        }"#;
        let parsed: StrategyEntry = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.project.twitter.as_deref(), Some("lib_dev"));
        assert_eq!(
            parsed.recipient_for(NetworkName::Optimism),
            Some("0x0000000000000000000000000000000000000002")
        );
        assert!(!parsed.selected);
        assert!(parsed.amount.is_none());
    }
}
