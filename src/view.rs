//! Screen state for reviewing and funding one strategy run.
//!
//! `StrategyView` is the single owner of everything the strategy screen
//! shows. The GUI forwards input events to it and renders from its
//! accessors; donation and regeneration are driven through it as well.

use crate::amount::{self, parse_token_amount, AmountError};
use crate::config::NetworkName;
use crate::donation::{DonationFlow, DonationPlan, DonationService, DonationState};
use crate::run::{regenerate_strategy, RegenerateError, Route, RunBackend, RunDetails};
use crate::session::SessionProvider;
use crate::share;
use crate::strategy::{
    available_networks, StrategiesHandler, StrategiesWithProjects, StrategyError, DEFAULT_SPLIT_DECIMALS,
};
use crate::tokens::{Token, TokenSelection};
use crate::wallet::WalletProvider;
use tracing::{info, warn};

pub struct StrategyView {
    app_url: String,
    run_id: String,
    prompt: String,
    current_prompt: String,
    fetched: StrategiesWithProjects,
    networks: Vec<NetworkName>,
    tokens: TokenSelection,
    amount: String,
    balance: Option<String>,
    strategies: StrategiesHandler,
    is_regenerating: bool,
    donation_pending: bool,
    show_success_modal: bool,
    funded_count: usize,
    last_flow: Option<DonationFlow>,
    status: Option<String>,
}

impl StrategyView {
    /// Build the screen for a loaded run, starting on `preferred_network` when the run supports it
    pub fn new(
        app_url: &str,
        run: RunDetails,
        preferred_network: Option<NetworkName>,
        preferred_token: Option<&str>,
    ) -> Self {
        let networks = available_networks(&run.strategies);
        let network = preferred_network
            .filter(|n| networks.contains(n))
            .or_else(|| networks.first().copied())
            .unwrap_or(NetworkName::Mainnet);
        let tokens = TokenSelection::with_preferred(network, preferred_token);
        let decimals = tokens.selected().map_or(DEFAULT_SPLIT_DECIMALS, |t| t.decimals);
        let strategies = StrategiesHandler::new(run.strategies.clone(), "0", network, decimals);
        info!(
            "Strategy view for run {}: {} entries, networks {:?}",
            run.id,
            run.strategies.len(),
            networks
        );

        Self {
            app_url: app_url.trim_end_matches('/').to_string(),
            run_id: run.id,
            current_prompt: run.prompt.clone(),
            prompt: run.prompt,
            fetched: run.strategies,
            networks,
            tokens,
            amount: "0".to_string(),
            balance: None,
            strategies,
            is_regenerating: false,
            donation_pending: false,
            show_success_modal: false,
            funded_count: 0,
            last_flow: None,
            status: None,
        }
    }

    // ---- accessors ----

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Prompt the run was generated from
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Prompt text as currently edited
    pub fn current_prompt(&self) -> &str {
        &self.current_prompt
    }

    pub fn networks(&self) -> &[NetworkName] {
        &self.networks
    }

    pub fn selected_network(&self) -> NetworkName {
        self.tokens.network()
    }

    pub fn tokens(&self) -> &TokenSelection {
        &self.tokens
    }

    pub fn selected_token(&self) -> Option<Token> {
        self.tokens.selected()
    }

    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn balance(&self) -> Option<&str> {
        self.balance.as_deref()
    }

    pub fn strategies(&self) -> &StrategiesHandler {
        &self.strategies
    }

    pub fn selected_count(&self) -> usize {
        self.strategies.selected_count()
    }

    pub fn is_regenerating(&self) -> bool {
        self.is_regenerating
    }

    pub fn is_donation_pending(&self) -> bool {
        self.donation_pending
    }

    pub fn show_success_modal(&self) -> bool {
        self.show_success_modal
    }

    pub fn last_flow(&self) -> Option<&DonationFlow> {
        self.last_flow.as_ref()
    }

    /// Latest non-success outcome worth showing to the user
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    // ---- prompt ----

    pub fn set_prompt(&mut self, text: &str) {
        self.current_prompt = text.to_string();
    }

    /// A non-blank prompt and no regeneration in flight
    pub fn can_regenerate(&self) -> bool {
        !self.current_prompt.trim().is_empty() && !self.is_regenerating
    }

    /// Whether an Enter keypress in the prompt field should regenerate
    pub fn should_regenerate_on_enter(&self, enter_pressed: bool) -> bool {
        enter_pressed && self.can_regenerate()
    }

    // ---- network, token, amount ----

    /// Switch the active network. Ignored for single-network runs and unknown networks.
    pub fn select_network(&mut self, network: NetworkName) -> bool {
        if self.networks.len() <= 1
            || !self.networks.contains(&network)
            || network == self.selected_network()
        {
            return false;
        }
        self.tokens = TokenSelection::new(network);
        self.balance = None;
        let decimals = self.token_decimals();
        self.strategies.handle_decimals_update(decimals);
        self.strategies.handle_network_update(network);
        true
    }

    pub fn select_token(&mut self, name: &str) -> bool {
        let changed = self.tokens.update_token(name);
        if changed {
            self.balance = None;
            let decimals = self.token_decimals();
            self.strategies.handle_decimals_update(decimals);
        }
        changed
    }

    fn token_decimals(&self) -> u32 {
        self.selected_token()
            .map_or(DEFAULT_SPLIT_DECIMALS, |t| t.decimals)
    }

    /// Apply a keystroke-edited total; the stored value is always sanitized
    pub fn input_amount(&mut self, raw: &str) {
        let sanitized = amount::sanitize_amount(raw);
        if sanitized != "0" {
            self.strategies.handle_amount_update(&sanitized);
        }
        self.amount = sanitized;
        self.balance = None;
    }

    pub fn toggle_row(&mut self, index: usize) -> Result<(), StrategyError> {
        self.strategies.toggle_selection(index)
    }

    pub fn set_all_selected(&mut self, selected: bool) {
        self.strategies.set_all_selected(selected);
    }

    pub fn input_row_amount(&mut self, index: usize, raw: &str) -> Result<(), StrategyError> {
        self.strategies.handle_row_amount_update(index, raw)
    }

    // ---- derived display state ----

    /// Nothing selected or no amount entered
    pub fn is_submit_disabled(&self) -> bool {
        self.selected_count() == 0 || amount::is_unset(&self.amount)
    }

    pub fn can_submit(&self) -> bool {
        !self.is_submit_disabled() && !self.donation_pending && self.invalid_amount().is_none()
    }

    /// The entered total cannot be sent in the selected token
    fn invalid_amount(&self) -> Option<AmountError> {
        if amount::is_unset(&self.amount) {
            return None;
        }
        match parse_token_amount(&self.amount, self.token_decimals()) {
            Ok(_) => self.strategies.split_error().cloned(),
            Err(e) => Some(e),
        }
    }

    /// Inline error under the amount field: an amount the token cannot carry,
    /// or a balance known to be too low
    pub fn amount_error(&self) -> Option<String> {
        if let Some(e) = self.invalid_amount() {
            return Some(match (e, self.selected_token()) {
                (AmountError::TooPrecise(decimals), Some(token)) => {
                    format!("{} supports at most {} decimal places", token.name, decimals)
                }
                (e, _) => format!("Invalid amount: {}", e),
            });
        }
        let balance = self.balance.as_deref()?;
        let token = self.selected_token()?;
        let entered = parse_token_amount(&self.amount, token.decimals).ok()?;
        let available = parse_token_amount(balance, token.decimals).ok()?;
        (entered >= available).then(|| format!("Insufficient {} balance", token.name))
    }

    pub fn fund_button_label(&self) -> String {
        if self.donation_pending {
            "Pending".to_string()
        } else {
            share::fund_button_label(self.selected_count())
        }
    }

    pub fn connect_hint(&self) -> String {
        share::connect_hint(self.selected_count())
    }

    pub fn selection_summary(&self) -> String {
        share::selection_summary(self.selected_count(), &self.prompt)
    }

    pub fn success_title(&self) -> String {
        share::success_title(self.funded_count)
    }

    pub fn share_url(&self) -> String {
        share::tweet_url(
            self.fetched.iter().map(|s| &s.project),
            &self.app_url,
            &self.run_id,
        )
    }

    pub fn dismiss_success_modal(&mut self) {
        self.show_success_modal = false;
    }

    // ---- donation ----

    pub fn donation_plan(&self) -> DonationPlan {
        DonationPlan {
            network: self.selected_network(),
            token: self.selected_token(),
            amount: self.amount.clone(),
            selected_count: self.selected_count(),
            donations: self.strategies.donations(),
        }
    }

    /// Mark a donation in flight and snapshot its plan. None while one is pending
    /// or when submission is disabled.
    pub fn begin_donation(&mut self) -> Option<DonationPlan> {
        if !self.can_submit() {
            return None;
        }
        self.donation_pending = true;
        self.status = None;
        Some(self.donation_plan())
    }

    /// Fold a finished donation flow back into the screen state
    pub fn apply_flow(&mut self, flow: DonationFlow) {
        self.donation_pending = false;
        if !flow.state().is_final() {
            warn!("Donation for run {} stopped in state {:?}", self.run_id, flow.state());
            self.status = Some(format!("Donation interrupted: {}", flow.state()));
            self.last_flow = Some(flow);
            return;
        }
        match flow.state() {
            DonationState::Succeeded { .. } => {
                self.funded_count = self.selected_count();
                self.show_success_modal = true;
                self.status = None;
            }
            DonationState::InsufficientBalance { balance } => {
                self.balance = Some(balance.clone());
                self.status = None;
            }
            DonationState::Failed { reason } => {
                warn!("Donation for run {} failed: {}", self.run_id, reason);
                self.status = Some(flow.state().to_string());
            }
            DonationState::ChainSwitchRequested { .. } | DonationState::WalletRequired => {
                self.status = Some(flow.state().to_string());
            }
            _ => {}
        }
        self.last_flow = Some(flow);
    }

    /// Run a full donation attempt against the given services
    pub async fn submit(
        &mut self,
        wallet: &dyn WalletProvider,
        service: &dyn DonationService,
    ) -> Option<&DonationState> {
        let plan = self.begin_donation()?;
        let flow = DonationFlow::run(&plan, wallet, service).await;
        self.apply_flow(flow);
        self.last_flow.as_ref().map(|f| f.state())
    }

    // ---- regenerate ----

    /// Mark a regeneration in flight and return the prompt to send.
    /// None for a blank prompt or while one is in flight.
    pub fn begin_regenerate(&mut self) -> Option<String> {
        if !self.can_regenerate() {
            return None;
        }
        self.is_regenerating = true;
        Some(self.current_prompt.clone())
    }

    pub fn finish_regenerate(&mut self) {
        self.is_regenerating = false;
    }

    /// Start a new run for the edited prompt and return where to navigate
    pub async fn regenerate(
        &mut self,
        sessions: &dyn SessionProvider,
        backend: &dyn RunBackend,
    ) -> Result<Route, RegenerateError> {
        let prompt = self.begin_regenerate().unwrap_or_else(|| self.current_prompt.clone());
        let result = regenerate_strategy(&prompt, sessions, backend).await;
        self.finish_regenerate();
        result
    }
}
