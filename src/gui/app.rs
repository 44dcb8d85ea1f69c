//! Main GUI application module
//!
//! Owns the services, the background jobs and the strategy screen state.

use crate::{
    chain::ChainDonationService,
    config::Config,
    donation::{DonationFlow, DonationPlan, DonationState},
    operation_log,
    run::{self, HttpRunBackend, Route, RunDetails},
    session::StoredSession,
    user_settings::UserSettings,
    view::StrategyView,
    wallet::{EvmWallet, WalletAccount, WalletProvider},
};
use anyhow::{anyhow, Result};
use eframe::{egui, egui::RichText, App, Frame, NativeOptions};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

use super::async_job::AsyncJob;
use super::notifications::{failure_message, push_notification, NotificationEntry};
use super::theme::{configure_style, AppTheme};

pub struct GuiApp {
    pub(crate) config: Config,
    pub(crate) user_settings: UserSettings,
    pub(crate) theme: AppTheme,
    pub(crate) wallet: Arc<EvmWallet>,
    pub(crate) donation_service: Arc<ChainDonationService>,
    pub(crate) sessions: Arc<StoredSession>,
    pub(crate) backend: Arc<HttpRunBackend>,
    pub(crate) view: Option<StrategyView>,
    pub(crate) run_input: String,
    pub(crate) loading_run: Option<String>,
    pub(crate) load_job: Option<AsyncJob<RunDetails>>,
    pub(crate) load_error: Option<String>,
    pub(crate) connect_job: Option<AsyncJob<WalletAccount>>,
    pub(crate) donation_job: Option<(DonationPlan, AsyncJob<DonationFlow>)>,
    pub(crate) regenerate_job: Option<(String, AsyncJob<Route>)>,
    pub(crate) access_token_input: String,
    pub(crate) show_session_window: bool,
    pub(crate) notifications: VecDeque<NotificationEntry>,
    pub(crate) show_notifications_popup: bool,
}

impl GuiApp {
    fn new(
        config: Config,
        user_settings: UserSettings,
        wallet: Arc<EvmWallet>,
        run_id: Option<String>,
        ctx: &egui::Context,
    ) -> Self {
        let theme = AppTheme::default();
        configure_style(ctx, &theme);

        let sessions = Arc::new(StoredSession::from_config(&config));
        let backend = Arc::new(HttpRunBackend::new(&config.api_url));
        let donation_service = Arc::new(ChainDonationService::new(wallet.clone()));
        let initial_run = run_id.or_else(|| user_settings.last_run_id.clone());

        let mut app = Self {
            config,
            user_settings,
            theme,
            wallet,
            donation_service,
            sessions,
            backend,
            view: None,
            run_input: initial_run.clone().unwrap_or_default(),
            loading_run: None,
            load_job: None,
            load_error: None,
            connect_job: None,
            donation_job: None,
            regenerate_job: None,
            access_token_input: String::new(),
            show_session_window: false,
            notifications: VecDeque::with_capacity(20),
            show_notifications_popup: false,
        };
        if let Some(run_id) = initial_run {
            app.open_run(&run_id);
        }
        app
    }

    pub(crate) fn notify(&mut self, message: impl Into<String>) {
        push_notification(&mut self.notifications, message);
    }

    /// Start loading the run behind a `/s/{runId}` path, app URL or bare id
    pub(crate) fn open_run(&mut self, input: &str) {
        let Some(route) = Route::parse(input) else {
            self.notify(format!("[!!] Not a strategy link: {}", input.trim()));
            return;
        };
        let run_id = route.run_id().to_string();
        info!("Opening run {}", run_id);

        let backend = self.backend.clone();
        let id = run_id.clone();
        self.load_job = Some(AsyncJob::spawn(move || async move {
            run::wait_for_strategy(&*backend, &id, run::POLL_INTERVAL, run::MAX_POLL_ATTEMPTS)
                .await
        }));
        self.run_input = run_id.clone();
        self.loading_run = Some(run_id);
        self.load_error = None;
    }

    pub(crate) fn connect_wallet(&mut self) {
        if self.connect_job.is_some() {
            return;
        }
        let wallet = self.wallet.clone();
        self.connect_job = Some(AsyncJob::spawn(move || async move { wallet.connect().await }));
    }

    pub(crate) fn submit_donation(&mut self) {
        if self.donation_job.is_some() {
            return;
        }
        let Some(plan) = self.view.as_mut().and_then(|v| v.begin_donation()) else {
            return;
        };
        let wallet = self.wallet.clone();
        let service = self.donation_service.clone();
        let job_plan = plan.clone();
        let job = AsyncJob::spawn(move || async move {
            Ok(DonationFlow::run(&job_plan, &*wallet, &*service).await)
        });
        self.donation_job = Some((plan, job));
    }

    pub(crate) fn regenerate(&mut self) {
        if self.regenerate_job.is_some() {
            return;
        }
        let Some(prompt) = self.view.as_mut().and_then(|v| v.begin_regenerate()) else {
            return;
        };
        let sessions = self.sessions.clone();
        let backend = self.backend.clone();
        let job_prompt = prompt.clone();
        let job = AsyncJob::spawn(move || async move {
            Ok(run::regenerate_strategy(&job_prompt, &*sessions, &*backend).await?)
        });
        self.regenerate_job = Some((prompt, job));
    }

    pub(crate) fn share_strategy(&mut self) {
        let Some(url) = self.view.as_ref().map(|v| v.share_url()) else {
            return;
        };
        if let Err(e) = open::that(&url) {
            self.notify(format!("Failed to open URL: {}", e));
        }
    }

    /// Persist the current network and token as the next default
    pub(crate) fn remember_selection(&mut self) {
        let Some(view) = &self.view else {
            return;
        };
        if let Some(token) = view.selected_token() {
            self.user_settings
                .remember_selection(view.selected_network(), token.name);
            if let Err(e) = self.user_settings.save() {
                warn!("Failed to save settings: {}", e);
            }
        }
    }

    pub(crate) fn apply_access_token(&mut self) {
        let token = std::mem::take(&mut self.access_token_input);
        self.sessions.set_access_token(&token);
        if token.trim().is_empty() {
            self.notify("Signed out");
        } else {
            self.notify("Session token saved for this run of the app");
        }
        self.show_session_window = false;
    }

    fn poll_jobs(&mut self) {
        if let Some(job) = &mut self.load_job {
            if let Some(res) = job.poll() {
                self.load_job = None;
                self.loading_run = None;
                match res {
                    Ok(details) => self.show_run(details),
                    Err(e) => {
                        self.load_error = Some(e.to_string());
                        self.notify(format!("Failed to load strategy: {}", e));
                    }
                }
            }
        }

        if let Some(job) = &mut self.connect_job {
            if let Some(res) = job.poll() {
                self.connect_job = None;
                match res {
                    Ok(account) => {
                        let kind = self.wallet.kind_label();
                        self.notify(format!("[OK] Connected {} {:?}", kind, account.address));
                    }
                    Err(e) => {
                        let message = failure_message(&e.to_string());
                        self.notify(message);
                    }
                }
            }
        }

        let finished_donation = match &mut self.donation_job {
            Some((_, job)) => job.poll(),
            None => None,
        };
        if let Some(res) = finished_donation {
            if let Some((plan, _)) = self.donation_job.take() {
                let flow = res.unwrap_or_else(|e| DonationFlow::failed(e.to_string()));
                self.finish_donation(plan, flow);
            }
        }

        let finished_regenerate = match &mut self.regenerate_job {
            Some((_, job)) => job.poll(),
            None => None,
        };
        if let Some(res) = finished_regenerate {
            if let Some((prompt, _)) = self.regenerate_job.take() {
                self.finish_regenerate(&prompt, res);
            }
        }
    }

    fn show_run(&mut self, details: RunDetails) {
        let run_id = details.id.clone();
        let mut view = StrategyView::new(
            &self.config.app_url,
            details,
            Some(self.user_settings.preferred_network),
            None,
        );
        if let Some(token) = self.user_settings.preferred_token(view.selected_network()) {
            view.select_token(token);
        }
        self.view = Some(view);

        self.user_settings.last_run_id = Some(run_id.clone());
        if let Err(e) = self.user_settings.save() {
            warn!("Failed to save settings: {}", e);
        }
        self.notify(format!("Loaded strategy {}", run_id));
    }

    fn finish_donation(&mut self, plan: DonationPlan, flow: DonationFlow) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        let run_id = view.run_id().to_string();
        if let Err(e) = operation_log::log_donation(&run_id, &plan, &flow) {
            warn!("Failed to write operation log: {}", e);
        }

        let message = match flow.state() {
            DonationState::Succeeded { tx_hash } => Some(format!("[OK] Donation sent: {:?}", tx_hash)),
            DonationState::Failed { reason } => Some(failure_message(reason)),
            DonationState::ChainSwitchRequested { .. } | DonationState::WalletRequired => {
                Some(flow.state().to_string())
            }
            _ => None,
        };
        view.apply_flow(flow);
        if let Some(message) = message {
            self.notify(message);
        }
    }

    fn finish_regenerate(&mut self, prompt: &str, res: Result<Route>) {
        let run_id = match self.view.as_mut() {
            Some(view) => {
                view.finish_regenerate();
                view.run_id().to_string()
            }
            None => String::new(),
        };
        let outcome = match &res {
            Ok(route) => route.path(),
            Err(e) => format!("error: {}", e),
        };
        if let Err(e) = operation_log::log_regeneration(&run_id, prompt, &outcome) {
            warn!("Failed to write operation log: {}", e);
        }

        match res {
            Ok(route) => {
                self.notify(format!("Regenerating strategy at {}", route));
                self.open_run(&route.path());
            }
            Err(e) => self.notify(format!("[!!] Regenerate failed: {}", e)),
        }
    }

    fn render_top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.add_space(self.theme.spacing_sm);
            ui.horizontal(|ui| {
                ui.heading(RichText::new("fundpublicgoods").strong().color(self.theme.primary));
                ui.label(
                    RichText::new(format!("v{}", env!("CARGO_PKG_VERSION")))
                        .size(12.0)
                        .color(self.theme.text_secondary),
                );
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    match self.wallet.account() {
                        Some(account) => {
                            ui.label(
                                RichText::new(format!(
                                    "{} {:?} on {}",
                                    self.wallet.kind_label(),
                                    account.address,
                                    self.wallet.connected_network()
                                ))
                                .color(self.theme.text_secondary),
                            );
                        }
                        None => {
                            let label = if self.connect_job.is_some() { "Connecting..." } else { "Connect" };
                            if ui
                                .add_enabled(self.connect_job.is_none(), self.theme.button_secondary(label))
                                .clicked()
                            {
                                self.connect_wallet();
                            }
                        }
                    }
                    if ui.add(self.theme.button_secondary("Session")).clicked() {
                        self.show_session_window = !self.show_session_window;
                    }
                });
            });
            ui.add_space(self.theme.spacing_sm);
        });
    }

    fn render_session_window(&mut self, ctx: &egui::Context) {
        if !self.show_session_window {
            return;
        }
        let mut open = true;
        let mut apply = false;
        egui::Window::new("Session")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .show(ctx, |ui| {
                ui.label("Access token used to start new strategy runs:");
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.access_token_input)
                        .password(true)
                        .desired_width(320.0),
                );
                let enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.add(self.theme.button_secondary("Save")).clicked() || enter {
                    apply = true;
                }
            });
        if apply {
            self.apply_access_token();
        }
        if !open {
            self.show_session_window = false;
        }
    }

    fn render_notifications(&mut self, ctx: &egui::Context) {
        let latest = self.notifications.back().map(|n| n.message.clone());
        egui::Area::new(egui::Id::new("notification_overlay"))
            .anchor(egui::Align2::RIGHT_BOTTOM, [-10.0, -10.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                self.theme.frame_surface().show(ui, |ui| {
                    ui.horizontal(|ui| {
                        if ui
                            .button(format!("[{}]", self.notifications.len()))
                            .on_hover_text("Click to view notification history")
                            .clicked()
                        {
                            self.show_notifications_popup = !self.show_notifications_popup;
                        }
                        if let Some(message) = &latest {
                            let first_line = message.lines().next().unwrap_or_default();
                            let display: String = first_line.chars().take(60).collect();
                            ui.label(RichText::new(display).size(12.0));
                        }
                    });
                });
            });

        if self.show_notifications_popup {
            egui::Window::new("Notifications")
                .collapsible(false)
                .default_width(420.0)
                .anchor(egui::Align2::RIGHT_BOTTOM, [-10.0, -60.0])
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        if ui.button("Close").clicked() {
                            self.show_notifications_popup = false;
                        }
                        if ui.button("Clear").clicked() {
                            self.notifications.clear();
                        }
                    });
                    ui.separator();
                    egui::ScrollArea::vertical().max_height(280.0).show(ui, |ui| {
                        if self.notifications.is_empty() {
                            ui.label(RichText::new("No notifications yet.").color(self.theme.text_secondary));
                        }
                        for notification in self.notifications.iter().rev() {
                            ui.horizontal_wrapped(|ui| {
                                ui.label(
                                    RichText::new(format!("[{}]", notification.time_ago()))
                                        .size(11.0)
                                        .color(self.theme.text_secondary),
                                );
                                ui.label(RichText::new(&notification.message).size(12.0));
                            });
                        }
                    });
                });
        }
    }
}

impl App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_jobs();

        self.render_top_bar(ctx);
        self.render_session_window(ctx);
        self.render_notifications(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(self.theme.spacing_md);
            egui::ScrollArea::vertical().show(ui, |ui| {
                if self.view.is_some() {
                    self.view_strategy(ui);
                } else {
                    self.view_open_run(ui);
                }
            });
        });
        self.render_success_modal(ctx);

        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}

/// Launch the desktop app, optionally opening `run_id` right away
pub fn launch(config: Config, run_id: Option<String>) -> Result<()> {
    let user_settings = UserSettings::load();
    let config = config.with_settings(&user_settings);
    let wallet = Arc::new(EvmWallet::new(config.clone(), user_settings.preferred_network)?);

    let app_creator = move |cc: &eframe::CreationContext<'_>| {
        Box::new(GuiApp::new(
            config.clone(),
            user_settings.clone(),
            wallet.clone(),
            run_id.clone(),
            &cc.egui_ctx,
        )) as Box<dyn App>
    };

    let viewport = egui::ViewportBuilder::default().with_inner_size([1100.0, 760.0]);
    let native_options = NativeOptions {
        viewport,
        persist_window: true,
        ..Default::default()
    };

    eframe::run_native("fundpublicgoods", native_options, Box::new(app_creator))
        .map_err(|e| anyhow!("Failed to start GUI: {}", e))
}
