//! Strategy screen rendering
//!
//! Widgets read from the `StrategyView` and report what the user did as
//! [`StrategyAction`]s. Actions that start background work are applied on
//! `GuiApp` once rendering is done.

use crate::config::NetworkName;
use crate::gui::app::GuiApp;
use crate::share::GITCOIN_URL;
use crate::wallet::WalletProvider;
use eframe::egui::{self, RichText};
use egui_extras::{Column, TableBuilder};

enum StrategyAction {
    Regenerate,
    SelectNetwork(NetworkName),
    SelectToken(&'static str),
    Connect,
    Fund,
    Share,
}

impl GuiApp {
    /// Landing panel shown until a run is loaded
    pub(crate) fn view_open_run(&mut self, ui: &mut egui::Ui) {
        self.theme.frame_surface().show(ui, |ui| {
            ui.heading("Open a strategy");
            ui.label(
                RichText::new("Paste a strategy link or run id.")
                    .color(self.theme.text_secondary),
            );
            ui.add_space(self.theme.spacing_sm);

            let mut open = false;
            ui.horizontal(|ui| {
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.run_input)
                        .hint_text("https://fundpublicgoods.ai/s/...")
                        .desired_width(420.0),
                );
                let enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                let busy = self.load_job.is_some();
                if ui.add_enabled(!busy, self.theme.button_secondary("Open")).clicked() || (enter && !busy) {
                    open = true;
                }
            });

            if let Some(run_id) = &self.loading_run {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(format!("Waiting for strategy {}...", run_id));
                });
            }
            if let Some(error) = &self.load_error {
                ui.label(RichText::new(error).color(self.theme.error));
            }

            if open {
                let input = self.run_input.clone();
                self.open_run(&input);
            }
        });
    }

    /// Strategy review and funding screen
    pub(crate) fn view_strategy(&mut self, ui: &mut egui::Ui) {
        let theme = self.theme;
        let wallet_connected = self.wallet.account().is_some();
        let mut actions = Vec::new();
        let mut notices = Vec::new();

        let Some(view) = self.view.as_mut() else {
            return;
        };

        if let Some(run_id) = &self.loading_run {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label(format!("Loading strategy {}...", run_id));
            });
        }

        // Prompt and regenerate
        theme.frame_surface().show(ui, |ui| {
            ui.horizontal(|ui| {
                let mut prompt = view.current_prompt().to_string();
                let response = ui.add_enabled(
                    !view.is_regenerating(),
                    egui::TextEdit::singleline(&mut prompt).desired_width(ui.available_width() - 140.0),
                );
                if response.changed() {
                    view.set_prompt(&prompt);
                }
                let enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                let label = if view.is_regenerating() { "Regenerating..." } else { "Regenerate" };
                let clicked = ui
                    .add_enabled(view.can_regenerate(), theme.button_secondary(label))
                    .clicked();
                if view.should_regenerate_on_enter(enter) || clicked {
                    actions.push(StrategyAction::Regenerate);
                }
            });
        });
        ui.add_space(theme.spacing_md);

        // Network and token
        ui.horizontal(|ui| {
            ui.label("Network");
            let current = view.selected_network();
            let single = view.networks().len() <= 1;
            ui.add_enabled_ui(!single, |ui| {
                egui::ComboBox::from_id_source("strategy_network")
                    .selected_text(current.label())
                    .show_ui(ui, |ui| {
                        for network in view.networks() {
                            if ui.selectable_label(*network == current, network.label()).clicked()
                                && *network != current
                            {
                                actions.push(StrategyAction::SelectNetwork(*network));
                            }
                        }
                    });
            });

            ui.add_space(theme.spacing_md);
            ui.label("Token");
            let selected = view.selected_token();
            egui::ComboBox::from_id_source("strategy_token")
                .selected_text(selected.map(|t| t.name).unwrap_or("-"))
                .show_ui(ui, |ui| {
                    for token in view.tokens().alternatives() {
                        if ui.selectable_label(false, token.name).clicked() {
                            actions.push(StrategyAction::SelectToken(token.name));
                        }
                    }
                });
        });
        ui.add_space(theme.spacing_sm);

        // Strategy table
        let all_selected = view
            .strategies()
            .strategies()
            .iter()
            .filter(|s| !s.disabled)
            .all(|s| s.selected);
        let mut toggles = Vec::new();
        let mut row_edits = Vec::new();
        let mut select_all = None;
        theme.frame_surface().show(ui, |ui| {
            TableBuilder::new(ui)
                .striped(true)
                .column(Column::exact(28.0))
                .column(Column::remainder().at_least(220.0))
                .column(Column::exact(80.0))
                .column(Column::exact(110.0))
                .header(24.0, |mut header| {
                    header.col(|ui| {
                        let mut checked = all_selected;
                        if ui.checkbox(&mut checked, "").changed() {
                            select_all = Some(checked);
                        }
                    });
                    header.col(|ui| {
                        ui.strong("Project");
                    });
                    header.col(|ui| {
                        ui.strong("Weight");
                    });
                    header.col(|ui| {
                        ui.strong("Amount");
                    });
                })
                .body(|mut body| {
                    for (idx, entry) in view.strategies().strategies().iter().enumerate() {
                        body.row(28.0, |mut row| {
                            row.col(|ui| {
                                let mut checked = entry.selected;
                                if ui
                                    .add_enabled(!entry.disabled, egui::Checkbox::without_text(&mut checked))
                                    .changed()
                                {
                                    toggles.push(idx);
                                }
                            });
                            row.col(|ui| {
                                let color = if entry.disabled { theme.text_secondary } else { theme.text_primary };
                                ui.label(RichText::new(&entry.project.title).strong().color(color))
                                    .on_hover_text(&entry.project.description);
                                if entry.disabled {
                                    ui.label(RichText::new("not on this network").small().color(theme.text_secondary));
                                }
                            });
                            row.col(|ui| {
                                ui.label(format!("{:.0}%", entry.weight * 100.0));
                            });
                            row.col(|ui| {
                                let mut amount = entry.amount.clone().unwrap_or_default();
                                let response = ui.add_enabled(
                                    entry.selected,
                                    egui::TextEdit::singleline(&mut amount).desired_width(90.0),
                                );
                                if response.changed() {
                                    row_edits.push((idx, amount));
                                }
                            });
                        });
                    }
                });
        });
        if let Some(selected) = select_all {
            view.set_all_selected(selected);
        }
        for idx in toggles {
            if let Err(e) = view.toggle_row(idx) {
                notices.push(e.to_string());
            }
        }
        for (idx, amount) in row_edits {
            if let Err(e) = view.input_row_amount(idx, &amount) {
                notices.push(e.to_string());
            }
        }
        ui.add_space(theme.spacing_md);

        // Amount and fund
        theme.frame_panel().show(ui, |ui| {
            if wallet_connected {
                ui.horizontal(|ui| {
                    let mut amount = view.amount().to_string();
                    let token = view.selected_token().map(|t| t.name).unwrap_or_default();
                    let response = ui.add(
                        egui::TextEdit::singleline(&mut amount)
                            .hint_text("Enter the amount you want to fund")
                            .desired_width(260.0),
                    );
                    if response.changed() {
                        view.input_amount(&amount);
                    }
                    ui.label(token);

                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let label = view.fund_button_label();
                        if ui.add_enabled(view.can_submit(), theme.button_primary(&label)).clicked() {
                            actions.push(StrategyAction::Fund);
                        }
                        if view.is_donation_pending() {
                            ui.spinner();
                        }
                    });
                });
                if let Some(error) = view.amount_error() {
                    ui.label(RichText::new(error).color(theme.error));
                }
            } else {
                ui.horizontal(|ui| {
                    ui.vertical(|ui| {
                        ui.label(RichText::new(view.selection_summary()).strong().size(16.0));
                        ui.label(RichText::new(view.connect_hint()).small().color(theme.text_secondary));
                    });
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.add(theme.button_primary("Connect")).clicked() {
                            actions.push(StrategyAction::Connect);
                        }
                    });
                });
            }
            if let Some(status) = view.status() {
                ui.label(RichText::new(status).color(theme.warning));
            }
        });

        ui.add_space(theme.spacing_sm);
        ui.horizontal(|ui| {
            if ui.add(theme.button_secondary("Share this strategy")).clicked() {
                actions.push(StrategyAction::Share);
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.hyperlink_to(RichText::new("Gitcoin").strong(), GITCOIN_URL);
                ui.label(RichText::new("Project data sourced from").small().color(theme.text_secondary));
            });
        });

        for notice in notices {
            self.notify(notice);
        }
        self.apply_strategy_actions(actions);
    }

    fn apply_strategy_actions(&mut self, actions: Vec<StrategyAction>) {
        for action in actions {
            match action {
                StrategyAction::Regenerate => self.regenerate(),
                StrategyAction::SelectNetwork(network) => {
                    let changed = self
                        .view
                        .as_mut()
                        .map(|v| v.select_network(network))
                        .unwrap_or(false);
                    if changed {
                        self.remember_selection();
                        self.notify(format!("Switched to {}", network));
                    }
                }
                StrategyAction::SelectToken(name) => {
                    let changed = self
                        .view
                        .as_mut()
                        .map(|v| v.select_token(name))
                        .unwrap_or(false);
                    if changed {
                        self.remember_selection();
                    }
                }
                StrategyAction::Connect => self.connect_wallet(),
                StrategyAction::Fund => self.submit_donation(),
                StrategyAction::Share => self.share_strategy(),
            }
        }
    }

    /// Shown after a donation succeeds
    pub(crate) fn render_success_modal(&mut self, ctx: &egui::Context) {
        let Some(view) = &self.view else {
            return;
        };
        if !view.show_success_modal() {
            return;
        }
        let title = view.success_title();
        let mut close = false;
        let mut share = false;
        egui::Window::new("Donation sent")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.label(RichText::new(&title).size(20.0).strong());
                    ui.add_space(self.theme.spacing_md);
                    if ui.add(self.theme.button_primary("Share this strategy")).clicked() {
                        share = true;
                    }
                    if ui.add(self.theme.button_secondary("Close")).clicked() {
                        close = true;
                    }
                });
            });
        if share {
            self.share_strategy();
        }
        if close {
            if let Some(view) = self.view.as_mut() {
                view.dismiss_success_modal();
            }
        }
    }
}
