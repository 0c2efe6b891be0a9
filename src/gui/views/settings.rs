//! Settings page
//!
//! - Network and RPC override
//! - Custom networks with their own transaction service
//! - Signing wallet (Ledger account or local key)
//! - Tracked Safes

use crate::{user_settings::UserSettings, utils, wallet::WalletStatus};
use eframe::egui::{self, RichText};

use super::super::app::GuiApp;

pub fn view_settings(app: &mut GuiApp, ui: &mut egui::Ui) {
    app.render_section_header(ui, "⚙", "Settings");
    ui.add_space(app.theme.spacing_md);

    render_network_panel(app, ui);
    ui.add_space(app.theme.spacing_md);
    render_custom_network_panel(app, ui);
    ui.add_space(app.theme.spacing_md);
    render_wallet_panel(app, ui);
    ui.add_space(app.theme.spacing_md);
    render_safes_panel(app, ui);
    ui.add_space(app.theme.spacing_md);

    ui.label(
        RichText::new(format!("Settings file: {}", UserSettings::settings_path_display()))
            .small()
            .color(app.theme.text_secondary),
    );
}

fn render_network_panel(app: &mut GuiApp, ui: &mut egui::Ui) {
    let theme = app.theme;
    let mut apply = false;

    theme.frame_panel().show(ui, |ui| {
        ui.label(RichText::new("Network").size(18.0).strong());
        ui.add_space(theme.spacing_sm);

        egui::Grid::new("network_info_grid")
            .num_columns(2)
            .spacing([theme.spacing_md, theme.spacing_xs])
            .show(ui, |ui| {
                ui.label("Network:");
                ui.label(format!("{} (chain {})", app.config.network_label(), app.config.chain_id));
                ui.end_row();

                ui.label("RPC:");
                ui.monospace(app.config.rpc_url.as_str());
                ui.end_row();

                ui.label("Transaction service:");
                if app.config.tx_service_url.is_empty() {
                    ui.colored_label(theme.warning, "not configured");
                } else {
                    ui.monospace(app.config.tx_service_url.as_str());
                }
                ui.end_row();

                ui.label("Spending limit module:");
                match app.config.spending_limit_module {
                    Some(module) => ui.monospace(utils::checksum(&module)),
                    None => ui.label(RichText::new("unavailable").color(theme.text_secondary)),
                };
                ui.end_row();
            });

        ui.add_space(theme.spacing_sm);
        ui.checkbox(&mut app.use_custom_rpc, "Use a custom RPC endpoint");
        if app.use_custom_rpc {
            ui.add(
                egui::TextEdit::singleline(&mut app.custom_rpc)
                    .hint_text("https://…")
                    .desired_width(420.0),
            );
        }
        if ui.add(theme.button_secondary("Apply")).clicked() {
            apply = true;
        }
    });

    if apply {
        let rpc = if app.use_custom_rpc {
            app.custom_rpc.trim().to_string()
        } else {
            String::new()
        };
        if !rpc.is_empty() && url::Url::parse(&rpc).is_err() {
            app.notify(format!("Invalid RPC URL: {}", rpc));
            return;
        }
        app.user_settings.set_custom_rpc(app.config.chain_id, rpc);
        app.apply_network_selection();
        let label = app.config.network_label().to_string();
        app.notify(format!("Network settings applied for {}", label));
    }
}

fn render_custom_network_panel(app: &mut GuiApp, ui: &mut egui::Ui) {
    let theme = app.theme;
    let mut add = false;
    let mut remove = None;

    theme.frame_panel().show(ui, |ui| {
        ui.label(RichText::new("Custom networks").size(18.0).strong());
        ui.add_space(theme.spacing_sm);

        for network in &app.user_settings.custom_networks {
            ui.horizontal(|ui| {
                ui.label(format!(
                    "{} · {} · #{}",
                    network.label, network.native_token, network.chain_id
                ));
                if ui.small_button("Remove").clicked() {
                    remove = Some(network.chain_id);
                }
            });
        }
        if !app.user_settings.custom_networks.is_empty() {
            ui.separator();
        }

        let form = &mut app.custom_network_form;
        egui::Grid::new("custom_network_grid")
            .num_columns(2)
            .spacing([theme.spacing_md, theme.spacing_xs])
            .show(ui, |ui| {
                ui.label("Name:");
                ui.text_edit_singleline(&mut form.label);
                ui.end_row();
                ui.label("Chain ID:");
                ui.text_edit_singleline(&mut form.chain_id);
                ui.end_row();
                ui.label("Native token:");
                ui.add(egui::TextEdit::singleline(&mut form.native_token).hint_text("ETH"));
                ui.end_row();
                ui.label("RPC URL:");
                ui.text_edit_singleline(&mut form.rpc_url);
                ui.end_row();
                ui.label("Transaction service:");
                ui.add(egui::TextEdit::singleline(&mut form.tx_service_url).hint_text("https://…/api (optional)"));
                ui.end_row();
            });
        if let Some(err) = &form.error {
            ui.colored_label(theme.error, err.as_str());
        }
        if ui.add(theme.button_secondary("Add network")).clicked() {
            add = true;
        }
    });

    if let Some(chain_id) = remove {
        if chain_id == app.config.chain_id {
            app.notify("Switch to another network before removing this one");
        } else {
            app.user_settings.custom_networks.retain(|n| n.chain_id != chain_id);
            if let Err(e) = app.user_settings.save() {
                tracing::error!("Failed to save settings: {}", e);
            }
        }
    }

    if add {
        match app.custom_network_form.to_network() {
            Ok(network) => {
                let label = network.label.clone();
                if app.user_settings.add_custom_network(network) {
                    app.custom_network_form.clear();
                    if let Err(e) = app.user_settings.save() {
                        tracing::error!("Failed to save settings: {}", e);
                    }
                    app.notify(format!("Added network {}", label));
                } else {
                    app.custom_network_form.error =
                        Some("A network with this chain ID already exists".to_string());
                }
            }
            Err(e) => app.custom_network_form.error = Some(e.to_string()),
        }
    }
}

fn render_wallet_panel(app: &mut GuiApp, ui: &mut egui::Ui) {
    let theme = app.theme;
    let mut reconnect = false;

    theme.frame_panel().show(ui, |ui| {
        ui.label(RichText::new("Signing wallet").size(18.0).strong());
        ui.add_space(theme.spacing_sm);

        ui.horizontal(|ui| {
            ui.radio_value(&mut app.user_settings.use_ledger, true, "Ledger");
            ui.radio_value(&mut app.user_settings.use_ledger, false, "Local key (PRIVATE_KEY)");
        });
        if app.user_settings.use_ledger {
            ui.horizontal(|ui| {
                ui.label("Account index:");
                ui.add(egui::DragValue::new(&mut app.user_settings.ledger_account_index).clamp_range(0..=100));
                ui.label(
                    RichText::new(crate::wallet::ledger_live_path(app.user_settings.ledger_account_index))
                        .monospace()
                        .color(theme.text_secondary),
                );
            });
        }

        ui.add_space(theme.spacing_sm);
        match &app.wallet_status {
            WalletStatus::Connected { address, label } => {
                ui.label(format!("{}: {}", label, utils::checksum(address)));
            }
            WalletStatus::Connecting => {
                ui.label("Connecting...");
            }
            WalletStatus::Disconnected => {
                ui.label(RichText::new("Not connected").color(theme.text_secondary));
            }
            WalletStatus::Error(e) => {
                ui.colored_label(theme.error, e.as_str());
            }
        }

        if ui
            .add_enabled(app.wallet_job.is_none(), theme.button_secondary("Save & connect"))
            .clicked()
        {
            reconnect = true;
        }
    });

    if reconnect {
        app.config.ledger_account_index = app.user_settings.ledger_account_index;
        if let Err(e) = app.user_settings.save() {
            tracing::error!("Failed to save settings: {}", e);
        }
        app.send.spending_limits.clear();
        app.start_wallet_connect();
    }
}

fn render_safes_panel(app: &mut GuiApp, ui: &mut egui::Ui) {
    let theme = app.theme;
    let mut remove = None;

    theme.frame_panel().show(ui, |ui| {
        ui.label(RichText::new("Tracked Safes").size(18.0).strong());
        ui.add_space(theme.spacing_sm);
        if app.user_settings.safes.is_empty() {
            ui.label(RichText::new("None yet. Add one from the Safes drawer.").color(theme.text_secondary));
        }
        for safe in &app.user_settings.safes {
            ui.horizontal(|ui| {
                ui.label(RichText::new(&safe.name).strong());
                ui.monospace(safe.address.as_str());
                if ui.small_button("Remove").clicked() {
                    remove = Some(safe.address.clone());
                }
            });
        }
    });

    if let Some(address) = remove {
        app.remove_safe(&address);
        app.notify(format!("Removed Safe {}", utils::short_address(&address)));
    }
}
