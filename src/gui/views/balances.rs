//! Assets page: the open Safe's token balances with a send action per row.

use crate::utils;
use eframe::egui::{self, RichText};
use egui_extras::{Column, TableBuilder};

use super::super::app::GuiApp;
use super::super::helpers::open_in_browser;

/// Placeholder shown when no Safe is open
pub(crate) fn no_safe_hint(app: &mut GuiApp, ui: &mut egui::Ui) {
    app.theme.frame_panel().show(ui, |ui| {
        ui.label(RichText::new("No Safe selected").strong());
        ui.label(
            RichText::new("Open the Safes drawer (☰ or Esc) to add or pick a Safe.")
                .color(app.theme.text_secondary),
        );
    });
    if ui.add(app.theme.button_secondary("Open Safes")).clicked() {
        app.sidebar.toggle();
    }
}

pub fn view_balances(app: &mut GuiApp, ui: &mut egui::Ui) {
    app.render_section_header(ui, "💰", "Assets");
    ui.add_space(app.theme.spacing_sm);

    let Some(safe) = app.selected_safe().cloned() else {
        no_safe_hint(app, ui);
        return;
    };
    let theme = app.theme;
    let loading = app.balances.job.is_some();

    ui.horizontal(|ui| {
        if ui
            .add_enabled(!loading, theme.button_secondary("Refresh"))
            .clicked()
        {
            app.start_balances_load();
        }
        if ui
            .add_enabled(!app.balances.tokens.is_empty(), theme.button_primary("Send funds"))
            .clicked()
        {
            app.send.token_index = 0;
            app.send.form_open = true;
        }
        if let Some(url) = crate::config::get_address_explorer_url(app.config.chain_id, &safe.address) {
            if ui.button("View on explorer").clicked() {
                open_in_browser(&url);
            }
        }
        if loading {
            ui.spinner();
        }
    });
    ui.add_space(app.theme.spacing_sm);

    if let Some(err) = &app.balances.error {
        ui.colored_label(theme.error, format!("Could not load balances: {}", err));
        ui.add_space(theme.spacing_sm);
    }

    if app.balances.tokens.is_empty() {
        if !loading {
            ui.label(RichText::new("No assets found for this Safe.").color(theme.text_secondary));
        }
        return;
    }

    let mut send_index = None;
    theme.frame_panel().show(ui, |ui| {
        TableBuilder::new(ui)
            .striped(true)
            .vscroll(false)
            .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
            .column(Column::auto().at_least(90.0))
            .column(Column::remainder().at_least(160.0))
            .column(Column::auto().at_least(160.0))
            .column(Column::auto())
            .header(24.0, |mut header| {
                header.col(|ui| {
                    ui.strong("Asset");
                });
                header.col(|ui| {
                    ui.strong("Name");
                });
                header.col(|ui| {
                    ui.strong("Balance");
                });
                header.col(|_| {});
            })
            .body(|mut body| {
                for (idx, token) in app.balances.tokens.iter().enumerate() {
                    body.row(28.0, |mut row| {
                        row.col(|ui| {
                            ui.label(RichText::new(&token.symbol).strong().color(theme.primary));
                        });
                        row.col(|ui| {
                            let label = ui.label(token.name.as_str());
                            if let Some(address) = token.address {
                                label.on_hover_text(utils::checksum(&address));
                            }
                        });
                        row.col(|ui| {
                            ui.monospace(utils::format_amount(&utils::from_token_unit(
                                token.balance,
                                token.decimals,
                            )));
                        });
                        row.col(|ui| {
                            if ui.add(theme.button_small("Send")).clicked() {
                                send_index = Some(idx);
                            }
                        });
                    });
                }
            });
    });

    if let Some(idx) = send_index {
        app.send.token_index = idx;
        app.send.form_open = true;
    }
}
