//! Transactions page: the polled history of the open Safe.

use crate::{config, transactions::TransactionRecord, utils};
use eframe::egui::{self, RichText};

use super::super::app::GuiApp;
use super::super::helpers::open_in_browser;
use super::balances::no_safe_hint;

/// Human name of a service transaction type
pub(crate) fn tx_type_label(tx_type: Option<&str>) -> &'static str {
    match tx_type {
        Some("MULTISIG_TRANSACTION") => "Multisig",
        Some("MODULE_TRANSACTION") => "Module",
        Some("ETHEREUM_TRANSACTION") => "Incoming",
        _ => "Other",
    }
}

/// Service timestamps are RFC 3339; shown in local time
pub(crate) fn format_service_date(date: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(date) {
        Ok(parsed) => parsed
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        Err(_) => date.to_string(),
    }
}

pub fn view_transactions(app: &mut GuiApp, ui: &mut egui::Ui) {
    app.render_section_header(ui, "⇄", "Transactions");
    ui.add_space(app.theme.spacing_sm);

    let Some(safe) = app.user_settings.selected_safe.clone() else {
        no_safe_hint(app, ui);
        return;
    };
    let theme = app.theme;

    if app.config.tx_service_url.is_empty() {
        ui.colored_label(
            theme.warning,
            "No transaction service is configured for this network. Add one in Settings.",
        );
        return;
    }

    let refreshing = app.tx_view.job.is_some();
    ui.horizontal(|ui| {
        if ui
            .add_enabled(!refreshing, theme.button_secondary("Refresh now"))
            .clicked()
        {
            app.start_transactions_refresh();
        }
        if refreshing {
            ui.spinner();
        }
        ui.label(
            RichText::new(format!("Updates every {}s", app.config.poll_interval_secs))
                .small()
                .color(theme.text_secondary),
        );
    });
    if let Some(status) = &app.tx_view.status {
        ui.label(RichText::new(status).small().color(theme.text_secondary));
    }
    ui.add_space(theme.spacing_sm);

    let records: Vec<TransactionRecord> = app.tx_cache().transactions_for(&safe).to_vec();
    if records.is_empty() {
        ui.label(RichText::new("No transactions loaded yet.").color(theme.text_secondary));
        return;
    }

    let chain_id = app.config.chain_id;
    theme.frame_panel().show(ui, |ui| {
        egui::Grid::new("transactions_grid")
            .num_columns(6)
            .striped(true)
            .spacing([theme.spacing_md, theme.spacing_sm])
            .show(ui, |ui| {
                for heading in ["Nonce", "Type", "Status", "Date", "To", "Hash"] {
                    ui.strong(heading);
                }
                ui.end_row();

                for record in &records {
                    ui.label(record.nonce.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()));
                    ui.label(tx_type_label(record.tx_type.as_deref()));

                    let status = record.status_label();
                    let color = if record.is_pending() {
                        theme.warning
                    } else if status == "Failed" {
                        theme.error
                    } else {
                        theme.success
                    };
                    ui.colored_label(color, status);

                    ui.label(record.date().map(format_service_date).unwrap_or_default());
                    ui.monospace(record.to.as_deref().map(utils::short_address).unwrap_or_default());

                    ui.horizontal(|ui| match record.hash() {
                        Some(hash) => {
                            ui.monospace(utils::short_address(hash)).on_hover_text(hash);
                            if ui.small_button("📋").on_hover_text("Copy hash").clicked() {
                                ui.output_mut(|o| o.copied_text = hash.to_string());
                            }
                            if let Some(url) = record
                                .chain_hash()
                                .and_then(|chain_hash| config::get_tx_explorer_url(chain_id, chain_hash))
                            {
                                if ui.small_button("🔗").on_hover_text("View on block explorer").clicked() {
                                    open_in_browser(&url);
                                }
                            }
                        }
                        None => {
                            ui.label("-");
                        }
                    });
                    ui.end_row();
                }
            });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_type_label() {
        assert_eq!(tx_type_label(Some("MULTISIG_TRANSACTION")), "Multisig");
        assert_eq!(tx_type_label(Some("ETHEREUM_TRANSACTION")), "Incoming");
        assert_eq!(tx_type_label(Some("SOMETHING_NEW")), "Other");
        assert_eq!(tx_type_label(None), "Other");
    }

    #[test]
    fn test_format_service_date() {
        let formatted = format_service_date("2024-03-01T12:30:00Z");
        assert_eq!(formatted.len(), "2024-03-01 12:30".len());
        assert!(formatted.starts_with("2024-0"));
    }

    #[test]
    fn test_format_service_date_passthrough() {
        assert_eq!(format_service_date("yesterday"), "yesterday");
    }
}
