//! Safes drawer: search, pick and add Safes.
//!
//! Floats above the panels. A backdrop behind it closes the drawer on click.

use crate::{types::SafeEntry, utils};
use eframe::egui::{self, RichText};

use super::super::app::GuiApp;

pub fn show_sidebar(app: &mut GuiApp, ctx: &egui::Context) {
    if !app.sidebar.is_open {
        return;
    }
    let theme = app.theme;
    let screen = ctx.screen_rect();

    let backdrop = egui::Area::new(egui::Id::new("sidebar_backdrop"))
        .fixed_pos(screen.min)
        .order(egui::Order::Middle)
        .show(ctx, |ui| {
            ui.painter().rect_filled(screen, 0.0, theme.backdrop);
            ui.allocate_rect(screen, egui::Sense::click())
        })
        .inner;
    if backdrop.clicked() {
        app.sidebar.click_away();
        return;
    }

    egui::Area::new(egui::Id::new("sidebar_drawer"))
        .fixed_pos(screen.min)
        .order(egui::Order::Foreground)
        .show(ctx, |ui| {
            egui::Frame::none()
                .fill(theme.panel_fill)
                .stroke(egui::Stroke::new(1.0, theme.surface_active))
                .inner_margin(theme.spacing_md)
                .show(ui, |ui| {
                    ui.set_width(theme.drawer_width);
                    ui.set_min_height(screen.height() - 2.0 * theme.spacing_md);
                    render_drawer(app, ui);
                });
        });
}

fn render_drawer(app: &mut GuiApp, ui: &mut egui::Ui) {
    let theme = app.theme;

    ui.horizontal(|ui| {
        ui.label(RichText::new("Safes").size(18.0).strong());
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.small_button("✕").on_hover_text("Close (Esc)").clicked() {
                app.sidebar.toggle();
            }
        });
    });
    ui.add_space(theme.spacing_sm);

    ui.horizontal(|ui| {
        let mut filter = app.sidebar.filter.clone();
        let response = ui.add(
            egui::TextEdit::singleline(&mut filter)
                .hint_text("Search name or address")
                .desired_width(theme.drawer_width - 40.0),
        );
        if response.changed() {
            app.sidebar.set_filter(filter);
        }
        if !app.sidebar.filter.is_empty()
            && ui.small_button("✕").on_hover_text("Clear search").clicked()
        {
            app.sidebar.cancel_filter();
        }
    });
    ui.add_space(theme.spacing_sm);

    let entries: Vec<SafeEntry> = app
        .sidebar
        .filtered(&app.user_settings.safes)
        .into_iter()
        .cloned()
        .collect();
    let selected = app.user_settings.selected_safe.clone().unwrap_or_default();
    let mut picked = None;

    egui::ScrollArea::vertical()
        .max_height((ui.available_height() - 200.0).max(80.0))
        .auto_shrink([false, true])
        .show(ui, |ui| {
            if entries.is_empty() {
                let hint = if app.user_settings.safes.is_empty() {
                    "No Safes yet. Add one below."
                } else {
                    "No Safe matches the search."
                };
                ui.label(RichText::new(hint).color(theme.text_secondary));
            }
            for entry in &entries {
                let is_selected = utils::same_address(&selected, &entry.address);
                let text = RichText::new(format!("{}\n{}", entry.name, utils::short_address(&entry.address)));
                if ui
                    .add_sized(
                        [theme.drawer_width, 40.0],
                        egui::SelectableLabel::new(is_selected, text),
                    )
                    .on_hover_text(entry.address.as_str())
                    .clicked()
                {
                    picked = Some(entry.address.clone());
                }
            }
        });

    if let Some(address) = picked {
        app.sidebar.select_safe();
        app.select_safe(&address);
    }

    ui.separator();
    ui.label(RichText::new("Add Safe").strong());
    ui.add(
        egui::TextEdit::singleline(&mut app.add_safe_form.name)
            .hint_text("Name (optional)")
            .desired_width(theme.drawer_width),
    );
    ui.add(
        egui::TextEdit::singleline(&mut app.add_safe_form.address)
            .hint_text("Safe address 0x…")
            .font(egui::TextStyle::Monospace)
            .desired_width(theme.drawer_width),
    );
    if let Some(err) = &app.add_safe_form.error {
        ui.colored_label(theme.error, err.as_str());
    }
    if ui.add(theme.button_primary("Add")).clicked() {
        let name = app.add_safe_form.name.clone();
        let address = app.add_safe_form.address.clone();
        match app.add_safe(&name, &address) {
            Ok(()) => app.add_safe_form = Default::default(),
            Err(e) => app.add_safe_form.error = Some(e.to_string()),
        }
    }
}
