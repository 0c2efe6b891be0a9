//! Colors, spacing and styled widget factories shared by every view.

use eframe::egui;

#[derive(Clone, Copy)]
pub struct AppTheme {
    pub background: egui::Color32,
    pub surface: egui::Color32,
    pub surface_hover: egui::Color32,
    pub surface_active: egui::Color32,
    pub panel_fill: egui::Color32,
    pub text_primary: egui::Color32,
    pub text_secondary: egui::Color32,

    pub primary: egui::Color32,
    pub secondary: egui::Color32,
    pub success: egui::Color32,
    pub warning: egui::Color32,
    pub error: egui::Color32,
    pub accent: egui::Color32,

    /// Dims the content behind the open sidebar drawer
    pub backdrop: egui::Color32,

    pub spacing_xs: f32,
    pub spacing_sm: f32,
    pub spacing_md: f32,
    pub spacing_lg: f32,

    pub drawer_width: f32,
    pub button_small: egui::Vec2,
    pub button_medium: egui::Vec2,
}

impl Default for AppTheme {
    fn default() -> Self {
        Self {
            // Near-black slate with a mint accent
            background: egui::Color32::from_rgb(18, 19, 18),
            surface: egui::Color32::from_rgb(28, 28, 28),
            surface_hover: egui::Color32::from_rgb(38, 40, 39),
            surface_active: egui::Color32::from_rgb(48, 52, 50),
            panel_fill: egui::Color32::from_rgb(22, 23, 22),
            text_primary: egui::Color32::from_rgb(236, 238, 236),
            text_secondary: egui::Color32::from_rgb(160, 164, 160),

            primary: egui::Color32::from_rgb(18, 255, 128),
            secondary: egui::Color32::from_rgb(70, 74, 72),
            success: egui::Color32::from_rgb(0, 200, 110),
            warning: egui::Color32::from_rgb(255, 185, 60),
            error: egui::Color32::from_rgb(255, 95, 114),
            accent: egui::Color32::from_rgb(95, 221, 255),

            backdrop: egui::Color32::from_black_alpha(150),

            spacing_xs: 4.0,
            spacing_sm: 8.0,
            spacing_md: 16.0,
            spacing_lg: 24.0,

            drawer_width: 300.0,
            button_small: egui::vec2(80.0, 26.0),
            button_medium: egui::vec2(130.0, 34.0),
        }
    }
}

impl AppTheme {
    pub fn button_primary(&self, text: &str) -> egui::Button<'_> {
        egui::Button::new(
            egui::RichText::new(text)
                .color(self.background)
                .strong(),
        )
        .fill(self.primary)
        .rounding(6.0)
        .min_size(self.button_medium)
    }

    pub fn button_secondary(&self, text: &str) -> egui::Button<'_> {
        egui::Button::new(egui::RichText::new(text).color(self.text_primary))
            .fill(self.surface)
            .stroke(egui::Stroke::new(1.0, self.secondary))
            .rounding(6.0)
            .min_size(self.button_medium)
    }

    pub fn button_small(&self, text: &str) -> egui::Button<'_> {
        egui::Button::new(egui::RichText::new(text).color(self.text_primary))
            .fill(self.secondary)
            .rounding(4.0)
            .min_size(self.button_small)
    }

    pub fn frame_surface(&self) -> egui::Frame {
        egui::Frame::none()
            .fill(self.surface)
            .rounding(8.0)
            .inner_margin(self.spacing_md)
    }

    pub fn frame_panel(&self) -> egui::Frame {
        egui::Frame::none()
            .fill(self.panel_fill)
            .rounding(8.0)
            .inner_margin(self.spacing_md)
            .stroke(egui::Stroke::new(1.0, self.surface_active))
    }

    /// Clamp the available width to `[min, min(preferred, max)]`
    pub fn responsive_width(ui: &egui::Ui, min: f32, preferred: f32, max: f32) -> f32 {
        ui.available_width().clamp(min, max.min(preferred))
    }

    pub fn section_header_text(&self, icon: &str, title: &str) -> String {
        format!("{} {}", icon, title)
    }
}

pub fn configure_style(ctx: &egui::Context, theme: &AppTheme) {
    let mut visuals = egui::Visuals::dark();
    visuals.window_fill = theme.background;
    visuals.panel_fill = theme.panel_fill;
    visuals.override_text_color = Some(theme.text_primary);
    visuals.selection.bg_fill = theme.primary.linear_multiply(0.35);
    visuals.hyperlink_color = theme.accent;

    visuals.widgets.noninteractive.bg_fill = theme.surface;
    visuals.widgets.inactive.bg_fill = theme.surface;
    visuals.widgets.hovered.bg_fill = theme.surface_hover;
    visuals.widgets.active.bg_fill = theme.surface_active;
    visuals.widgets.open.bg_fill = theme.surface_active;

    visuals.widgets.inactive.bg_stroke = egui::Stroke::new(1.0, theme.secondary);
    visuals.widgets.hovered.bg_stroke = egui::Stroke::new(1.0, theme.primary);
    visuals.widgets.active.bg_stroke = egui::Stroke::new(2.0, theme.primary);

    ctx.set_visuals(visuals);

    let mut style = (*ctx.style()).clone();
    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    style.spacing.button_padding = egui::vec2(10.0, 6.0);
    style.spacing.menu_margin = egui::Margin::same(8.0);

    style.text_styles.insert(
        egui::TextStyle::Heading,
        egui::FontId::new(22.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Body,
        egui::FontId::new(14.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Button,
        egui::FontId::new(14.0, egui::FontFamily::Proportional),
    );
    // Addresses and hashes
    style.text_styles.insert(
        egui::TextStyle::Monospace,
        egui::FontId::new(13.0, egui::FontFamily::Monospace),
    );

    ctx.set_style(style);
}
