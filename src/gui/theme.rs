//! Colors, spacing and styled widget factories for the GUI

use eframe::egui;

#[derive(Clone, Copy)]
pub struct AppTheme {
    // Base colors
    pub background: egui::Color32,
    pub surface: egui::Color32,
    pub surface_hover: egui::Color32,
    pub panel_fill: egui::Color32,
    pub text_primary: egui::Color32,
    pub text_secondary: egui::Color32,
    pub text_on_primary: egui::Color32,

    // Semantic colors
    pub primary: egui::Color32,
    pub primary_hover: egui::Color32,
    pub primary_muted: egui::Color32,
    pub success: egui::Color32,
    pub warning: egui::Color32,
    pub error: egui::Color32,

    // Spacing constants
    pub spacing_xs: f32,
    pub spacing_sm: f32,
    pub spacing_md: f32,
    pub spacing_lg: f32,

    // Button sizes
    pub button_medium: egui::Vec2,
    pub button_large: egui::Vec2,
}

impl Default for AppTheme {
    fn default() -> Self {
        Self {
            // Light indigo scheme
            background: egui::Color32::from_rgb(238, 242, 255), // indigo-50
            surface: egui::Color32::WHITE,
            surface_hover: egui::Color32::from_rgb(224, 231, 255), // indigo-100
            panel_fill: egui::Color32::from_rgb(245, 247, 255),
            text_primary: egui::Color32::from_rgb(30, 27, 75), // indigo-950
            text_secondary: egui::Color32::from_rgb(100, 100, 130),
            text_on_primary: egui::Color32::WHITE,

            primary: egui::Color32::from_rgb(79, 70, 229), // indigo-600
            primary_hover: egui::Color32::from_rgb(67, 56, 202), // indigo-700
            primary_muted: egui::Color32::from_rgb(165, 180, 252), // indigo-300
            success: egui::Color32::from_rgb(22, 163, 74),
            warning: egui::Color32::from_rgb(217, 119, 6),
            error: egui::Color32::from_rgb(220, 38, 38),

            spacing_xs: 4.0,
            spacing_sm: 8.0,
            spacing_md: 16.0,
            spacing_lg: 24.0,

            button_medium: egui::vec2(120.0, 32.0),
            button_large: egui::vec2(200.0, 40.0),
        }
    }
}

impl AppTheme {
    /// Filled indigo call-to-action button
    pub fn button_primary(&self, text: &str) -> egui::Button<'_> {
        egui::Button::new(
            egui::RichText::new(text)
                .color(self.text_on_primary)
                .strong(),
        )
        .fill(self.primary)
        .rounding(8.0)
        .min_size(self.button_large)
    }

    /// Outlined button on a white surface
    pub fn button_secondary(&self, text: &str) -> egui::Button<'_> {
        egui::Button::new(egui::RichText::new(text).color(self.primary))
            .fill(self.surface)
            .stroke(egui::Stroke::new(1.0, self.primary_muted))
            .rounding(8.0)
            .min_size(self.button_medium)
    }

    pub fn frame_surface(&self) -> egui::Frame {
        egui::Frame::none()
            .fill(self.surface)
            .rounding(12.0)
            .inner_margin(self.spacing_md)
            .stroke(egui::Stroke::new(1.0, self.primary_muted))
    }

    pub fn frame_panel(&self) -> egui::Frame {
        egui::Frame::none()
            .fill(self.panel_fill)
            .rounding(12.0)
            .inner_margin(self.spacing_md)
            .stroke(egui::Stroke::new(1.0, self.surface_hover))
    }
}

/// Configure the egui context style with the given theme
pub fn configure_style(ctx: &egui::Context, theme: &AppTheme) {
    let mut visuals = egui::Visuals::light();
    visuals.window_fill = theme.surface;
    visuals.panel_fill = theme.background;
    visuals.override_text_color = Some(theme.text_primary);
    visuals.hyperlink_color = theme.primary;
    visuals.selection.bg_fill = theme.primary_muted;

    visuals.widgets.inactive.bg_fill = theme.surface;
    visuals.widgets.hovered.bg_fill = theme.surface_hover;
    visuals.widgets.active.bg_fill = theme.surface_hover;
    visuals.widgets.inactive.bg_stroke = egui::Stroke::new(1.0, theme.primary_muted);
    visuals.widgets.hovered.bg_stroke = egui::Stroke::new(1.0, theme.primary);
    visuals.widgets.active.bg_stroke = egui::Stroke::new(2.0, theme.primary);
    ctx.set_visuals(visuals);

    let mut style = (*ctx.style()).clone();
    style.spacing.item_spacing = egui::vec2(8.0, 8.0);
    style.spacing.button_padding = egui::vec2(12.0, 6.0);
    style.text_styles.insert(
        egui::TextStyle::Heading,
        egui::FontId::new(22.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Body,
        egui::FontId::new(14.0, egui::FontFamily::Proportional),
    );
    ctx.set_style(style);
}
