//! Right-hand panel: stage heading, description, recommendations and the
//! capture/clear buttons.

use super::UiApp;
use eframe::egui::{self, Align, Button, Color32, Layout, RichText};

const BUTTON_HEIGHT: f32 = 32.0;

impl UiApp {
    pub(super) fn render_controls(&mut self, ui: &mut egui::Ui) {
        ui.add_space(8.0);
        if let Some(outcome) = self.workflow.outcome() {
            ui.label(
                RichText::new(outcome.heading())
                    .size(16.0)
                    .strong()
                    .color(Color32::from_rgb(30, 80, 200)),
            );
            ui.add_space(4.0);
        }
        ui.label(self.workflow.status());
        self.laid_out = Some(self.workflow.state());
        if let Some(outcome) = self.workflow.outcome() {
            ui.add_space(4.0);
            ui.label(
                RichText::new(outcome.info.recommendations_or_default())
                    .color(Color32::from_rgb(20, 120, 40)),
            );
        }

        ui.with_layout(Layout::bottom_up(Align::Center), |ui| {
            ui.add_space(4.0);
            let width = ui.available_width();

            let clear = ui
                .add_enabled(
                    self.workflow.can_clear(),
                    Button::new("Limpiar").min_size(egui::vec2(width, BUTTON_HEIGHT)),
                )
                .clicked();
            if clear {
                self.workflow.clear();
            }

            if self.workflow.can_retry()
                && ui
                    .add(Button::new("Reintentar").min_size(egui::vec2(width, BUTTON_HEIGHT)))
                    .clicked()
            {
                self.workflow.retry_classification();
            }

            let capture = ui
                .add_enabled(
                    self.workflow.can_trigger(),
                    Button::new(RichText::new("Tomar Foto").strong())
                        .min_size(egui::vec2(width, BUTTON_HEIGHT)),
                )
                .clicked();
            if capture {
                self.workflow.trigger();
            }
        });
    }
}
