use eframe::{App, Frame, egui};
use stage_core::{Bounds, Workflow, WorkflowState};
use std::time::Instant;

mod controls;

const APP_VERSION: &str = env!("ETAPAS_VERSION");

pub struct UiApp {
    workflow: Workflow,
    texture: Option<egui::TextureHandle>,
    texture_generation: u64,
    last_area: Option<Bounds>,
    /// State whose status label was laid out in the current pass.
    laid_out: Option<WorkflowState>,
    /// State whose status label reached the screen in an earlier frame.
    presented: Option<WorkflowState>,
}

impl UiApp {
    pub fn new(workflow: Workflow) -> Self {
        let texture_generation = workflow.display().generation();
        Self {
            workflow,
            texture: None,
            texture_generation,
            last_area: None,
            laid_out: None,
            presented: None,
        }
    }

    fn sync_texture(&mut self, ctx: &egui::Context) {
        let display = self.workflow.display();
        if display.generation() == self.texture_generation {
            return;
        }
        self.texture_generation = display.generation();
        self.texture = display.rendered().map(|img| {
            let size = [img.width() as usize, img.height() as usize];
            let color = egui::ColorImage::from_rgba_unmultiplied(size, img.as_raw());
            ctx.load_texture("captura", color, egui::TextureOptions::LINEAR)
        });
    }

    fn render_image_area(&mut self, ctx: &egui::Context, ui: &mut egui::Ui, now: Instant) {
        let ppp = ctx.pixels_per_point();
        let avail = ui.available_size() * ppp;
        let area = Bounds::new(avail.x.max(0.0) as u32, avail.y.max(0.0) as u32);
        if self.last_area != Some(area) {
            self.last_area = Some(area);
            self.workflow.display_mut().on_resize(now, area);
        }
        self.workflow.display_mut().poll(now);
        self.sync_texture(ctx);

        ui.centered_and_justified(|ui| match &self.texture {
            Some(tex) => {
                let size = tex.size_vec2() / ppp;
                ui.add(egui::Image::new(tex).fit_to_exact_size(size));
            }
            None => {
                ui.label(
                    egui::RichText::new("Imagen")
                        .size(18.0)
                        .strong()
                        .color(egui::Color32::GRAY),
                );
            }
        });

        if let Some(wait) = self.workflow.display().time_until_due(now) {
            ctx.request_repaint_after(wait);
        }
    }

    /// Runs at most one blocking workflow step per frame, and only once the
    /// status of the current state has been presented by an earlier frame.
    fn drive_workflow(&mut self, ctx: &egui::Context) {
        let discarded = ctx.will_discard();
        let shown_before = self.presented;
        if !discarded {
            self.presented = self.laid_out;
        }
        if !self.workflow.is_busy() {
            return;
        }
        if !discarded && shown_before == Some(self.workflow.state()) {
            self.workflow.step();
        }
        ctx.request_repaint();
    }
}

impl App for UiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        let now = Instant::now();

        egui::TopBottomPanel::bottom("pie").show(ctx, |ui| {
            ui.small(format!("v{APP_VERSION}"));
        });

        egui::SidePanel::right("controles")
            .resizable(true)
            .default_width(190.0)
            .show(ctx, |ui| self.render_controls(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_image_area(ctx, ui, now);
        });

        self.drive_workflow(ctx);
    }
}
