use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use egui::{self, Align2, Color32, ComboBox, FontId, Layout, Rounding, Stroke};

use crate::audio::{self, ClipperAudio, list_input_device_names, list_output_device_names};
use crate::clipper::{ClipperParams, ParamId, SharedParams};
use crate::display::{FrameTimer, ScopeDisplay, draw_area};
use crate::frame_queue::FrameConsumer;
use crate::settings::{AppSettings, ThemeKind};

const ACCENT: Color32 = Color32::from_rgb(255, 140, 0);
const SCOPE_BACKGROUND: Color32 = Color32::from_rgb(20, 20, 20);
const SCOPE_TRACE: Color32 = Color32::from_rgb(245, 255, 227);
const SCOPE_HEIGHT: f32 = 220.0;
const SLIDER_HEIGHT: f32 = 160.0;

pub struct ClipperApp {
    params: Arc<SharedParams>,
    audio: Option<ClipperAudio>,
    display: ScopeDisplay<f32>,
    timer: FrameTimer,
    settings_path: PathBuf,
    settings: AppSettings,
    input_devices: Vec<String>,
    output_devices: Vec<String>,
    audio_error: Option<String>,
}

impl ClipperApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        params: Arc<SharedParams>,
        audio: Option<ClipperAudio>,
        scope: FrameConsumer<f32>,
        settings_path: PathBuf,
        mut settings: AppSettings,
        audio_error: Option<String>,
    ) -> Self {
        apply_theme(&cc.egui_ctx, settings.theme);
        if let Some(audio) = &audio {
            settings.output_device = Some(audio.output_device_name.clone());
        }
        Self {
            params,
            audio,
            display: ScopeDisplay::new(scope),
            timer: FrameTimer::default(),
            settings_path,
            settings,
            input_devices: list_input_device_names(),
            output_devices: list_output_device_names(),
            audio_error,
        }
    }

    /// Tears down the running streams and reopens them on the selected devices.
    fn reconnect_audio(&mut self) {
        // Release the old devices before opening new ones.
        self.audio = None;
        match audio::start(
            Arc::clone(&self.params),
            self.settings.output_device.as_deref(),
            self.settings.input_device.as_deref(),
        ) {
            Ok((audio, consumer)) => {
                self.display.attach(consumer);
                self.settings.output_device = Some(audio.output_device_name.clone());
                self.audio = Some(audio);
                self.audio_error = None;
            }
            Err(err) => {
                log::error!("Audio restart failed: {err}");
                self.audio_error = Some(err.to_string());
            }
        }
        self.input_devices = list_input_device_names();
        self.output_devices = list_output_device_names();
    }

    fn save_settings(&self) {
        if let Err(err) = self.settings.save(&self.settings_path) {
            log::warn!(
                "Could not save settings to {}: {err}",
                self.settings_path.display()
            );
        }
    }
}

impl eframe::App for ClipperApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        if self.timer.poll(now) {
            self.display.tick();
        }
        ctx.request_repaint_after(self.timer.until_next(now));

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(4.0);
            let mut theme_changed = false;
            let mut reset_requested = false;
            let mut device_changed = false;
            ui.horizontal(|ui| {
                ui.strong("F.W CLIPPER v1.0");
                ui.separator();
                theme_changed = theme_selector(ui, ctx, &mut self.settings);
                if ui.button("Reset").clicked() {
                    reset_requested = true;
                }
                ui.separator();
                device_changed |= device_selector(
                    ui,
                    "input_selector",
                    "Default input",
                    &self.input_devices,
                    &mut self.settings.input_device,
                );
                device_changed |= device_selector(
                    ui,
                    "output_selector",
                    "Default output",
                    &self.output_devices,
                    &mut self.settings.output_device,
                );
                ui.with_layout(Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(format!(
                        "{} frames ({} queued)",
                        self.display.frames_shown(),
                        self.display.backlog()
                    ));
                    match &self.audio {
                        Some(audio) => ui.label(format!(
                            "In: {}",
                            audio.input_device_name.as_deref().unwrap_or("test tone")
                        )),
                        None => ui.label("Audio stopped"),
                    };
                });
            });
            ui.add_space(2.0);
            let accent_rect = ui.available_rect_before_wrap();
            ui.painter().hline(
                accent_rect.x_range(),
                accent_rect.top(),
                Stroke::new(2.0, ACCENT),
            );
            ui.add_space(8.0);

            let mut edited = if reset_requested {
                ClipperParams::default()
            } else {
                self.settings.params.clone()
            };

            ui.columns(2, |columns| {
                columns[0].vertical(|ui| {
                    fl_card(ui, "Controls", |ui| parameter_controls(ui, &mut edited))
                });
                columns[1].vertical(|ui| fl_card(ui, "Scope", |ui| draw_scope(ui, &self.display)));
            });

            let params_changed = edited != self.settings.params;
            if params_changed {
                self.params.apply(&edited);
                self.settings.params = edited;
            }

            if device_changed {
                self.audio_error = None;
                self.reconnect_audio();
            }

            if params_changed || theme_changed || device_changed {
                self.save_settings();
            }

            if let Some(err) = &self.audio_error {
                ui.colored_label(Color32::RED, format!("Audio: {err}"));
            }
        });
    }
}

fn parameter_controls(ui: &mut egui::Ui, params: &mut ClipperParams) {
    ui.horizontal(|ui| {
        ui.spacing_mut().slider_width = SLIDER_HEIGHT;
        for id in ParamId::ALL {
            ui.vertical(|ui| {
                ui.label(id.label());
                let mut value = params.get(id);
                let response = ui.add(
                    egui::Slider::new(&mut value, id.range())
                        .vertical()
                        .step_by(1.0)
                        .fixed_decimals(0)
                        .suffix(id.suffix()),
                );
                if response.changed() {
                    params.set(id, value);
                }
            });
            ui.add_space(6.0);
        }
    });
}

fn draw_scope(ui: &mut egui::Ui, display: &ScopeDisplay<f32>) {
    let desired = egui::vec2(ui.available_width().max(200.0), SCOPE_HEIGHT);
    let (rect, _) = ui.allocate_exact_size(desired, egui::Sense::hover());
    let painter = ui.painter_at(rect);
    painter.rect(
        rect,
        Rounding::same(6.0),
        SCOPE_BACKGROUND,
        Stroke::new(1.0, ui.visuals().weak_text_color()),
    );
    painter.text(
        rect.left_top() + egui::vec2(8.0, 3.0),
        Align2::LEFT_TOP,
        "Oscilloscope",
        FontId::proportional(12.0),
        SCOPE_TRACE,
    );

    let points = display.plot(draw_area(rect));
    if points.is_empty() {
        return;
    }
    painter.add(egui::Shape::line(points, Stroke::new(1.5, SCOPE_TRACE)));
}

fn device_selector(
    ui: &mut egui::Ui,
    id: &str,
    default_label: &str,
    devices: &[String],
    selected: &mut Option<String>,
) -> bool {
    let before = selected.clone();
    ComboBox::from_id_source(id)
        .width(180.0)
        .selected_text(selected.as_deref().unwrap_or(default_label))
        .show_ui(ui, |ui| {
            ui.selectable_value(selected, None, default_label);
            for name in devices {
                ui.selectable_value(selected, Some(name.clone()), name);
            }
        });
    before != *selected
}

fn fl_card(ui: &mut egui::Ui, title: &str, add_contents: impl FnOnce(&mut egui::Ui)) {
    let fill = ui.visuals().extreme_bg_color;
    let border = ui.visuals().widgets.noninteractive.bg_stroke.color;
    egui::Frame::none()
        .fill(fill)
        .stroke(Stroke::new(1.0, border))
        .rounding(Rounding::same(8.0))
        .inner_margin(egui::Margin::same(12.0))
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.colored_label(ACCENT, title);
                ui.add_space(6.0);
                ui.separator();
            });
            ui.add_space(6.0);
            add_contents(ui);
        });
}

fn theme_selector(ui: &mut egui::Ui, ctx: &egui::Context, settings: &mut AppSettings) -> bool {
    let mut selected = settings.theme;
    ComboBox::from_id_source("theme_selector")
        .selected_text(selected.label())
        .show_ui(ui, |ui| {
            for theme in ThemeKind::ALL {
                ui.selectable_value(&mut selected, theme, theme.label());
            }
        });

    if selected != settings.theme {
        settings.theme = selected;
        apply_theme(ctx, selected);
        true
    } else {
        false
    }
}

fn apply_theme(ctx: &egui::Context, theme: ThemeKind) {
    match theme {
        ThemeKind::Dark => apply_dark_theme(ctx),
        ThemeKind::Light => apply_light_theme(ctx),
    }
}

fn apply_dark_theme(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    style.visuals = egui::Visuals::dark();
    style.visuals.override_text_color = Some(Color32::from_rgb(235, 235, 235));
    style.visuals.extreme_bg_color = Color32::from_rgb(24, 24, 24);
    style.visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(18, 18, 18);
    style.visuals.widgets.noninteractive.bg_stroke =
        Stroke::new(1.0, Color32::from_rgb(45, 45, 45));
    style.visuals.widgets.inactive.bg_fill = Color32::from_rgb(30, 30, 30);
    style.visuals.widgets.inactive.bg_stroke = Stroke::new(1.0, Color32::from_rgb(60, 60, 60));
    style.visuals.widgets.hovered.bg_fill = Color32::from_rgb(40, 40, 40);
    style.visuals.widgets.active.bg_fill = Color32::from_rgb(45, 45, 45);
    style.visuals.selection.bg_fill = ACCENT;
    style.visuals.selection.stroke = Stroke::new(1.0, Color32::from_rgb(12, 12, 12));
    style.visuals.window_fill = Color32::from_rgb(14, 14, 14);
    ctx.set_style(style);
}

fn apply_light_theme(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    style.visuals = egui::Visuals::light();
    style.visuals.extreme_bg_color = Color32::from_rgb(248, 248, 248);
    style.visuals.selection.bg_fill = Color32::from_rgb(255, 187, 92);
    style.visuals.selection.stroke = Stroke::new(1.0, Color32::from_rgb(70, 50, 20));
    style.visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(245, 245, 245);
    style.visuals.widgets.inactive.bg_fill = Color32::from_rgb(250, 250, 250);
    style.visuals.widgets.inactive.bg_stroke = Stroke::new(1.0, Color32::from_rgb(200, 200, 200));
    ctx.set_style(style);
}
