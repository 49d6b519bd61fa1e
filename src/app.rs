use crate::config::ConfigSnapshot;
use crate::gate::{GateStage, GuardedAction, PIN_LENGTH};
use crate::kiosk::Kiosk;
use eframe::egui;
use egui::{Align2, Color32, ColorImage, FontId, Pos2, Rect, RichText, Sense, TextureHandle, TextureOptions};
use log::{error, info};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

const BUTTON_SIZE: egui::Vec2 = egui::vec2(360.0, 72.0);
const CONTROL_SIZE: f32 = 96.0;

/// The kiosk window: home screen, playback overlay and the action gate.
pub struct KioskApp {
    kiosk: Kiosk,
    config_rx: watch::Receiver<Option<Arc<ConfigSnapshot>>>,
    frames_rx: watch::Receiver<Option<ColorImage>>,
    background: Option<TextureHandle>,
    video: Option<TextureHandle>,
    gate_opened_this_frame: bool,
}

impl KioskApp {
    pub fn new(kiosk: Kiosk, frames_rx: watch::Receiver<Option<ColorImage>>) -> Self {
        let config_rx = kiosk.subscribe();
        Self {
            kiosk,
            config_rx,
            frames_rx,
            background: None,
            video: None,
            gate_opened_this_frame: false,
        }
    }

    fn saw_activity(ctx: &egui::Context) -> bool {
        ctx.input(|i| {
            i.events.iter().any(|event| {
                matches!(
                    event,
                    egui::Event::PointerButton { pressed: true, .. }
                        | egui::Event::PointerMoved(_)
                        | egui::Event::Key { pressed: true, .. }
                        | egui::Event::Text(_)
                        | egui::Event::Touch {
                            phase: egui::TouchPhase::Start | egui::TouchPhase::Move,
                            ..
                        }
                )
            })
        })
    }

    fn refresh_background(&mut self, ctx: &egui::Context) {
        if !self.config_rx.has_changed().unwrap_or(false) {
            return;
        }
        let snapshot = self.config_rx.borrow_and_update().clone();
        self.background = snapshot
            .as_ref()
            .and_then(|s| s.background_path.as_deref())
            .and_then(|path| load_image(ctx, "background", path));
    }

    fn refresh_frame(&mut self, ctx: &egui::Context) {
        if !self.frames_rx.has_changed().unwrap_or(false) {
            return;
        }
        let frame = self.frames_rx.borrow_and_update().clone();
        match frame {
            Some(image) => match &mut self.video {
                Some(texture) => texture.set(image, TextureOptions::LINEAR),
                None => {
                    self.video = Some(ctx.load_texture("video_frame", image, TextureOptions::LINEAR));
                }
            },
            None => self.video = None,
        }
    }

    fn show_home(&mut self, ctx: &egui::Context, now: f64) {
        let mut selected = None;
        let mut open_gate = false;
        // Buttons under the gate modal stay inert.
        let gate_open = self.kiosk.gate().is_some();

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                let screen = ui.max_rect();
                if let Some(texture) = &self.background {
                    let rect = cover_rect(texture.size_vec2(), screen);
                    ui.painter().image(
                        texture.id(),
                        rect,
                        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }

                match self.kiosk.config() {
                    Some(config) => {
                        let height = config.actions.len() as f32 * (BUTTON_SIZE.y + 24.0);
                        let column = Rect::from_center_size(
                            screen.center(),
                            egui::vec2(BUTTON_SIZE.x, height.max(BUTTON_SIZE.y)),
                        );
                        ui.allocate_new_ui(egui::UiBuilder::new().max_rect(column), |ui| {
                            ui.vertical_centered(|ui| {
                                for action in &config.actions {
                                    let button = egui::Button::new(RichText::new(&action.title).size(32.0))
                                        .min_size(BUTTON_SIZE);
                                    if ui.add_enabled(!gate_open, button).clicked() {
                                        selected = Some(action.id);
                                    }
                                    ui.add_space(24.0);
                                }
                            });
                        });
                    }
                    None => {
                        ui.painter().text(
                            screen.center(),
                            Align2::CENTER_CENTER,
                            "Loading configuration…",
                            FontId::proportional(32.0),
                            Color32::WHITE,
                        );
                    }
                }

                if let Some(notice) = self.kiosk.notice() {
                    ui.painter().text(
                        screen.center_bottom() - egui::vec2(0.0, 48.0),
                        Align2::CENTER_BOTTOM,
                        notice,
                        FontId::proportional(24.0),
                        Color32::from_rgb(255, 120, 120),
                    );
                }

                let close = Rect::from_min_size(
                    screen.right_top() + egui::vec2(-CONTROL_SIZE, 0.0),
                    egui::vec2(CONTROL_SIZE, CONTROL_SIZE),
                );
                if ui
                    .put(close, egui::Button::new(RichText::new("✕").size(40.0)).frame(false))
                    .clicked()
                {
                    open_gate = true;
                }
            });

        if let Some(id) = selected {
            // Errors surface through the notice.
            let _ = self.kiosk.select_action(id, now);
        }
        if open_gate {
            self.kiosk.open_gate();
            self.gate_opened_this_frame = true;
        }
    }

    fn show_playback(&mut self, ctx: &egui::Context, now: f64) {
        let mut toggle = false;
        let mut close = false;
        let paused = self.kiosk.session().is_some_and(|s| s.is_paused());

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                let screen = ui.max_rect();
                let overlay = ui.allocate_rect(screen, Sense::click());
                if let Some(texture) = &self.video {
                    let rect = fit_rect(texture.size_vec2(), screen);
                    ui.painter().image(
                        texture.id(),
                        rect,
                        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }
                toggle |= overlay.clicked();

                let label = if paused { "▶" } else { "⏸" };
                for x in [screen.left(), screen.right() - CONTROL_SIZE] {
                    let rect = Rect::from_min_size(
                        Pos2::new(x, screen.center().y - CONTROL_SIZE / 2.0),
                        egui::vec2(CONTROL_SIZE, CONTROL_SIZE),
                    );
                    toggle |= ui
                        .put(rect, egui::Button::new(RichText::new(label).size(48.0)))
                        .clicked();
                }

                let close_rect = Rect::from_min_size(
                    screen.right_top() + egui::vec2(-CONTROL_SIZE, 0.0),
                    egui::vec2(CONTROL_SIZE, CONTROL_SIZE),
                );
                close |= ui
                    .put(close_rect, egui::Button::new(RichText::new("✕").size(40.0)).frame(false))
                    .clicked();
            });

        if close {
            self.kiosk.close_session(now);
        } else if toggle {
            self.kiosk.toggle_pause(now);
        }
    }

    fn show_gate(&mut self, ctx: &egui::Context, now: f64) {
        let Some(gate) = self.kiosk.gate_mut() else {
            return;
        };
        let stage = gate.stage();
        let mut pin = gate.pin_input().to_string();
        let error = gate.error().map(ToString::to_string);

        let mut chosen = None;
        let mut back = false;
        let mut submit = false;

        let window = egui::Window::new("Administration")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| match stage {
                GateStage::ChoosingAction => {
                    if ui.button(RichText::new("Close application").size(24.0)).clicked() {
                        chosen = Some(GuardedAction::CloseApplication);
                    }
                    if ui.button(RichText::new("Power off").size(24.0)).clicked() {
                        chosen = Some(GuardedAction::PowerOff);
                    }
                }
                GateStage::EnteringPin(_) => {
                    ui.label("Enter PIN");
                    let field = ui.add(
                        egui::TextEdit::singleline(&mut pin)
                            .password(true)
                            .char_limit(PIN_LENGTH)
                            .desired_width(120.0),
                    );
                    field.request_focus();
                    if field.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                        submit = true;
                    }
                    if let Some(error) = &error {
                        ui.colored_label(Color32::RED, error);
                    }
                    ui.horizontal(|ui| {
                        submit |= ui.button("Validate").clicked();
                        back |= ui.button("Back").clicked();
                    });
                }
            });

        let clicked_outside = match &window {
            Some(response) => ctx.input(|i| {
                i.pointer.any_click()
                    && i
                        .pointer
                        .interact_pos()
                        .is_some_and(|pos| !response.response.rect.contains(pos))
            }),
            None => false,
        };

        if let Some(action) = chosen {
            gate.choose(action);
        } else if back {
            gate.back();
        } else if pin != gate.pin_input() {
            gate.set_pin_input(&pin);
        }

        if submit {
            // Errors are kept by the gate for display.
            let _ = self.kiosk.submit_pin(now);
        }
        if clicked_outside && !self.gate_opened_this_frame {
            self.kiosk.dismiss_gate();
        }
    }
}

impl eframe::App for KioskApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = ctx.input(|i| i.time);

        if Self::saw_activity(ctx) {
            self.kiosk.record_activity(now);
        }
        self.kiosk.tick(now);
        self.refresh_background(ctx);
        self.refresh_frame(ctx);

        if self.kiosk.session().is_some() {
            self.show_playback(ctx, now);
        } else {
            self.video = None;
            self.show_home(ctx, now);
        }
        if self.kiosk.gate().is_some() {
            self.show_gate(ctx, now);
        }
        self.gate_opened_this_frame = false;

        ctx.request_repaint();
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Window closing");
        self.kiosk.teardown();
    }
}

fn load_image(ctx: &egui::Context, name: &str, path: &Path) -> Option<TextureHandle> {
    match image::open(path) {
        Ok(img) => {
            let rgba = img.to_rgba8();
            let size = [rgba.width() as usize, rgba.height() as usize];
            let color_image = ColorImage::from_rgba_unmultiplied(size, &rgba.into_raw());
            info!("Loaded {} image {}", name, path.display());
            Some(ctx.load_texture(name, color_image, TextureOptions::LINEAR))
        }
        Err(e) => {
            error!("Failed to load {} image {}: {}", name, path.display(), e);
            None
        }
    }
}

/// Scales `media` to cover `area`, cropping the overflow.
fn cover_rect(media: egui::Vec2, area: Rect) -> Rect {
    if media.x <= 0.0 || media.y <= 0.0 {
        return area;
    }
    let scale = (area.width() / media.x).max(area.height() / media.y);
    Rect::from_center_size(area.center(), media * scale)
}

/// Scales `media` to fit inside `area`, keeping its aspect ratio.
fn fit_rect(media: egui::Vec2, area: Rect) -> Rect {
    if media.x <= 0.0 || media.y <= 0.0 {
        return area;
    }
    let scale = (area.width() / media.x).min(area.height() / media.y);
    Rect::from_center_size(area.center(), media * scale)
}
