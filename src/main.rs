mod audio;
#[cfg(target_os = "windows")]
mod com;
mod config;
mod drag;
mod error;
mod marquee;
mod media;
mod now_playing;
mod opacity;
mod slider;
mod topmost;
mod window;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use eframe::egui::{
    self, Color32, CornerRadius, FontId, LayerId, PointerButton, ResizeDirection, RichText, Sense,
    Stroke, StrokeKind, ViewportBuilder, ViewportCommand, WindowLevel,
};

use crate::{
    audio::{AudioSessionBridge, VolumeState},
    config::{Config, ConfigWatcher},
    drag::DragManager,
    error::ControlError,
    marquee::Marquee,
    media::{MediaCommand, MediaCommandDispatcher},
    now_playing::{NowPlaying, PlayState, Snapshot, SnapshotPoller},
    opacity::{OpacityController, OPACITY_MAX, OPACITY_MIN},
    slider::{PointerEvent, SliderConfig, SliderModel, TrackGeometry},
    topmost::TopmostToggle,
    window::{apply_rounded_corners, ViewportWindow, WindowAttributes, WindowPose},
};

const APP_TITLE: &str = "OnScreen Media Control";
const STATUS_TTL: Duration = Duration::from_secs(3);
const MARQUEE_FRAME: Duration = Duration::from_millis(30);
const IDLE_FRAME: Duration = Duration::from_millis(200);
const BACKGROUND_FILL: Color32 = Color32::from_rgb(30, 30, 30);
const BORDER_COLOR: Color32 = Color32::from_rgb(80, 80, 80);
const TEXT_COLOR: Color32 = Color32::from_rgb(221, 221, 221);
const SLIDER_TRACK: Color32 = Color32::from_rgb(64, 64, 64);
const SLIDER_FILL: Color32 = Color32::from_rgb(76, 141, 255);
const CLOSE_BUTTON_SIZE: f32 = 24.0;

/// Discrete requests raised while laying out the UI, applied after the frame's widgets.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Intent {
    Media(MediaCommand),
    ToggleMute,
    ToggleTopmost,
    SetVolume(f64),
    SetOpacity(f64),
}

struct App {
    config: Config,
    config_watcher: Option<ConfigWatcher>,
    audio: AudioSessionBridge,
    /// Cleared when the default device is missing, set again by any successful read.
    audio_available: bool,
    last_local_write: Option<Instant>,
    dispatcher: MediaCommandDispatcher,
    poller: SnapshotPoller,
    now: NowPlaying,
    media_err: Option<String>,
    volume_slider: SliderModel,
    opacity_slider: SliderModel,
    opacity: OpacityController,
    topmost: TopmostToggle,
    drag: DragManager,
    last_pose: Option<WindowPose>,
    title_marquee: Marquee,
    artist_marquee: Marquee,
    status: Option<(String, Instant)>,
    close_rect: egui::Rect,
    last_frame: Option<Instant>,
    window_initialized: bool,
}

impl App {
    fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        let audio = AudioSessionBridge::system(config.os.call_budget);

        let config_watcher = config_path.and_then(|path| match ConfigWatcher::watch(path) {
            Ok(watcher) => {
                log::info!("watching {}", watcher.path().display());
                Some(watcher)
            }
            Err(err) => {
                log::warn!("config hot reload disabled: {err:#}");
                None
            }
        });

        let poller = SnapshotPoller::spawn(config.os.call_budget);
        Self::with_backends(
            config,
            audio,
            MediaCommandDispatcher::system(),
            poller,
            config_watcher,
        )
    }

    fn with_backends(
        config: Config,
        audio: AudioSessionBridge,
        dispatcher: MediaCommandDispatcher,
        poller: SnapshotPoller,
        config_watcher: Option<ConfigWatcher>,
    ) -> Self {
        let volume_slider = SliderModel::new(
            SliderConfig::new(0.0, 100.0, config.sliders.volume_debounce).with_step(1.0),
            0.0,
        );
        let opacity_slider = SliderModel::new(
            SliderConfig::new(
                OPACITY_MIN as f64,
                OPACITY_MAX as f64,
                config.sliders.opacity_debounce,
            )
            .with_step(1.0),
            config.window.initial_opacity as f64,
        );

        let mut app = Self {
            opacity: OpacityController::new(config.window.initial_opacity),
            topmost: TopmostToggle::new(config.window.always_on_top),
            config,
            config_watcher,
            audio,
            audio_available: false,
            last_local_write: None,
            dispatcher,
            poller,
            now: NowPlaying::default(),
            media_err: None,
            volume_slider,
            opacity_slider,
            drag: DragManager::new(),
            last_pose: None,
            title_marquee: Marquee::new(),
            artist_marquee: Marquee::new(),
            status: None,
            close_rect: egui::Rect::NOTHING,
            last_frame: None,
            window_initialized: false,
        };

        match app.audio.get_volume() {
            Ok(state) => {
                app.audio_available = true;
                app.volume_slider.sync_value(state.level as f64);
            }
            Err(err) => log::warn!("volume control unavailable: {err}"),
        }

        app
    }

    fn report(&mut self, err: &ControlError, now: Instant) {
        self.status = Some((format!("{} (not applied)", err.label()), now));
    }

    fn report_audio(&mut self, err: &ControlError, now: Instant) {
        if matches!(err, ControlError::DeviceUnavailable(_)) {
            self.audio_available = false;
        }
        self.report(err, now);
    }

    fn handle_intent(&mut self, intent: Intent, window: &mut dyn WindowAttributes, now: Instant) {
        match intent {
            Intent::Media(command) => {
                if let Err(err) = self.dispatcher.send(command) {
                    self.report(&err, now);
                }
            }
            Intent::ToggleMute => {
                self.last_local_write = Some(now);
                match self.audio.toggle_mute() {
                    Ok(_) => self.audio_available = true,
                    Err(err) => self.report_audio(&err, now),
                }
            }
            Intent::ToggleTopmost => {
                self.topmost.toggle(window);
            }
            Intent::SetVolume(value) => self.apply_volume(value, now),
            Intent::SetOpacity(value) => {
                let state = self.opacity.set_opacity(value.round() as i32, window);
                self.opacity_slider.sync_value(state.percent as f64);
            }
        }
    }

    fn apply_volume(&mut self, value: f64, now: Instant) {
        self.last_local_write = Some(now);
        match self.audio.set_volume(value.round() as i32) {
            Ok(state) => {
                self.audio_available = true;
                self.volume_slider.sync_value(state.level as f64);
            }
            Err(err) => {
                if let Some(cached) = self.audio.cached() {
                    self.volume_slider.sync_value(cached.level as f64);
                }
                self.report_audio(&err, now);
            }
        }
    }

    fn apply_snapshots(&mut self, snapshots: Vec<Snapshot>) {
        for snapshot in snapshots {
            match snapshot.now {
                Ok(now_playing) => {
                    self.media_err = None;
                    if now_playing.title != self.now.title {
                        self.title_marquee.reset();
                    }
                    if now_playing.artist != self.now.artist {
                        self.artist_marquee.reset();
                    }
                    self.now = now_playing;
                }
                Err(err) => {
                    if self.media_err.as_deref() != Some(err.as_str()) {
                        log::warn!("media snapshot failed: {err}");
                    }
                    self.media_err = Some(err);
                    self.now = NowPlaying::default();
                }
            }

            if let Some(volume) = snapshot.volume {
                self.apply_external_volume(volume, snapshot.requested_at);
            }
        }
    }

    /// Readings requested before the latest local write predate it and are dropped.
    fn apply_external_volume(&mut self, volume: VolumeState, requested_at: Instant) {
        self.audio_available = true;
        let stale = self.last_local_write.is_some_and(|at| requested_at < at);
        if stale || self.volume_slider.is_active() || self.volume_slider.deadline().is_some() {
            return;
        }
        if self.audio.sync_external(volume) {
            log::debug!("external volume change: {volume:?}");
        }
        self.volume_slider.sync_value(volume.level as f64);
    }

    fn artist_text(&self) -> String {
        if self.media_err.is_some() {
            "-".to_string()
        } else if self.now.state == PlayState::NoSession {
            self.now.state.label().to_string()
        } else {
            self.now.artist.clone()
        }
    }

    fn apply_config(&mut self, config: Config) {
        self.volume_slider.set_debounce(config.sliders.volume_debounce);
        self.opacity_slider.set_debounce(config.sliders.opacity_debounce);
        self.audio.set_call_budget(config.os.call_budget);
        if config.window != self.config.window {
            log::info!("window settings change on next start");
        }
        self.config = config;
    }

    fn poll_config(&mut self) {
        let Some(watcher) = self.config_watcher.as_mut() else {
            return;
        };
        match watcher.poll() {
            Some(Ok(config)) => {
                log::info!("config reloaded");
                self.apply_config(config);
            }
            Some(Err(err)) => log::warn!("config reload failed: {err:#}"),
            None => {}
        }
    }

    fn snapshot_poll_interval(&self) -> Duration {
        match self.now.state {
            PlayState::Playing | PlayState::Changing => self.config.media.poll_playing,
            _ => self.config.media.poll_idle,
        }
    }

    fn desired_repaint_interval(&self, now: Instant, animating: bool) -> Duration {
        let mut interval = if animating {
            MARQUEE_FRAME
        } else {
            IDLE_FRAME
        };
        for deadline in [self.volume_slider.deadline(), self.opacity_slider.deadline()]
            .into_iter()
            .flatten()
        {
            interval = interval.min(deadline.saturating_duration_since(now));
        }
        interval
    }

    fn status_text(&self, now: Instant) -> Option<&str> {
        self.status
            .as_ref()
            .filter(|(_, at)| now.duration_since(*at) < STATUS_TTL)
            .map(|(text, _)| text.as_str())
    }

    fn render(&mut self, ui: &mut egui::Ui, now: Instant, dt: f32, intents: &mut Vec<Intent>) -> bool {
        let width = ui.available_width();
        let text_size = (ui.ctx().screen_rect().width() / 25.0).max(12.0);
        let mut animating = false;

        ui.spacing_mut().item_spacing.y = 6.0;

        let title = self.now.title.clone();
        let artist = self.artist_text();
        animating |= metadata_row(ui, "Title:", &title, text_size, &mut self.title_marquee, dt);
        animating |= metadata_row(ui, "Artist:", &artist, text_size, &mut self.artist_marquee, dt);

        let button_size = (width / 15.0).max(40.0);
        let spacing = 60.0_f32.min(((width - 3.0 * button_size) / 4.0).max(4.0));
        ui.horizontal(|row| {
            let used = 3.0 * button_size + 2.0 * spacing;
            row.add_space(((width - used) / 2.0).max(0.0));
            if playback_button(row, "⏮", "Previous track", button_size).clicked() {
                intents.push(Intent::Media(MediaCommand::Previous));
            }
            row.add_space(spacing);
            let playing = self.now.state == PlayState::Playing;
            let (glyph, hint, command) = if playing {
                ("⏸", "Pause", MediaCommand::Pause)
            } else {
                ("▶", "Play", MediaCommand::Play)
            };
            if playback_button(row, glyph, hint, button_size).clicked() {
                intents.push(Intent::Media(command));
            }
            row.add_space(spacing);
            if playback_button(row, "⏭", "Next track", button_size).clicked() {
                intents.push(Intent::Media(MediaCommand::Next));
            }
        });

        ui.horizontal(|row| {
            let audio_enabled = self.audio_available;
            let muted = self.audio.cached().is_some_and(|state| state.muted);

            let fixed = 210.0;
            let slider_width = ((width - fixed) / 2.0).max(60.0);

            row.label(RichText::new("Vol").color(TEXT_COLOR));
            if let Some(value) =
                slider_track(row, &mut self.volume_slider, slider_width, audio_enabled, now)
            {
                intents.push(Intent::SetVolume(value));
            }
            let mute_glyph = if muted { "🔇" } else { "🔊" };
            let mute = row
                .add_enabled(audio_enabled, egui::Button::new(mute_glyph).frame(false))
                .on_hover_text(if muted { "Unmute" } else { "Mute" });
            if mute.clicked() {
                intents.push(Intent::ToggleMute);
            }

            row.label(RichText::new("Trans").color(TEXT_COLOR));
            if let Some(value) = slider_track(row, &mut self.opacity_slider, slider_width, true, now)
            {
                intents.push(Intent::SetOpacity(value));
            }

            let mut pinned = self.topmost.enabled();
            if row
                .checkbox(&mut pinned, RichText::new("Always on top").color(TEXT_COLOR))
                .changed()
            {
                intents.push(Intent::ToggleTopmost);
            }
        });

        animating
    }

    fn render_close_button(&mut self, ctx: &egui::Context, root_rect: egui::Rect) {
        let rect = egui::Rect::from_min_size(
            egui::pos2(root_rect.right() - CLOSE_BUTTON_SIZE - 5.0, root_rect.top() + 5.0),
            egui::vec2(CLOSE_BUTTON_SIZE, CLOSE_BUTTON_SIZE),
        );
        self.close_rect = rect;
        egui::Area::new(egui::Id::new("overlay.close"))
            .fixed_pos(rect.min)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                let response = ui.add_sized(
                    rect.size(),
                    egui::Button::new(RichText::new("✕").strong().color(TEXT_COLOR)).frame(false),
                );
                if response.clicked() {
                    ctx.send_viewport_cmd(ViewportCommand::Close);
                }
            });
    }

    fn handle_window_interactions(
        &mut self,
        ctx: &egui::Context,
        window: &mut dyn WindowAttributes,
        root_rect: egui::Rect,
    ) {
        let (pointer_pos, primary_pressed, primary_down, focused, inner, outer) = ctx.input(|i| {
            (
                i.pointer.latest_pos(),
                i.pointer.button_pressed(PointerButton::Primary),
                i.pointer.primary_down(),
                i.viewport().focused,
                i.viewport().inner_rect,
                i.viewport().outer_rect,
            )
        });

        if focused == Some(false) {
            self.drag.capture_lost();
        }

        if self.drag.is_dragging() {
            if !primary_down {
                self.drag.pointer_up();
                return;
            }
            ctx.set_cursor_icon(egui::CursorIcon::Move);
            if let (Some(pos), Some(inner)) = (pointer_pos, inner) {
                if let Some(pose) = self.drag.pointer_move(to_screen(inner.min, pos)) {
                    if self.last_pose != Some(pose) {
                        window.apply_position(pose);
                        self.last_pose = Some(pose);
                    }
                }
            }
            return;
        }

        let Some(pos) = pointer_pos else {
            return;
        };
        let edge = self.config.window.resize_margin;
        if !root_rect.expand(edge).contains(pos) {
            return;
        }

        if let Some(direction) = resize_direction(pos, root_rect, edge) {
            ctx.set_cursor_icon(resize_cursor(direction));
            if primary_pressed && !ctx.is_using_pointer() {
                ctx.send_viewport_cmd(ViewportCommand::BeginResize(direction));
            }
            return;
        }

        let in_drag_strip = pos.y <= root_rect.top() + self.config.window.drag_region_height
            && !self.close_rect.contains(pos)
            && root_rect.contains(pos);

        if in_drag_strip {
            ctx.set_cursor_icon(egui::CursorIcon::Move);
            if primary_pressed && !ctx.is_using_pointer() {
                if let (Some(inner), Some(outer)) = (inner, outer) {
                    let current = WindowPose {
                        x: outer.min.x.round() as i32,
                        y: outer.min.y.round() as i32,
                    };
                    self.last_pose = Some(current);
                    self.drag
                        .pointer_down(to_screen(inner.min, pos), current, in_drag_strip);
                }
            }
        }
    }

    fn paint_background(&self, ctx: &egui::Context, root_rect: egui::Rect) {
        let painter = ctx.layer_painter(LayerId::background());
        let radius = CornerRadius::same(self.config.window.corner_radius.round() as u8);
        painter.rect_filled(root_rect, radius, BACKGROUND_FILL);
        painter.rect_stroke(
            root_rect,
            radius,
            Stroke::new(2.0, BORDER_COLOR),
            StrokeKind::Inside,
        );
    }

    fn paint_status(&self, ctx: &egui::Context, root_rect: egui::Rect, now: Instant) {
        let Some(text) = self.status_text(now) else {
            return;
        };
        let painter = ctx.layer_painter(LayerId::new(
            egui::Order::Foreground,
            egui::Id::new("overlay.status"),
        ));
        painter.text(
            egui::pos2(self.close_rect.left() - 6.0, root_rect.top() + 8.0),
            egui::Align2::RIGHT_TOP,
            text,
            FontId::proportional(11.0),
            Color32::from_rgb(255, 120, 120),
        );
    }
}

impl eframe::App for App {
    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        egui::Rgba::TRANSPARENT.to_array()
    }

    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        let now = Instant::now();
        let dt = self
            .last_frame
            .map(|at| now.duration_since(at).as_secs_f32())
            .unwrap_or(0.0);
        self.last_frame = Some(now);

        self.poll_config();
        let snapshots = self.poller.drain(now);
        self.apply_snapshots(snapshots);

        let mut window = ViewportWindow::new(ctx, frame);
        if !self.window_initialized {
            self.opacity.reapply(&mut window);
            self.topmost.set(self.topmost.enabled(), &mut window);
            apply_rounded_corners(frame);
            self.window_initialized = true;
        }

        let root_rect = ctx.screen_rect();
        self.paint_background(ctx, root_rect);

        let mut intents = Vec::new();
        let panel_frame = egui::Frame::NONE.inner_margin(egui::Margin::symmetric(10, 8));
        let animating = egui::CentralPanel::default()
            .frame(panel_frame)
            .show(ctx, |ui| self.render(ui, now, dt, &mut intents))
            .inner;
        self.render_close_button(ctx, root_rect);

        for intent in intents {
            self.handle_intent(intent, &mut window, now);
        }
        if let Some(value) = self.volume_slider.poll(now) {
            self.handle_intent(Intent::SetVolume(value), &mut window, now);
        }
        if let Some(value) = self.opacity_slider.poll(now) {
            self.handle_intent(Intent::SetOpacity(value), &mut window, now);
        }

        self.handle_window_interactions(ctx, &mut window, root_rect);
        self.paint_status(ctx, root_rect, now);

        self.poller.maybe_request(self.snapshot_poll_interval(), now);
        ctx.request_repaint_after(self.desired_repaint_interval(now, animating));
    }
}

fn to_screen(window_origin: egui::Pos2, local: egui::Pos2) -> (i32, i32) {
    (
        (window_origin.x + local.x).round() as i32,
        (window_origin.y + local.y).round() as i32,
    )
}

fn resize_direction(pos: egui::Pos2, rect: egui::Rect, edge: f32) -> Option<ResizeDirection> {
    let near_left = pos.x <= rect.left() + edge;
    let near_right = pos.x >= rect.right() - edge;
    let near_top = pos.y <= rect.top() + edge;
    let near_bottom = pos.y >= rect.bottom() - edge;

    if near_left && near_top {
        Some(ResizeDirection::NorthWest)
    } else if near_right && near_top {
        Some(ResizeDirection::NorthEast)
    } else if near_left && near_bottom {
        Some(ResizeDirection::SouthWest)
    } else if near_right && near_bottom {
        Some(ResizeDirection::SouthEast)
    } else if near_left {
        Some(ResizeDirection::West)
    } else if near_right {
        Some(ResizeDirection::East)
    } else if near_top {
        Some(ResizeDirection::North)
    } else if near_bottom {
        Some(ResizeDirection::South)
    } else {
        None
    }
}

fn resize_cursor(direction: ResizeDirection) -> egui::CursorIcon {
    match direction {
        ResizeDirection::North => egui::CursorIcon::ResizeNorth,
        ResizeDirection::South => egui::CursorIcon::ResizeSouth,
        ResizeDirection::East => egui::CursorIcon::ResizeEast,
        ResizeDirection::West => egui::CursorIcon::ResizeWest,
        ResizeDirection::NorthEast => egui::CursorIcon::ResizeNorthEast,
        ResizeDirection::SouthEast => egui::CursorIcon::ResizeSouthEast,
        ResizeDirection::NorthWest => egui::CursorIcon::ResizeNorthWest,
        ResizeDirection::SouthWest => egui::CursorIcon::ResizeSouthWest,
    }
}

fn metadata_row(
    ui: &mut egui::Ui,
    label: &str,
    value: &str,
    size: f32,
    marquee: &mut Marquee,
    dt: f32,
) -> bool {
    ui.horizontal(|row| {
        row.allocate_ui(egui::vec2(size * 4.0, size * 1.6), |cell| {
            cell.with_layout(egui::Layout::right_to_left(egui::Align::Center), |cell| {
                cell.label(RichText::new(label).strong().size(size).color(TEXT_COLOR));
            });
        });
        marquee_text(row, value, size, marquee, dt)
    })
    .inner
}

fn marquee_text(ui: &mut egui::Ui, text: &str, size: f32, marquee: &mut Marquee, dt: f32) -> bool {
    let galley =
        ui.painter()
            .layout_no_wrap(text.to_owned(), FontId::proportional(size), TEXT_COLOR);
    let text_size = galley.size();
    let (rect, _) = ui.allocate_exact_size(
        egui::vec2(ui.available_width().max(1.0), text_size.y.max(28.0)),
        Sense::hover(),
    );
    let animating = marquee.advance(dt, text_size.x, rect.width());
    let painter = ui.painter_at(rect);
    let y = rect.center().y - text_size.y / 2.0;
    let first_x = rect.left() - marquee.offset();
    painter.galley(egui::pos2(first_x, y), galley.clone(), TEXT_COLOR);
    if animating {
        let second_x = first_x + text_size.x + marquee.gap();
        painter.galley(egui::pos2(second_x, y), galley, TEXT_COLOR);
    }
    animating
}

fn playback_button(ui: &mut egui::Ui, glyph: &str, hint: &str, size: f32) -> egui::Response {
    ui.add_sized(
        [size, size],
        egui::Button::new(RichText::new(glyph).size(size * 0.6).color(TEXT_COLOR))
            .frame(false)
            .corner_radius(CornerRadius::same(10)),
    )
    .on_hover_cursor(egui::CursorIcon::PointingHand)
    .on_hover_text(hint)
}

/// Horizontal slider track driven by `model`. Returns a value to apply, if one is due.
fn slider_track(
    ui: &mut egui::Ui,
    model: &mut SliderModel,
    width: f32,
    enabled: bool,
    now: Instant,
) -> Option<f64> {
    const HEIGHT: f32 = 18.0;
    const THUMB_RADIUS: f32 = 7.0;

    let sense = if enabled {
        Sense::click_and_drag()
    } else {
        Sense::hover()
    };
    let (rect, response) = ui.allocate_exact_size(egui::vec2(width, HEIGHT), sense);
    let track = TrackGeometry::horizontal(rect.shrink2(egui::vec2(THUMB_RADIUS, 0.0)));

    let pointer = response.interact_pointer_pos();
    let moving = ui.input(|i| i.pointer.is_moving());
    let held = response.is_pointer_button_down_on();
    let mut emitted = None;

    if enabled {
        if response.clicked() && !model.is_active() {
            if let Some(pos) = pointer {
                model.on_pointer_event(PointerEvent::Pressed(pos), &track, now);
                emitted = model
                    .on_pointer_event(PointerEvent::Released(Some(pos)), &track, now)
                    .emitted;
            }
        } else if held && !model.is_active() {
            if let Some(pos) = pointer {
                model.on_pointer_event(PointerEvent::Pressed(pos), &track, now);
            }
        } else if held && moving {
            if let Some(pos) = pointer {
                model.on_pointer_event(PointerEvent::Moved(pos), &track, now);
            }
        } else if !held && model.is_active() {
            let release_pos = ui.input(|i| i.pointer.latest_pos());
            emitted = model
                .on_pointer_event(PointerEvent::Released(release_pos), &track, now)
                .emitted;
        }
    }

    if ui.is_rect_visible(rect) {
        let config = model.config();
        let span = (config.max - config.min).max(f64::EPSILON);
        let fraction = ((model.value() - config.min) / span).clamp(0.0, 1.0) as f32;
        let painter = ui.painter();
        let rail = egui::Rect::from_center_size(rect.center(), egui::vec2(track.rect.width(), 4.0));
        let thumb_x = track.rect.left() + fraction * track.rect.width();
        let (fill, thumb) = if enabled {
            (SLIDER_FILL, TEXT_COLOR)
        } else {
            (SLIDER_TRACK, SLIDER_TRACK)
        };
        painter.rect_filled(rail, CornerRadius::same(2), SLIDER_TRACK);
        painter.rect_filled(
            egui::Rect::from_min_max(rail.min, egui::pos2(thumb_x, rail.max.y)),
            CornerRadius::same(2),
            fill,
        );
        painter.circle_filled(egui::pos2(thumb_x, rect.center().y), THUMB_RADIUS, thumb);
    }

    emitted
}

fn locate_asset(name: &str) -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(dir) = std::env::current_dir() {
        roots.push(dir);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            roots.push(dir.to_path_buf());
        }
    }
    roots
        .into_iter()
        .map(|root| root.join("assets").join(name))
        .find(|path| path.exists())
}

fn load_icon(path: &Path) -> anyhow::Result<egui::IconData> {
    let image = image::open(path)
        .with_context(|| format!("Failed to decode icon: {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(egui::IconData {
        rgba: image.into_raw(),
        width,
        height,
    })
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load().unwrap_or_else(|err| {
        log::warn!("using default config: {err:#}");
        Config::default()
    });
    let config_path = Config::locate();

    let level = if config.window.always_on_top {
        WindowLevel::AlwaysOnTop
    } else {
        WindowLevel::Normal
    };
    let mut viewport = ViewportBuilder::default()
        .with_title(APP_TITLE)
        .with_transparent(true)
        .with_decorations(false)
        .with_inner_size([config.window.width, config.window.height])
        .with_min_inner_size([config.window.min_width, config.window.min_height])
        .with_window_level(level);

    if let Some(path) = ["icon.png", "icon.ico"].into_iter().find_map(locate_asset) {
        match load_icon(&path) {
            Ok(icon) => viewport = viewport.with_icon(Arc::new(icon)),
            Err(err) => log::warn!("{err:#}"),
        }
    }

    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    log::info!("starting {APP_TITLE}");
    let run_res = eframe::run_native(
        APP_TITLE,
        native_options,
        Box::new(
            move |_cc| -> std::result::Result<
                Box<dyn eframe::App>,
                Box<dyn std::error::Error + Send + Sync>,
            > { Ok(Box::new(App::new(config, config_path))) },
        ),
    );
    if let Err(e) = run_res {
        log::error!("{e}");
        return Err(Box::new(e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            tests::{bridge, FakeEndpoint},
            EndpointVolume,
        },
        media::{KeyInjector, MediaKey},
        window::tests::RecordingWindow,
    };
    use std::{cell::Cell, rc::Rc};

    struct RejectingInjector;

    impl KeyInjector for RejectingInjector {
        fn inject(&self, _key: MediaKey) -> Result<(), ControlError> {
            Err(ControlError::InjectionFailed("secure desktop".into()))
        }
    }

    fn app_over(audio: AudioSessionBridge) -> App {
        App::with_backends(
            Config::default(),
            audio,
            MediaCommandDispatcher::new(Box::new(RejectingInjector)),
            SnapshotPoller::disconnected(),
            None,
        )
    }

    fn app_with(endpoint: &FakeEndpoint) -> App {
        app_over(bridge(endpoint))
    }

    fn playing(title: &str) -> NowPlaying {
        NowPlaying {
            title: title.into(),
            artist: "Band".into(),
            state: PlayState::Playing,
        }
    }

    #[test]
    fn startup_reads_current_volume_into_slider() {
        let endpoint = FakeEndpoint::at(40);
        let app = app_with(&endpoint);
        assert_eq!(app.volume_slider.value(), 40.0);
        assert!(app.audio_available);
    }

    #[test]
    fn mute_toggle_leaves_level_and_slider_alone() {
        let endpoint = FakeEndpoint::at(40);
        let mut app = app_with(&endpoint);
        let mut window = RecordingWindow::default();
        let now = Instant::now();

        app.handle_intent(Intent::ToggleMute, &mut window, now);
        assert_eq!(app.audio.cached(), Some(VolumeState { level: 40, muted: true }));
        assert_eq!(app.volume_slider.value(), 40.0);

        app.handle_intent(Intent::ToggleMute, &mut window, now);
        assert!(!endpoint.muted.get());
        assert_eq!(endpoint.scalar.get(), 0.4);
    }

    #[test]
    fn failed_volume_write_restores_last_known_level() {
        let endpoint = FakeEndpoint::at(20);
        let mut app = app_with(&endpoint);
        let mut window = RecordingWindow::default();
        let now = Instant::now();

        *endpoint.fail_with.borrow_mut() = Some(ControlError::AccessDenied("policy".into()));
        app.handle_intent(Intent::SetVolume(75.0), &mut window, now);

        assert_eq!(app.volume_slider.value(), 20.0);
        assert_eq!(app.status_text(now), Some("Audio access denied (not applied)"));
        assert_eq!(app.status_text(now + STATUS_TTL), None);
        assert!(app.audio_available);
    }

    #[test]
    fn snapshot_taken_before_a_write_does_not_undo_it() {
        let endpoint = FakeEndpoint::at(20);
        let mut app = app_with(&endpoint);
        let mut window = RecordingWindow::default();
        let requested_at = Instant::now();
        let written_at = requested_at + Duration::from_millis(10);

        app.handle_intent(Intent::SetVolume(75.0), &mut window, written_at);
        app.apply_snapshots(vec![Snapshot {
            requested_at,
            now: Ok(playing("Song")),
            volume: Some(VolumeState { level: 20, muted: false }),
        }]);

        assert_eq!(endpoint.scalar.get(), 0.75);
        assert_eq!(app.volume_slider.value(), 75.0);
        assert_eq!(app.audio.cached(), Some(VolumeState { level: 75, muted: false }));

        app.apply_snapshots(vec![Snapshot {
            requested_at: written_at + Duration::from_secs(1),
            now: Ok(playing("Song")),
            volume: Some(VolumeState { level: 30, muted: false }),
        }]);
        assert_eq!(app.volume_slider.value(), 30.0);
    }

    #[test]
    fn rejected_media_key_is_reported() {
        let endpoint = FakeEndpoint::at(20);
        let mut app = app_with(&endpoint);
        let mut window = RecordingWindow::default();
        let now = Instant::now();

        app.handle_intent(Intent::Media(MediaCommand::Next), &mut window, now);
        assert_eq!(app.status_text(now), Some("Media key not accepted (not applied)"));
    }

    #[test]
    fn opacity_intent_is_clamped_and_applied() {
        let endpoint = FakeEndpoint::at(20);
        let mut app = app_with(&endpoint);
        let mut window = RecordingWindow::default();

        app.handle_intent(Intent::SetOpacity(12.0), &mut window, Instant::now());
        assert_eq!(app.opacity.state().percent, OPACITY_MIN);
        assert_eq!(window.alpha, vec![77]);
    }

    #[test]
    fn topmost_intent_flips_window_level() {
        let endpoint = FakeEndpoint::at(20);
        let mut app = app_with(&endpoint);
        let mut window = RecordingWindow::default();

        app.handle_intent(Intent::ToggleTopmost, &mut window, Instant::now());
        assert!(!app.topmost.enabled());
        assert_eq!(window.topmost, vec![false]);
    }

    #[test]
    fn external_volume_change_reaches_idle_slider() {
        let endpoint = FakeEndpoint::at(20);
        let mut app = app_with(&endpoint);

        app.apply_snapshots(vec![Snapshot {
            requested_at: Instant::now(),
            now: Ok(playing("Song")),
            volume: Some(VolumeState { level: 65, muted: false }),
        }]);
        assert_eq!(app.volume_slider.value(), 65.0);
        assert_eq!(app.now.title, "Song");
        assert_eq!(app.snapshot_poll_interval(), app.config.media.poll_playing);
    }

    #[test]
    fn volume_still_syncs_when_media_query_fails() {
        let endpoint = FakeEndpoint::at(20);
        let mut app = app_with(&endpoint);

        app.apply_snapshots(vec![Snapshot {
            requested_at: Instant::now(),
            now: Err("RPC failure".into()),
            volume: Some(VolumeState { level: 55, muted: true }),
        }]);
        assert_eq!(app.now, NowPlaying::default());
        assert_eq!(app.media_err.as_deref(), Some("RPC failure"));
        assert_eq!(app.volume_slider.value(), 55.0);
        assert_eq!(app.audio.cached(), Some(VolumeState { level: 55, muted: true }));
    }

    #[test]
    fn artist_row_shows_dash_on_error_and_label_without_session() {
        let endpoint = FakeEndpoint::at(20);
        let mut app = app_with(&endpoint);

        app.apply_snapshots(vec![Snapshot {
            requested_at: Instant::now(),
            now: Err("RPC failure".into()),
            volume: None,
        }]);
        assert_eq!(app.artist_text(), "-");

        app.apply_snapshots(vec![Snapshot {
            requested_at: Instant::now(),
            now: Ok(NowPlaying {
                state: PlayState::NoSession,
                ..Default::default()
            }),
            volume: None,
        }]);
        assert_eq!(app.artist_text(), "No session");
    }

    #[test]
    fn missing_device_at_startup_recovers_once_it_appears() {
        let endpoint = FakeEndpoint::at(35);
        let plugged_in = Rc::new(Cell::new(false));
        let (device, present) = (endpoint.clone(), plugged_in.clone());
        let audio = AudioSessionBridge::new(
            Box::new(move || {
                if present.get() {
                    Ok(Box::new(device.clone()) as Box<dyn EndpointVolume>)
                } else {
                    Err(ControlError::DeviceUnavailable("no endpoint".into()))
                }
            }),
            Duration::from_millis(250),
        );
        let mut app = app_over(audio);
        let mut window = RecordingWindow::default();
        assert!(!app.audio_available);

        plugged_in.set(true);
        app.handle_intent(Intent::SetVolume(60.0), &mut window, Instant::now());
        assert!(app.audio_available);
        assert_eq!(endpoint.scalar.get(), 0.6);
    }

    #[test]
    fn reloaded_config_updates_debounce_and_poll_intervals() {
        let endpoint = FakeEndpoint::at(20);
        let mut app = app_with(&endpoint);
        let reloaded = Config::parse(
            r#"
            [sliders]
            volume_debounce_ms = 120
            opacity_debounce_ms = 40

            [media]
            poll_idle_ms = 1500

            [os]
            call_budget_ms = 500
            "#,
        )
        .unwrap();

        app.apply_config(reloaded);
        assert_eq!(
            app.volume_slider.config().debounce,
            Duration::from_millis(120)
        );
        assert_eq!(
            app.opacity_slider.config().debounce,
            Duration::from_millis(40)
        );
        assert_eq!(app.snapshot_poll_interval(), Duration::from_millis(1500));
        assert_eq!(app.config.os.call_budget, Duration::from_millis(500));
    }

    #[test]
    fn resize_edges_are_detected() {
        let rect = egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(400.0, 150.0));
        assert_eq!(
            resize_direction(egui::pos2(2.0, 2.0), rect, 6.0),
            Some(ResizeDirection::NorthWest)
        );
        assert_eq!(
            resize_direction(egui::pos2(398.0, 80.0), rect, 6.0),
            Some(ResizeDirection::East)
        );
        assert_eq!(resize_direction(egui::pos2(200.0, 80.0), rect, 6.0), None);
    }

    #[test]
    fn pending_debounce_shortens_repaint_interval() {
        let endpoint = FakeEndpoint::at(0);
        let mut app = app_with(&endpoint);
        let now = Instant::now();
        let track = TrackGeometry::horizontal(egui::Rect::from_min_size(
            egui::pos2(0.0, 0.0),
            egui::vec2(100.0, 10.0),
        ));
        app.volume_slider
            .on_pointer_event(PointerEvent::Pressed(egui::pos2(50.0, 5.0)), &track, now);

        let interval = app.desired_repaint_interval(now, false);
        assert_eq!(interval, app.config.sliders.volume_debounce);
    }
}
