use std::time::{Duration, Instant};

use eframe::egui::{Pos2, Rect};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderConfig {
    pub min: f64,
    pub max: f64,
    /// Values snap to multiples of `step` above `min`. `None` keeps them continuous.
    pub step: Option<f64>,
    pub debounce: Duration,
}

impl SliderConfig {
    pub fn new(min: f64, max: f64, debounce: Duration) -> Self {
        let (min, max) = if max < min { (max, min) } else { (min, max) };
        Self {
            min,
            max,
            step: None,
            debounce,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = (step > 0.0).then_some(step);
        self
    }

    fn quantize(&self, value: f64) -> f64 {
        let value = value.clamp(self.min, self.max);
        match self.step {
            Some(step) => {
                let snapped = self.min + ((value - self.min) / step).round() * step;
                snapped.clamp(self.min, self.max)
            }
            None => value,
        }
    }
}

/// Horizontal track; the left end is `min`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackGeometry {
    pub rect: Rect,
}

impl TrackGeometry {
    pub fn horizontal(rect: Rect) -> Self {
        Self { rect }
    }

    /// Fraction of the track covered up to `pos`, clamped to 0..=1.
    pub fn fraction_at(&self, pos: Pos2) -> f64 {
        let (offset, length) = (pos.x - self.rect.left(), self.rect.width());
        if length <= f32::EPSILON || !offset.is_finite() {
            return 0.0;
        }
        (offset as f64 / length as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Pressed(Pos2),
    Moved(Pos2),
    /// Release position, when the UI still knows it.
    Released(Option<Pos2>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderStep {
    /// Value now shown by the slider.
    pub value: f64,
    /// Value to hand to downstream consumers, if any.
    pub emitted: Option<f64>,
}

/// Continuous value driven by pointer input, with trailing-edge debounce.
///
/// Each accepted press or move restarts the debounce window. The pending value
/// is emitted once the window elapses without new input (see [`SliderModel::poll`])
/// or immediately when the pointer is released. During a continuous drag the
/// wait is capped at one window after the previous emission (or the press), so
/// the applied value keeps following the pointer. Emitting the value that was
/// last emitted is skipped.
#[derive(Debug, Clone)]
pub struct SliderModel {
    config: SliderConfig,
    value: f64,
    active: bool,
    pending: Option<f64>,
    last_event: Option<Instant>,
    /// Start of the current wait: the press, or the latest emission in this gesture.
    anchor: Option<Instant>,
    last_emitted: Option<f64>,
}

impl SliderModel {
    pub fn new(config: SliderConfig, initial: f64) -> Self {
        Self {
            value: config.quantize(initial),
            config,
            active: false,
            pending: None,
            last_event: None,
            anchor: None,
            last_emitted: None,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn config(&self) -> &SliderConfig {
        &self.config
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.config.debounce = debounce;
    }

    /// True between press and release.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// When the pending value is due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending?;
        let trailing = self.last_event? + self.config.debounce;
        Some(match self.anchor {
            Some(anchor) => trailing.min(anchor + self.config.debounce),
            None => trailing,
        })
    }

    /// Maps a pointer position onto the configured range.
    pub fn project(&self, pos: Pos2, track: &TrackGeometry) -> f64 {
        let fraction = track.fraction_at(pos);
        self.config
            .quantize(self.config.min + fraction * (self.config.max - self.config.min))
    }

    pub fn on_pointer_event(
        &mut self,
        event: PointerEvent,
        track: &TrackGeometry,
        now: Instant,
    ) -> SliderStep {
        match event {
            PointerEvent::Pressed(pos) => {
                self.active = true;
                self.anchor = Some(now);
                self.accept(self.project(pos, track), now);
                SliderStep {
                    value: self.value,
                    emitted: None,
                }
            }
            PointerEvent::Moved(pos) => {
                if self.active {
                    self.accept(self.project(pos, track), now);
                }
                SliderStep {
                    value: self.value,
                    emitted: None,
                }
            }
            PointerEvent::Released(pos) => {
                if !self.active {
                    return SliderStep {
                        value: self.value,
                        emitted: None,
                    };
                }
                if let Some(pos) = pos {
                    self.accept(self.project(pos, track), now);
                }
                self.active = false;
                self.pending = None;
                self.anchor = None;
                SliderStep {
                    value: self.value,
                    emitted: self.emit(self.value),
                }
            }
        }
    }

    /// Emits the pending value once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<f64> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        let value = self.pending.take()?;
        if self.active {
            self.anchor = Some(now);
        }
        self.emit(value)
    }

    /// Adopts a value confirmed elsewhere without emitting it. Ignored mid-gesture.
    pub fn sync_value(&mut self, value: f64) {
        if self.active {
            return;
        }
        let value = self.config.quantize(value);
        self.value = value;
        self.pending = None;
        self.anchor = None;
        self.last_emitted = Some(value);
    }

    fn accept(&mut self, value: f64, now: Instant) {
        self.value = value;
        self.pending = Some(value);
        self.last_event = Some(now);
    }

    fn emit(&mut self, value: f64) -> Option<f64> {
        if self.last_emitted == Some(value) {
            return None;
        }
        self.last_emitted = Some(value);
        log::debug!("slider emitted {value}");
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eframe::egui::{pos2, vec2};

    fn track(length: f32) -> TrackGeometry {
        TrackGeometry::horizontal(Rect::from_min_size(pos2(20.0, 10.0), vec2(length, 8.0)))
    }

    fn model(debounce_ms: u64) -> SliderModel {
        SliderModel::new(
            SliderConfig::new(0.0, 100.0, Duration::from_millis(debounce_ms)).with_step(1.0),
            0.0,
        )
    }

    #[test]
    fn midpoint_maps_to_middle_of_range() {
        let track = track(200.0);
        let slider = model(50);
        assert_eq!(slider.project(pos2(120.0, 14.0), &track), 50.0);
    }

    #[test]
    fn positions_past_either_end_clamp() {
        let track = track(200.0);
        let slider = model(50);
        assert_eq!(slider.project(pos2(20.0, 14.0), &track), 0.0);
        assert_eq!(slider.project(pos2(-500.0, 14.0), &track), 0.0);
        assert_eq!(slider.project(pos2(220.0, 14.0), &track), 100.0);
        assert_eq!(slider.project(pos2(9_000.0, 14.0), &track), 100.0);
    }

    #[test]
    fn custom_range_is_linear() {
        let track = track(100.0);
        let slider = SliderModel::new(
            SliderConfig::new(30.0, 100.0, Duration::ZERO).with_step(1.0),
            100.0,
        );
        assert_eq!(slider.project(pos2(20.0, 0.0), &track), 30.0);
        assert_eq!(slider.project(pos2(70.0, 0.0), &track), 65.0);
    }

    #[test]
    fn rapid_moves_emit_once_with_the_latest_value() {
        let track = track(100.0);
        let mut slider = model(50);
        let t0 = Instant::now();

        slider.on_pointer_event(PointerEvent::Pressed(pos2(30.0, 0.0)), &track, t0);
        slider.on_pointer_event(PointerEvent::Moved(pos2(40.0, 0.0)), &track, t0);
        assert_eq!(slider.poll(t0), None);

        let t1 = t0 + Duration::from_millis(5);
        slider.on_pointer_event(PointerEvent::Moved(pos2(60.0, 0.0)), &track, t1);
        assert_eq!(slider.poll(t1 + Duration::from_millis(10)), None);

        assert_eq!(slider.poll(t1 + Duration::from_millis(50)), Some(40.0));
        assert_eq!(slider.poll(t1 + Duration::from_millis(500)), None);
    }

    #[test]
    fn continuous_drag_emits_at_a_steady_rate() {
        let track = track(100.0);
        let mut slider = model(50);
        let t0 = Instant::now();
        let debounce = Duration::from_millis(50);
        let frame = Duration::from_millis(16);

        slider.on_pointer_event(PointerEvent::Pressed(pos2(20.0, 0.0)), &track, t0);
        let mut emitted = Vec::new();
        for i in 1..=60u32 {
            let at = t0 + frame * i;
            slider.on_pointer_event(PointerEvent::Moved(pos2(20.0 + i as f32, 0.0)), &track, at);
            if let Some(value) = slider.poll(at) {
                emitted.push((at, value));
            }
        }

        assert!(emitted.len() >= 10, "only {} emissions", emitted.len());
        assert!(emitted[0].0 <= t0 + debounce + frame);
        for pair in emitted.windows(2) {
            assert!(pair[1].1 > pair[0].1);
            assert!(pair[1].0 - pair[0].0 <= debounce + frame);
        }
        let (last_at, _) = emitted[emitted.len() - 1];
        assert!(t0 + frame * 60 - last_at <= debounce + frame);
    }

    #[test]
    fn release_flushes_inside_the_debounce_window() {
        let track = track(100.0);
        let mut slider = model(50);
        let t0 = Instant::now();

        slider.on_pointer_event(PointerEvent::Pressed(pos2(30.0, 0.0)), &track, t0);
        let t1 = t0 + Duration::from_millis(5);
        slider.on_pointer_event(PointerEvent::Moved(pos2(80.0, 0.0)), &track, t1);
        let step = slider.on_pointer_event(
            PointerEvent::Released(None),
            &track,
            t1 + Duration::from_millis(1),
        );

        assert_eq!(step.emitted, Some(60.0));
        assert_eq!(slider.value(), 60.0);
        assert!(!slider.is_active());
        assert_eq!(slider.poll(t1 + Duration::from_secs(1)), None);
    }

    #[test]
    fn click_jumps_to_the_pointer() {
        let track = track(100.0);
        let mut slider = model(50);
        let t0 = Instant::now();

        slider.on_pointer_event(PointerEvent::Pressed(pos2(95.0, 0.0)), &track, t0);
        let step =
            slider.on_pointer_event(PointerEvent::Released(Some(pos2(95.0, 0.0))), &track, t0);
        assert_eq!(step.emitted, Some(75.0));
    }

    #[test]
    fn repeated_value_is_not_emitted_again() {
        let track = track(100.0);
        let mut slider = model(0);
        let t0 = Instant::now();

        slider.on_pointer_event(PointerEvent::Pressed(pos2(70.0, 0.0)), &track, t0);
        assert_eq!(slider.poll(t0), Some(50.0));
        slider.on_pointer_event(PointerEvent::Moved(pos2(70.0, 0.0)), &track, t0);
        assert_eq!(slider.poll(t0), None);
        let step = slider.on_pointer_event(PointerEvent::Released(None), &track, t0);
        assert_eq!(step.emitted, None);
    }

    #[test]
    fn moves_without_press_are_ignored() {
        let track = track(100.0);
        let mut slider = model(0);
        let t0 = Instant::now();

        let step = slider.on_pointer_event(PointerEvent::Moved(pos2(90.0, 0.0)), &track, t0);
        assert_eq!(step.value, 0.0);
        assert_eq!(slider.poll(t0), None);
    }

    #[test]
    fn synced_value_suppresses_identical_emission() {
        let track = track(100.0);
        let mut slider = model(0);
        let t0 = Instant::now();
        slider.sync_value(40.0);
        assert_eq!(slider.value(), 40.0);

        slider.on_pointer_event(PointerEvent::Pressed(pos2(60.0, 0.0)), &track, t0);
        assert_eq!(slider.poll(t0), None);
    }

    #[test]
    fn sync_is_ignored_mid_gesture() {
        let track = track(100.0);
        let mut slider = model(50);
        let t0 = Instant::now();
        slider.on_pointer_event(PointerEvent::Pressed(pos2(45.0, 0.0)), &track, t0);
        slider.sync_value(90.0);
        assert_eq!(slider.value(), 25.0);
    }

    #[test]
    fn zero_length_track_yields_min() {
        let slider = model(0);
        let track = track(0.0);
        assert_eq!(slider.project(pos2(50.0, 0.0), &track), 0.0);
    }
}
