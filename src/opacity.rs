use crate::window::WindowAttributes;

pub const OPACITY_MIN: i32 = 30;
pub const OPACITY_MAX: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpacityState {
    pub percent: i32,
}

#[derive(Debug)]
pub struct OpacityController {
    state: OpacityState,
}

impl OpacityController {
    pub fn new(percent: i32) -> Self {
        Self {
            state: OpacityState {
                percent: percent.clamp(OPACITY_MIN, OPACITY_MAX),
            },
        }
    }

    pub fn state(&self) -> OpacityState {
        self.state
    }

    /// Clamps into 30..=100 regardless of what the caller already did.
    pub fn set_opacity(&mut self, percent: i32, window: &mut dyn WindowAttributes) -> OpacityState {
        let percent = percent.clamp(OPACITY_MIN, OPACITY_MAX);
        window.apply_alpha(percent_to_alpha(percent));
        self.state = OpacityState { percent };
        self.state
    }

    /// Re-applies the current state, e.g. once the native window exists.
    pub fn reapply(&self, window: &mut dyn WindowAttributes) {
        window.apply_alpha(percent_to_alpha(self.state.percent));
    }
}

/// 100% maps to 255, 30% to 77.
pub fn percent_to_alpha(percent: i32) -> u8 {
    let percent = percent.clamp(OPACITY_MIN, OPACITY_MAX);
    ((percent as f32 / 100.0) * 255.0).round() as u8
}
