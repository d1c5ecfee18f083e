/// Horizontal scroll state for a label wider than its slot.
#[derive(Debug, Clone)]
pub struct Marquee {
    offset: f32,
    speed: f32,
    gap: f32,
    pause_secs: f32,
    paused_for: f32,
}

impl Marquee {
    pub fn new() -> Self {
        // 2 px every 30 ms, then a 2 s rest after each full lap.
        Self {
            offset: 0.0,
            speed: 2.0 / 0.030,
            gap: 60.0,
            pause_secs: 2.0,
            paused_for: 0.0,
        }
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn gap(&self) -> f32 {
        self.gap
    }

    pub fn reset(&mut self) {
        self.offset = 0.0;
        self.paused_for = 0.0;
    }

    /// Returns true while the text is scrolling and needs repaints.
    pub fn advance(&mut self, dt: f32, text_width: f32, slot_width: f32) -> bool {
        if text_width <= slot_width {
            self.reset();
            return false;
        }
        if dt <= 0.0 {
            return true;
        }
        if self.paused_for > 0.0 {
            self.paused_for = (self.paused_for - dt).max(0.0);
            return true;
        }
        self.offset += self.speed * dt;
        if self.offset > text_width + self.gap {
            self.offset = 0.0;
            self.paused_for = self.pause_secs;
        }
        true
    }
}
