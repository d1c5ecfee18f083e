use crate::window::WindowAttributes;

/// Pins the window above others.
///
/// The window-manager call is assumed to succeed; there is no OS feedback to
/// confirm the new z-order, so the local flag is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopmostToggle {
    enabled: bool,
}

impl TopmostToggle {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn toggle(&mut self, window: &mut dyn WindowAttributes) -> bool {
        self.set(!self.enabled, window)
    }

    pub fn set(&mut self, enabled: bool, window: &mut dyn WindowAttributes) -> bool {
        self.enabled = enabled;
        window.apply_topmost(enabled);
        log::debug!("always on top: {enabled}");
        enabled
    }
}
