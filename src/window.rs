use eframe::egui::{self, ViewportCommand, WindowLevel};
#[cfg(target_os = "windows")]
use raw_window_handle::{HasWindowHandle, RawWindowHandle};

#[cfg(target_os = "windows")]
use windows::Win32::{
    Foundation::{COLORREF, HWND},
    Graphics::Dwm::{DwmSetWindowAttribute, DWMWA_WINDOW_CORNER_PREFERENCE, DWMWCP_ROUND},
    UI::WindowsAndMessaging::{
        GetWindowLongPtrW, SetLayeredWindowAttributes, SetWindowLongPtrW, GWL_EXSTYLE, LWA_ALPHA,
        WS_EX_LAYERED,
    },
};

/// Top-left corner of the window in screen points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowPose {
    pub x: i32,
    pub y: i32,
}

/// Window attributes the core controllers write to.
pub trait WindowAttributes {
    fn apply_alpha(&mut self, alpha: u8);
    fn apply_topmost(&mut self, enabled: bool);
    fn apply_position(&mut self, pose: WindowPose);
}

/// The overlay's own viewport, valid for one frame.
pub struct ViewportWindow<'a> {
    ctx: &'a egui::Context,
    #[cfg(target_os = "windows")]
    hwnd: Option<HWND>,
}

impl<'a> ViewportWindow<'a> {
    pub fn new(ctx: &'a egui::Context, frame: &eframe::Frame) -> Self {
        #[cfg(not(target_os = "windows"))]
        let _ = frame;
        Self {
            ctx,
            #[cfg(target_os = "windows")]
            hwnd: native_handle(frame),
        }
    }
}

impl WindowAttributes for ViewportWindow<'_> {
    #[cfg(target_os = "windows")]
    fn apply_alpha(&mut self, alpha: u8) {
        let Some(hwnd) = self.hwnd else {
            log::warn!("no native window handle, alpha {alpha} not applied");
            return;
        };
        unsafe {
            let style = GetWindowLongPtrW(hwnd, GWL_EXSTYLE);
            let layered = WS_EX_LAYERED.0 as isize;
            if style & layered == 0 {
                SetWindowLongPtrW(hwnd, GWL_EXSTYLE, style | layered);
            }
            if let Err(e) = SetLayeredWindowAttributes(hwnd, COLORREF(0), alpha, LWA_ALPHA) {
                log::warn!("SetLayeredWindowAttributes failed: {e:?}");
            }
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn apply_alpha(&mut self, alpha: u8) {
        log::debug!("window alpha {alpha} is not supported on this platform");
    }

    fn apply_topmost(&mut self, enabled: bool) {
        let level = if enabled {
            WindowLevel::AlwaysOnTop
        } else {
            WindowLevel::Normal
        };
        self.ctx.send_viewport_cmd(ViewportCommand::WindowLevel(level));
    }

    fn apply_position(&mut self, pose: WindowPose) {
        self.ctx.send_viewport_cmd(ViewportCommand::OuterPosition(egui::pos2(
            pose.x as f32,
            pose.y as f32,
        )));
    }
}

#[cfg(target_os = "windows")]
fn native_handle(frame: &eframe::Frame) -> Option<HWND> {
    let window_handle = frame.window_handle().ok()?;
    match window_handle.as_raw() {
        RawWindowHandle::Win32(handle) => Some(HWND(handle.hwnd.get() as *mut std::ffi::c_void)),
        _ => None,
    }
}

/// Asks DWM for rounded corners on the borderless window.
#[cfg(target_os = "windows")]
pub fn apply_rounded_corners(frame: &eframe::Frame) {
    let Some(hwnd) = native_handle(frame) else {
        return;
    };
    let preference = DWMWCP_ROUND;
    unsafe {
        let _ = DwmSetWindowAttribute(
            hwnd,
            DWMWA_WINDOW_CORNER_PREFERENCE,
            &preference as *const _ as *const _,
            std::mem::size_of_val(&preference) as u32,
        );
    }
}

#[cfg(not(target_os = "windows"))]
pub fn apply_rounded_corners(_frame: &eframe::Frame) {}
