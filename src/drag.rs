use crate::window::WindowPose;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    /// Pointer offset from the window's top-left corner at press time.
    Dragging { offset_x: i32, offset_y: i32 },
}

/// Moves the window while the pointer is held inside the drag region.
#[derive(Debug, Default)]
pub struct DragManager {
    state: DragState,
}

impl DragManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Starts a drag if the press landed in the drag region. Returns whether it did.
    pub fn pointer_down(&mut self, pointer: (i32, i32), window: WindowPose, in_region: bool) -> bool {
        if !in_region {
            return false;
        }
        self.state = DragState::Dragging {
            offset_x: pointer.0 - window.x,
            offset_y: pointer.1 - window.y,
        };
        true
    }

    /// New top-left for the window, applied immediately by the caller.
    pub fn pointer_move(&self, pointer: (i32, i32)) -> Option<WindowPose> {
        match self.state {
            DragState::Dragging { offset_x, offset_y } => Some(WindowPose {
                x: pointer.0 - offset_x,
                y: pointer.1 - offset_y,
            }),
            DragState::Idle => None,
        }
    }

    pub fn pointer_up(&mut self) {
        self.state = DragState::Idle;
    }

    /// Focus or capture went away mid-drag.
    pub fn capture_lost(&mut self) {
        if self.is_dragging() {
            log::debug!("drag aborted: pointer capture lost");
        }
        self.state = DragState::Idle;
    }
}
