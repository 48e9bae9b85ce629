use winit::event::{MouseButton, MouseScrollDelta};

/// Pixels of trackpad scroll that count as one wheel notch.
const PIXELS_PER_WHEEL_STEP: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Rotate,
    Pan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerAction {
    Rotate { dx: f32, dy: f32 },
    Pan { dx: f32, dy: f32 },
}

/// Mouse state for orbiting: left drag rotates, right or middle drag pans.
#[derive(Debug, Default, Clone, Copy)]
pub struct PointerInput {
    drag: Option<DragMode>,
    last_position: Option<(f32, f32)>,
}

impl PointerInput {
    pub fn handle_button(&mut self, button: MouseButton, pressed: bool) {
        let mode = match button {
            MouseButton::Left => DragMode::Rotate,
            MouseButton::Right | MouseButton::Middle => DragMode::Pan,
            _ => return,
        };
        if pressed {
            self.drag = Some(mode);
        } else if self.drag == Some(mode) {
            self.drag = None;
        }
    }

    pub fn handle_cursor(&mut self, x: f32, y: f32) -> Option<PointerAction> {
        let previous = self.last_position.replace((x, y));
        let (px, py) = previous?;
        let (dx, dy) = (x - px, y - py);
        match self.drag? {
            DragMode::Rotate => Some(PointerAction::Rotate { dx, dy }),
            DragMode::Pan => Some(PointerAction::Pan { dx, dy }),
        }
    }

    pub fn cursor_left(&mut self) {
        self.last_position = None;
        self.drag = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }
}

/// Positive steps move the camera towards its target.
pub fn wheel_steps(delta: MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y,
        MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_WHEEL_STEP,
    }
}
