use crate::render::camera::PerspectiveCamera;

/// Upper bound on the pixel ratio the renderer draws at.
pub const MAX_PIXEL_RATIO: f32 = 2.0;

/// Receives output size changes. Implemented by the GPU renderer.
pub trait OutputSurface {
    /// Size in logical pixels; the drawing buffer is this times the pixel ratio.
    fn set_size(&mut self, width: u32, height: u32);
    fn set_pixel_ratio(&mut self, pixel_ratio: f32);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f32,
}

impl ViewportSize {
    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    pub fn pixel_ratio(&self) -> f32 {
        clamp_pixel_ratio(self.device_pixel_ratio)
    }

    /// Drawing-buffer size in physical pixels.
    pub fn buffer_size(&self) -> (u32, u32) {
        let ratio = self.pixel_ratio();
        (
            ((self.width.max(1) as f32 * ratio).round() as u32).max(1),
            ((self.height.max(1) as f32 * ratio).round() as u32).max(1),
        )
    }
}

pub fn clamp_pixel_ratio(device_pixel_ratio: f32) -> f32 {
    if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
        device_pixel_ratio.min(MAX_PIXEL_RATIO)
    } else {
        1.0
    }
}

/// Applies every size notification immediately; nothing is coalesced.
#[derive(Debug, Clone)]
pub struct ResizeManager {
    size: ViewportSize,
}

impl ResizeManager {
    pub fn new(width: u32, height: u32, device_pixel_ratio: f32) -> Self {
        Self {
            size: ViewportSize {
                width: width.max(1),
                height: height.max(1),
                device_pixel_ratio,
            },
        }
    }

    pub fn size(&self) -> ViewportSize {
        self.size
    }

    pub fn handle_resize(
        &mut self,
        width: u32,
        height: u32,
        device_pixel_ratio: f32,
        camera: &mut PerspectiveCamera,
        surface: &mut dyn OutputSurface,
    ) -> ViewportSize {
        self.size = ViewportSize {
            width: width.max(1),
            height: height.max(1),
            device_pixel_ratio,
        };
        camera.aspect = self.size.aspect();
        camera.update_projection();
        surface.set_size(self.size.width, self.size.height);
        surface.set_pixel_ratio(self.size.pixel_ratio());
        log::debug!(
            "Viewport {}x{} @ {:.2} (device {:.2})",
            self.size.width,
            self.size.height,
            self.size.pixel_ratio(),
            device_pixel_ratio
        );
        self.size
    }
}
