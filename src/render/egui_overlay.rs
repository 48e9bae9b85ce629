/// Tessellated UI for one frame, as produced by the egui host.
pub struct EguiFrameOutput {
    pub clipped_primitives: Vec<egui::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
    pub screen_size_px: [u32; 2],
}

/// Draws egui on top of the finished scene, straight into the swap chain image.
pub struct EguiOverlay {
    renderer: egui_wgpu::Renderer,
}

impl EguiOverlay {
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat) -> Self {
        Self {
            renderer: egui_wgpu::Renderer::new(device, output_format, None, 1, false),
        }
    }

    /// Uploads texture changes and vertex data. The returned command buffers must be
    /// submitted before the encoder that paints.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        frame: &EguiFrameOutput,
        screen: &egui_wgpu::ScreenDescriptor,
    ) -> Vec<wgpu::CommandBuffer> {
        for (id, delta) in &frame.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        self.renderer
            .update_buffers(device, queue, encoder, &frame.clipped_primitives, screen)
    }

    pub fn paint(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        frame: &EguiFrameOutput,
        screen: &egui_wgpu::ScreenDescriptor,
    ) {
        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("egui_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        let mut pass = pass.forget_lifetime();
        self.renderer
            .render(&mut pass, &frame.clipped_primitives, screen);
    }

    /// Releases textures egui no longer needs. Call after the frame is submitted.
    pub fn finish(&mut self, frame: &EguiFrameOutput) {
        for id in &frame.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }
}

/// egui lays out in window pixels; the surface may be smaller when the pixel ratio is
/// clamped, so points are rescaled to the surface.
pub fn screen_descriptor(
    frame: &EguiFrameOutput,
    surface_width: u32,
    surface_height: u32,
) -> egui_wgpu::ScreenDescriptor {
    let window_width = frame.screen_size_px[0].max(1) as f32;
    egui_wgpu::ScreenDescriptor {
        size_in_pixels: [surface_width, surface_height],
        pixels_per_point: frame.pixels_per_point * surface_width as f32 / window_width,
    }
}

#[cfg(test)]
mod tests {
    use super::{screen_descriptor, EguiFrameOutput};

    fn frame(pixels_per_point: f32, screen_size_px: [u32; 2]) -> EguiFrameOutput {
        EguiFrameOutput {
            clipped_primitives: Vec::new(),
            textures_delta: egui::TexturesDelta::default(),
            pixels_per_point,
            screen_size_px,
        }
    }

    #[test]
    fn matching_surface_keeps_egui_scale() {
        let screen = screen_descriptor(&frame(2.0, [2560, 1440]), 2560, 1440);
        assert_eq!(screen.size_in_pixels, [2560, 1440]);
        assert_eq!(screen.pixels_per_point, 2.0);
    }

    #[test]
    fn clamped_surface_shrinks_points() {
        // 3x display drawn at 2x.
        let screen = screen_descriptor(&frame(3.0, [3000, 1500]), 2000, 1000);
        assert!((screen.pixels_per_point - 2.0).abs() < 1e-6);
    }
}
