use crate::render::camera::{OrbitControls, PerspectiveCamera};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where a tick sends its one frame, and how it asks for the next.
pub trait FrameTarget {
    type Error;

    fn render_frame(&mut self, camera: &PerspectiveCamera) -> Result<(), Self::Error>;
    fn schedule_next_frame(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered { camera_moved: bool },
    Stopped,
}

/// Per-frame driver: one controls step, one render, one reschedule. Runs until the stop
/// flag is raised.
#[derive(Debug, Clone, Default)]
pub struct RenderLoop {
    stop: Arc<AtomicBool>,
    frames: u64,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared flag; setting it from anywhere stops the loop at the next tick.
    #[cfg(test)]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn tick<T: FrameTarget>(
        &mut self,
        controls: &mut OrbitControls,
        camera: &mut PerspectiveCamera,
        target: &mut T,
    ) -> Result<TickOutcome, T::Error> {
        if self.is_stopped() {
            return Ok(TickOutcome::Stopped);
        }
        let camera_moved = controls.update(camera);
        target.render_frame(camera)?;
        target.schedule_next_frame();
        self.frames += 1;
        Ok(TickOutcome::Rendered { camera_moved })
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameTarget, RenderLoop, TickOutcome};
    use crate::render::camera::{OrbitControls, PerspectiveCamera};
    use glam::Vec3;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct CountingTarget {
        renders: usize,
        schedules: usize,
        fail_on: Option<usize>,
    }

    impl FrameTarget for CountingTarget {
        type Error = String;

        fn render_frame(&mut self, camera: &PerspectiveCamera) -> Result<(), String> {
            assert!(camera.position.is_finite());
            if self.fail_on == Some(self.renders) {
                return Err("device lost".to_string());
            }
            self.renders += 1;
            Ok(())
        }

        fn schedule_next_frame(&mut self) {
            self.schedules += 1;
        }
    }

    fn camera_and_controls() -> (PerspectiveCamera, OrbitControls) {
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0);
        camera.position = Vec3::new(4.0, 5.0, 4.0);
        let mut controls = OrbitControls::new(Vec3::new(0.0, 3.5, 0.0));
        controls.enable_damping = true;
        (camera, controls)
    }

    #[test]
    fn n_ticks_render_and_schedule_n_times() {
        let (mut camera, mut controls) = camera_and_controls();
        let mut target = CountingTarget::default();
        let mut render_loop = RenderLoop::new();
        for _ in 0..25 {
            let outcome = render_loop.tick(&mut controls, &mut camera, &mut target).unwrap();
            assert!(matches!(outcome, TickOutcome::Rendered { .. }));
        }
        assert_eq!(target.renders, 25);
        assert_eq!(target.schedules, 25);
        assert_eq!(render_loop.frames(), 25);
    }

    #[test]
    fn stop_flag_ends_the_loop() {
        let (mut camera, mut controls) = camera_and_controls();
        let mut target = CountingTarget::default();
        let mut render_loop = RenderLoop::new();
        render_loop.tick(&mut controls, &mut camera, &mut target).unwrap();

        render_loop.stop_handle().store(true, Ordering::Release);
        let outcome = render_loop.tick(&mut controls, &mut camera, &mut target).unwrap();
        assert_eq!(outcome, TickOutcome::Stopped);
        assert_eq!(target.renders, 1);
        assert_eq!(target.schedules, 1);
        assert!(render_loop.is_stopped());
    }

    #[test]
    fn render_failure_skips_scheduling() {
        let (mut camera, mut controls) = camera_and_controls();
        let mut target = CountingTarget {
            fail_on: Some(2),
            ..CountingTarget::default()
        };
        let mut render_loop = RenderLoop::new();
        render_loop.tick(&mut controls, &mut camera, &mut target).unwrap();
        render_loop.tick(&mut controls, &mut camera, &mut target).unwrap();
        let err = render_loop
            .tick(&mut controls, &mut camera, &mut target)
            .unwrap_err();
        assert_eq!(err, "device lost");
        assert_eq!(target.schedules, 2);
        assert_eq!(render_loop.frames(), 2);
    }

    #[test]
    fn ticks_advance_damped_rotation() {
        let (mut camera, mut controls) = camera_and_controls();
        let mut target = CountingTarget::default();
        let mut render_loop = RenderLoop::new();
        render_loop.tick(&mut controls, &mut camera, &mut target).unwrap();
        let start = camera.position;
        controls.rotate(300.0, 0.0, 720.0);
        let outcome = render_loop.tick(&mut controls, &mut camera, &mut target).unwrap();
        assert_eq!(outcome, TickOutcome::Rendered { camera_moved: true });
        assert!(camera.position.distance(start) > 1e-3);
    }
}
