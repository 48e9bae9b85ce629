use glam::{Mat4, Vec3};

/// Keeps the polar angle away from the poles so `look_at` stays well defined.
const POLAR_EPSILON: f32 = 1e-4;
const SETTLE_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    target: Vec3,
    projection: Mat4,
}

impl PerspectiveCamera {
    pub fn new(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            position: Vec3::ZERO,
            fov_y_degrees,
            aspect,
            near,
            far,
            target: Vec3::NEG_Z,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection();
        camera
    }

    /// Recompute the cached projection after changing fov, aspect or clip planes.
    pub fn update_projection(&mut self) {
        let aspect = if self.aspect.is_finite() && self.aspect > 0.0 {
            self.aspect
        } else {
            1.0
        };
        self.projection =
            Mat4::perspective_rh(self.fov_y_degrees.to_radians(), aspect, self.near, self.far);
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    #[cfg(test)]
    pub fn target(&self) -> Vec3 {
        self.target
    }

    #[cfg(test)]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view_matrix()
    }

    /// Forward, right and up unit vectors.
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = (self.target - self.position)
            .try_normalize()
            .unwrap_or(Vec3::NEG_Z);
        let right = forward.cross(Vec3::Y).try_normalize().unwrap_or(Vec3::X);
        let up = right.cross(forward);
        (forward, right, up)
    }
}

/// Damped orbit around `target`. Input accumulates deltas; [`OrbitControls::update`]
/// applies a fraction of them each frame and decays the rest.
#[derive(Debug, Clone, Copy)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub pan_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    theta_delta: f32,
    phi_delta: f32,
    pan_offset: Vec3,
    scale: f32,
}

impl OrbitControls {
    pub fn new(target: Vec3) -> Self {
        Self {
            target,
            enable_damping: false,
            damping_factor: 0.05,
            rotate_speed: 1.0,
            pan_speed: 1.0,
            zoom_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            theta_delta: 0.0,
            phi_delta: 0.0,
            pan_offset: Vec3::ZERO,
            scale: 1.0,
        }
    }

    /// Pointer drag in physical pixels; a drag across the full height turns one revolution.
    pub fn rotate(&mut self, dx: f32, dy: f32, viewport_height: f32) {
        let height = viewport_height.max(1.0);
        let tau = std::f32::consts::TAU;
        self.theta_delta -= tau * dx / height * self.rotate_speed;
        self.phi_delta -= tau * dy / height * self.rotate_speed;
    }

    /// Pointer drag in physical pixels; moves the target in the camera's view plane.
    pub fn pan(&mut self, dx: f32, dy: f32, viewport_height: f32, camera: &PerspectiveCamera) {
        let height = viewport_height.max(1.0);
        let distance = (camera.position - self.target).length()
            * (camera.fov_y_degrees.to_radians() * 0.5).tan();
        let (_, right, up) = camera.basis();
        self.pan_offset -= right * (2.0 * dx * distance / height) * self.pan_speed;
        self.pan_offset += up * (2.0 * dy * distance / height) * self.pan_speed;
    }

    /// Positive steps move the camera towards the target.
    pub fn dolly(&mut self, steps: f32) {
        self.scale *= 0.95f32.powf(steps * self.zoom_speed);
    }

    /// Advance one step and move `camera`. Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let previous = camera.position;
        let offset = camera.position - self.target;
        let mut radius = offset.length();
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = if radius > 0.0 {
            (offset.y / radius).clamp(-1.0, 1.0).acos()
        } else {
            std::f32::consts::FRAC_PI_2
        };

        let step = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };
        theta += self.theta_delta * step;
        phi = (phi + self.phi_delta * step)
            .clamp(POLAR_EPSILON, std::f32::consts::PI - POLAR_EPSILON);
        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);
        self.target += self.pan_offset * step;

        let sin_phi = phi.sin();
        let offset = Vec3::new(
            radius * sin_phi * theta.sin(),
            radius * phi.cos(),
            radius * sin_phi * theta.cos(),
        );
        camera.position = self.target + offset;
        camera.look_at(self.target);

        if self.enable_damping {
            let keep = 1.0 - self.damping_factor;
            self.theta_delta *= keep;
            self.phi_delta *= keep;
            self.pan_offset *= keep;
        } else {
            self.theta_delta = 0.0;
            self.phi_delta = 0.0;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;

        camera.position.distance_squared(previous) > SETTLE_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::{OrbitControls, PerspectiveCamera};
    use glam::Vec3;

    fn demo_camera() -> (PerspectiveCamera, OrbitControls) {
        let mut camera = PerspectiveCamera::new(75.0, 16.0 / 9.0, 0.1, 100.0);
        camera.position = Vec3::new(4.0, 5.0, 4.0);
        let mut controls = OrbitControls::new(Vec3::new(0.0, 3.5, 0.0));
        controls.enable_damping = true;
        controls.update(&mut camera);
        (camera, controls)
    }

    #[test]
    fn idle_update_keeps_camera_in_place() {
        let (mut camera, mut controls) = demo_camera();
        let before = camera.position;
        assert!(!controls.update(&mut camera));
        assert!((camera.position - before).length() < 1e-4);
        assert_eq!(camera.target(), Vec3::new(0.0, 3.5, 0.0));
    }

    #[test]
    fn damped_rotation_converges_and_preserves_distance() {
        let (mut camera, mut controls) = demo_camera();
        let distance = (camera.position - controls.target).length();
        controls.rotate(200.0, 0.0, 720.0);

        let mut moved_frames = 0;
        for _ in 0..1000 {
            if controls.update(&mut camera) {
                moved_frames += 1;
            }
        }
        assert!(moved_frames > 1);
        assert!(!controls.update(&mut camera));
        assert!(camera.position.is_finite());
        assert!(((camera.position - controls.target).length() - distance).abs() < 1e-3);
    }

    #[test]
    fn undamped_rotation_applies_in_one_step() {
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0);
        camera.position = Vec3::new(0.0, 0.0, 5.0);
        let mut controls = OrbitControls::new(Vec3::ZERO);
        controls.rotate(-180.0, 0.0, 720.0);
        assert!(controls.update(&mut camera));
        // A quarter revolution around +Y from +Z lands on +X.
        assert!((camera.position - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-3);
        assert!(!controls.update(&mut camera));
    }

    #[test]
    fn polar_angle_is_clamped() {
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0);
        camera.position = Vec3::new(0.0, 0.0, 5.0);
        let mut controls = OrbitControls::new(Vec3::ZERO);
        controls.rotate(0.0, 10_000.0, 720.0);
        controls.update(&mut camera);
        assert!(camera.position.is_finite());
        assert!(camera.position.y > 4.99);
        assert!(camera.view_matrix().is_finite());
    }

    #[test]
    fn dolly_and_pan_move_camera() {
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0);
        camera.position = Vec3::new(0.0, 0.0, 10.0);
        let mut controls = OrbitControls::new(Vec3::ZERO);
        controls.dolly(2.0);
        controls.update(&mut camera);
        assert!(camera.position.z < 10.0);

        controls.pan(100.0, 0.0, 720.0, &camera);
        controls.update(&mut camera);
        assert!(controls.target.x < 0.0);
        assert!((camera.target() - controls.target).length() < 1e-6);
    }

    #[test]
    fn projection_follows_aspect() {
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0);
        let square = camera.projection_matrix();
        camera.aspect = 2.0;
        camera.update_projection();
        let wide = camera.projection_matrix();
        assert!((square.x_axis.x / wide.x_axis.x - 2.0).abs() < 1e-4);
    }
}
