use glam::{Mat4, Vec3};

/// Camera circling the origin at a fixed height.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub radius: f32,
    pub height: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            radius: 6.0,
            height: 3.0,
            fov_y: 50f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

impl OrbitCamera {
    pub fn eye(&self, angle: f32) -> Vec3 {
        Vec3::new(self.radius * angle.cos(), self.height, self.radius * angle.sin())
    }

    /// Projection * view for the given orbit angle (radians).
    pub fn view_projection(&self, angle: f32, aspect: f32) -> Mat4 {
        let proj = Mat4::perspective_rh(self.fov_y, aspect.max(1e-3), self.near, self.far);
        let view = Mat4::look_at_rh(self.eye(angle), Vec3::ZERO, Vec3::Y);
        proj * view
    }
}
