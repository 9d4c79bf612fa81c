use ultraviolet::{projection, Mat4, Vec3};

/// What the raygen shader reads: inverse view to place ray origins, inverse
/// projection to un-project pixel coordinates into ray directions.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CameraUniformData {
    pub view_inverse: Mat4,
    pub proj_inverse: Mat4,
}

pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    aspect_ratio: f32,
}

impl Camera {
    const FOV_Y_RADIANS: f32 = 60.0 * std::f32::consts::PI / 180.0;
    const Z_NEAR: f32 = 0.1;
    const Z_FAR: f32 = 512.0;
    const PITCH_LIMIT: f32 = 1.54;

    pub fn new(aspect_ratio: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 2.5),
            yaw: 0.0,
            pitch: 0.0,
            aspect_ratio,
        }
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            -self.yaw.cos() * self.pitch.cos(),
        )
    }

    pub fn right(&self) -> Vec3 {
        Vec3::new(self.yaw.cos(), 0.0, self.yaw.sin())
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.position + self.forward(), Vec3::unit_y())
    }

    pub fn projection_matrix(&self) -> Mat4 {
        projection::perspective_vk(
            Self::FOV_Y_RADIANS,
            self.aspect_ratio,
            Self::Z_NEAR,
            Self::Z_FAR,
        )
    }

    pub fn uniform_data(&self) -> CameraUniformData {
        CameraUniformData {
            view_inverse: self.view_matrix().inversed(),
            proj_inverse: self.projection_matrix().inversed(),
        }
    }

    /// `delta` is in camera-local units: x strafes, y lifts, z moves along
    /// the view direction.
    pub fn advance(&mut self, delta: Vec3) {
        self.position +=
            self.right() * delta.x + Vec3::unit_y() * delta.y + self.forward() * delta.z;
    }

    pub fn rotate(&mut self, yaw_delta: f32, pitch_delta: f32) {
        self.yaw += yaw_delta;
        self.pitch = (self.pitch - pitch_delta).clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }
}
