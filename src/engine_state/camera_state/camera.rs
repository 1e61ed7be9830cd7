//! Yaw/pitch camera, perspective projection and the uniform the quad shader
//! reads. The allocator only ever sees raw view and projection matrices; the
//! eye position used for per-side culling is recovered from the view matrix.

use cgmath::*;
use std::f32::consts::FRAC_PI_2;

/// Transformation matrix to convert from OpenGL's coordinate system to WGPU's.
///
/// WGPU's normalized device coordinates range from -1 to 1 in X and Y, and
/// 0 to 1 in Z. This matrix scales Z from [-1, 1] to [-0.5, 0.5] and then
/// translates it to [0, 1].
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,  // Scale Z from [-1,1] to [-0.5,0.5]
    0.0, 0.0, 0.5, 1.0,  // Translate Z from [-0.5,0.5] to [0,1]
);

/// Safe limit for pitch to prevent gimbal lock
const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

/// Eye position plus yaw and pitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Eye position.
    pub position: Point3<f32>,
    /// Rotation about +y, zero looking down +x.
    pub yaw: Rad<f32>,
    /// Elevation above the xz plane.
    pub pitch: Rad<f32>,
}

impl Camera {
    /// Pitch is clamped just short of straight up or down.
    ///
    /// # Example
    /// ```rust
    /// use cgmath::{Deg, Point3};
    /// use voxel_streamer::engine_state::camera_state::camera::Camera;
    ///
    /// let camera = Camera::new(Point3::new(0.0, 0.0, 0.0), Deg(0.0), Deg(0.0));
    /// assert!((camera.get_view_vec().x - 1.0).abs() < 1e-6);
    /// ```
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        let pitch: Rad<f32> = pitch.into();
        Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: Rad(pitch.0.clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2)),
        }
    }

    /// A camera at `position` turned towards `target`.
    pub fn looking_at(position: Point3<f32>, target: Point3<f32>) -> Self {
        let direction = target - position;
        let yaw = Rad(direction.z.atan2(direction.x));
        let horizontal = (direction.x * direction.x + direction.z * direction.z).sqrt();
        let pitch = Rad(direction.y.atan2(horizontal));
        Self::new(position, yaw, pitch)
    }

    /// Gets the camera's normalized forward direction vector.
    pub fn get_view_vec(&self) -> cgmath::Vector3<f32> {
        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.0.sin_cos();
        Vector3::new(pitch_cos * yaw_cos, pitch_sin, pitch_cos * yaw_sin).normalize()
    }

    /// Right-handed world to view transform.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.get_view_vec(), Vector3::unit_y())
    }
}

/// Perspective parameters of the render target.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    /// A projection for a `width` x `height` target. A zero height is
    /// treated as one pixel.
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        let fovy: Rad<f32> = fovy.into();
        Self {
            aspect,
            fovy,
            znear,
            zfar,
        }
    }

    /// Follows a new target size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// Perspective matrix with depth mapped to wgpu's `[0, 1]`.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Camera block of the quad shader, binding 0. 144 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    view_proj_inverse: [[f32; 4]; 4],
    position: [f32; 4],
}

impl CameraUniform {
    /// Identity matrices, eye at the origin.
    pub fn new() -> Self {
        Self {
            view_proj: cgmath::Matrix4::identity().into(),
            view_proj_inverse: cgmath::Matrix4::identity().into(),
            position: [0.0, 0.0, 0.0, 0.0],
        }
    }

    /// Fills the uniform from raw view and projection matrices.
    ///
    /// The eye position is recovered from the inverse view matrix. A singular
    /// matrix leaves the corresponding field at identity or origin.
    pub fn from_matrices(view: Matrix4<f32>, projection: Matrix4<f32>) -> Self {
        let view_proj = projection * view;
        let position = eye_position(view);
        Self {
            view_proj: view_proj.into(),
            view_proj_inverse: view_proj
                .invert()
                .unwrap_or_else(Matrix4::identity)
                .into(),
            position: [position.x, position.y, position.z, 1.0],
        }
    }

    /// Refills the uniform from a camera and its projection.
    pub fn update_view_proj_and_pos(&mut self, camera: &Camera, projection: &Projection) {
        *self = Self::from_matrices(camera.calc_matrix(), projection.calc_matrix());
    }

    /// World-space eye position stored in the uniform.
    pub fn position(&self) -> Point3<f32> {
        Point3::new(self.position[0], self.position[1], self.position[2])
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// The world-space position a view matrix looks from.
pub fn eye_position(view: Matrix4<f32>) -> Point3<f32> {
    view.invert()
        .map(|inverse| Point3::from_vec(inverse.w.truncate()))
        .unwrap_or_else(Point3::origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eye_position_recovers_camera_position() {
        let camera = Camera::new(Point3::new(3.0, -7.0, 12.5), Deg(40.0), Deg(-20.0));
        let eye = eye_position(camera.calc_matrix());
        assert!((eye - camera.position).magnitude() < 1e-3);
    }

    #[test]
    fn looking_at_faces_the_target() {
        let camera = Camera::looking_at(Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 10.0, 10.0));
        let forward = camera.get_view_vec();
        assert!((forward - Vector3::new(0.0, 1.0, 1.0).normalize()).magnitude() < 1e-4);
    }

    #[test]
    fn uniform_carries_the_eye_position() {
        let camera = Camera::new(Point3::new(1.0, 2.0, 3.0), Deg(0.0), Deg(0.0));
        let projection = Projection::new(16, 9, Deg(70.0), 0.1, 100.0);
        let mut uniform = CameraUniform::new();
        uniform.update_view_proj_and_pos(&camera, &projection);
        assert!((uniform.position() - camera.position).magnitude() < 1e-4);
    }
}
