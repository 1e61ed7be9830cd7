//! # Camera State Management
//!
//! This module handles all camera-related functionality including:
//! - Camera position and orientation tracking
//! - View and projection matrix calculations
//! - The scripted flight that stands in for player input
//! - Frustum extraction for draw-time culling
//!
//! ## Core Components
//! - `Camera`: Represents the camera's position and orientation in 3D space
//! - `Projection`: Manages the camera's projection matrix
//! - `CameraUniform`: GPU representation of camera data for shaders
//! - `Frustum`: Planes and corners of the view volume
//! - `CameraState`: Camera plus projection driven along a circular path

use cgmath::{Deg, Matrix4, Point3};

use super::config::CameraConfig;

pub mod camera;
pub mod frustum;

/// Name of the GPU buffer used for camera uniform data
pub const CAMERA_BUFFER_NAME: &str = "camera_buffer";

/// A circle around the world origin flown at constant speed and height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightPath {
    /// Circle radius in world units.
    pub radius: f32,
    /// Flight height in world units.
    pub height: f32,
    /// Speed along the circle, world units per second.
    pub speed: f32,
}

impl FlightPath {
    /// Position on the path after `seconds` of flight.
    pub fn position_at(&self, seconds: f32) -> Point3<f32> {
        let angle = self.angle_at(seconds);
        Point3::new(
            self.radius * angle.cos(),
            self.height,
            self.radius * angle.sin(),
        )
    }

    /// Camera on the path after `seconds`, looking along the direction of travel.
    pub fn camera_at(&self, seconds: f32) -> camera::Camera {
        let ahead = self.position_at(seconds + 1.0);
        let position = self.position_at(seconds);
        if (ahead.x - position.x).abs() + (ahead.z - position.z).abs() < f32::EPSILON {
            return camera::Camera::new(position, Deg(0.0), Deg(-20.0));
        }
        camera::Camera::looking_at(position, Point3::new(ahead.x, position.y, ahead.z))
    }

    fn angle_at(&self, seconds: f32) -> f32 {
        if self.radius <= f32::EPSILON {
            return 0.0;
        }
        seconds * self.speed / self.radius
    }
}

/// Manages the camera of the demo: state, projection and the flight that moves it.
///
/// # Fields
/// - `camera`: The current camera state (position, orientation)
/// - `projection`: Perspective settings
/// - `path`: Scripted flight
/// - `elapsed`: Seconds flown so far
pub struct CameraState {
    /// The current camera position and orientation
    pub camera: camera::Camera,
    /// Perspective projection of the render target
    pub projection: camera::Projection,
    /// The scripted flight path
    pub path: FlightPath,
    elapsed: f32,
}

impl CameraState {
    /// Creates the camera at the start of its flight.
    ///
    /// # Arguments
    /// * `config` - Camera section of the engine config
    /// * `width` - Render target width in pixels
    /// * `height` - Render target height in pixels
    pub fn new(config: &CameraConfig, width: u32, height: u32) -> Self {
        let path = FlightPath {
            radius: config.path_radius,
            height: config.height,
            speed: config.speed,
        };
        let projection = camera::Projection::new(
            width,
            height,
            Deg(config.fovy_degrees),
            config.znear,
            config.zfar,
        );

        Self {
            camera: path.camera_at(0.0),
            projection,
            path,
            elapsed: 0.0,
        }
    }

    /// Advances the flight by `delta_seconds`.
    pub fn update(&mut self, delta_seconds: f32) {
        self.elapsed += delta_seconds;
        self.camera = self.path.camera_at(self.elapsed);
    }

    /// Current view matrix.
    pub fn view_matrix(&self) -> Matrix4<f32> {
        self.camera.calc_matrix()
    }

    /// Current projection matrix.
    pub fn projection_matrix(&self) -> Matrix4<f32> {
        self.projection.calc_matrix()
    }

    /// Current eye position, the streaming focal point.
    pub fn position(&self) -> Point3<f32> {
        self.camera.position
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{EuclideanSpace, InnerSpace};

    use super::*;

    #[test]
    fn flight_stays_on_the_circle() {
        let path = FlightPath {
            radius: 50.0,
            height: 10.0,
            speed: 25.0,
        };
        for step in 0..20 {
            let position = path.position_at(step as f32 * 0.37);
            let horizontal = (position.x * position.x + position.z * position.z).sqrt();
            assert!((horizontal - 50.0).abs() < 1e-3);
            assert_eq!(position.y, 10.0);
        }
    }

    #[test]
    fn camera_looks_along_the_direction_of_travel() {
        let path = FlightPath {
            radius: 100.0,
            height: 0.0,
            speed: 1.0,
        };
        let camera = path.camera_at(0.0);
        // Counter-clockwise in xz, so at angle 0 the tangent is +z.
        assert!(camera.get_view_vec().dot(cgmath::Vector3::unit_z()) > 0.99);
    }

    #[test]
    fn update_moves_the_focal_point() {
        let mut state = CameraState::new(&CameraConfig::default(), 640, 480);
        let start = state.position();
        state.update(1.0);
        let moved = (state.position().to_vec() - start.to_vec()).magnitude();
        assert!(moved > 20.0 && moved < 25.0);
    }
}
