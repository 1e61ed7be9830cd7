//! # Block Side Module
//!
//! This module defines the six faces of a voxel block, their axes and normals,
//! and the per-face-group visibility test used when drawing.

use cgmath::{Point3, Vector3};

/// Represents the six possible faces of a voxel block.
///
/// The discriminant indexes the six per-side quad lists produced by the mesher
/// and the six indirect draw commands each mesh handle owns.
///
/// The order is: [FRONT, BACK, BOTTOM, TOP, LEFT, RIGHT]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BlockSide {
    /// The front face (facing positive Z)
    FRONT = 0,

    /// The back face (facing negative Z)
    BACK = 1,

    /// The bottom face (facing negative Y)
    BOTTOM = 2,

    /// The top face (facing positive Y)
    TOP = 3,

    /// The left face (facing negative X)
    LEFT = 4,

    /// The right face (facing positive X)
    RIGHT = 5,
}

impl BlockSide {
    /// Returns an array containing all six block faces in discriminant order.
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::FRONT,
            BlockSide::BACK,
            BlockSide::BOTTOM,
            BlockSide::TOP,
            BlockSide::LEFT,
            BlockSide::RIGHT,
        ]
    }

    /// Decodes the 3-bit orientation stored in a packed quad.
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(BlockSide::FRONT),
            1 => Some(BlockSide::BACK),
            2 => Some(BlockSide::BOTTOM),
            3 => Some(BlockSide::TOP),
            4 => Some(BlockSide::LEFT),
            5 => Some(BlockSide::RIGHT),
            _ => None,
        }
    }

    /// The face looking along `axis` (0 = X, 1 = Y, 2 = Z) in the given direction.
    pub fn from_axis(axis: usize, positive: bool) -> Self {
        match (axis, positive) {
            (0, true) => BlockSide::RIGHT,
            (0, false) => BlockSide::LEFT,
            (1, true) => BlockSide::TOP,
            (1, false) => BlockSide::BOTTOM,
            (_, true) => BlockSide::FRONT,
            (_, false) => BlockSide::BACK,
        }
    }

    /// The axis this face is perpendicular to (0 = X, 1 = Y, 2 = Z).
    pub fn axis(self) -> usize {
        match self {
            BlockSide::LEFT | BlockSide::RIGHT => 0,
            BlockSide::BOTTOM | BlockSide::TOP => 1,
            BlockSide::BACK | BlockSide::FRONT => 2,
        }
    }

    /// Whether the face normal points along the positive axis direction.
    pub fn is_positive(self) -> bool {
        matches!(self, BlockSide::RIGHT | BlockSide::TOP | BlockSide::FRONT)
    }

    /// The integer step from a voxel to the neighbour this face looks at.
    pub fn offset(self) -> [i32; 3] {
        let mut offset = [0; 3];
        offset[self.axis()] = if self.is_positive() { 1 } else { -1 };
        offset
    }

    /// Unit normal of the face.
    pub fn normal(self) -> Vector3<f32> {
        let [x, y, z] = self.offset();
        Vector3::new(x as f32, y as f32, z as f32)
    }

    /// Determines whether any face of this orientation inside the box could
    /// face the camera.
    ///
    /// A face with normal `n` at point `p` is front-facing when
    /// `(camera - p) · n > 0`. Over an axis-aligned box this reduces to a
    /// single comparison against the box's extent along the face axis, so the
    /// test is exact for the whole group and never culls a visible face.
    ///
    /// # Arguments
    /// * `camera` - Camera position in world space
    /// * `aabb_min` - Minimum corner of the chunk bounds
    /// * `aabb_max` - Maximum corner of the chunk bounds
    pub fn faces_camera(
        self,
        camera: Point3<f32>,
        aabb_min: Point3<f32>,
        aabb_max: Point3<f32>,
    ) -> bool {
        let axis = self.axis();
        if self.is_positive() {
            camera[axis] > aabb_min[axis]
        } else {
            camera[axis] < aabb_max[axis]
        }
    }
}
