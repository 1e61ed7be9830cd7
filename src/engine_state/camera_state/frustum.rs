//! # View Frustum
//!
//! Plane and corner extraction from a view-projection matrix, and the
//! box-versus-frustum test used to skip whole chunks at draw time.
//!
//! The projection maps depth to `[0, 1]` (see
//! [`OPENGL_TO_WGPU_MATRIX`](super::camera::OPENGL_TO_WGPU_MATRIX)), so the
//! near plane is the third matrix row on its own rather than `row3 + row2`.

use cgmath::{InnerSpace, Matrix, Matrix4, Point3, Vector3, Vector4};

const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Six inward-facing planes and eight corners of a view volume.
///
/// A plane `(a, b, c, d)` keeps the points with `a*x + b*y + c*z + d >= 0`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [Vector4<f32>; 6],
    corners: [Point3<f32>; 8],
}

impl Frustum {
    /// Builds the frustum of `projection * view`.
    pub fn new(view_projection: Matrix4<f32>) -> Self {
        let row = |i| view_projection.row(i);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let mut planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r2,      // near
            r3 - r2, // far
        ];
        for plane in planes.iter_mut() {
            let length = plane.truncate().magnitude();
            if length > f32::EPSILON {
                *plane /= length;
            }
        }

        let mut corners = [Point3::new(0.0, 0.0, 0.0); 8];
        let mut i = 0;
        for x in [LEFT, RIGHT] {
            for y in [BOTTOM, TOP] {
                for z in [NEAR, FAR] {
                    corners[i] = intersect(planes[x], planes[y], planes[z]);
                    i += 1;
                }
            }
        }

        Self { planes, corners }
    }

    /// The normalized planes in left, right, bottom, top, near, far order.
    pub fn planes(&self) -> &[Vector4<f32>; 6] {
        &self.planes
    }

    /// The eight corner points.
    pub fn corners(&self) -> &[Point3<f32>; 8] {
        &self.corners
    }

    /// Conservative box test. May report a box near a frustum edge as visible,
    /// never hides a box that intersects the volume.
    pub fn is_visible(&self, aabb_min: Point3<f32>, aabb_max: Point3<f32>) -> bool {
        // Box entirely behind one plane. Testing the corner furthest along
        // the normal is the same as testing all eight.
        for plane in &self.planes {
            let furthest = Vector3::new(
                if plane.x >= 0.0 { aabb_max.x } else { aabb_min.x },
                if plane.y >= 0.0 { aabb_max.y } else { aabb_min.y },
                if plane.z >= 0.0 { aabb_max.z } else { aabb_min.z },
            );
            if plane.truncate().dot(furthest) + plane.w < 0.0 {
                return false;
            }
        }

        // Frustum entirely on one side of the box.
        for axis in 0..3 {
            if self.corners.iter().all(|c| c[axis] > aabb_max[axis])
                || self.corners.iter().all(|c| c[axis] < aabb_min[axis])
            {
                return false;
            }
        }

        true
    }
}

fn intersect(a: Vector4<f32>, b: Vector4<f32>, c: Vector4<f32>) -> Point3<f32> {
    let (na, nb, nc) = (a.truncate(), b.truncate(), c.truncate());
    let bc = nb.cross(nc);
    let denominator = na.dot(bc);
    let point = (bc * a.w + nc.cross(na) * b.w + na.cross(nb) * c.w) / -denominator;
    Point3::new(point.x, point.y, point.z)
}
