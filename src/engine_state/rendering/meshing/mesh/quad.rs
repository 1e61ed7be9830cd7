//! Packed quad encoding.
//!
//! A quad is the mesher's unit of output and the face buffer's unit of
//! storage: one axis-aligned rectangle of identical faces, packed into two
//! 32-bit words so the vertex shader can pull it straight out of a storage
//! buffer.
//!
//! ```text
//! lo: x:6 | y:6 | z:6 | (size_u - 1):6 | (size_v - 1):6
//! hi: orientation:3 | texture:16 | ao:8
//! ```
//!
//! `x, y, z` is the local position of the voxel owning the rectangle's
//! minimum corner. `size_u` runs along axis `(d + 1) % 3` and `size_v` along
//! `(d + 2) % 3`, where `d` is the axis the face looks along.

use crate::engine_state::voxels::block::block_side::BlockSide;

/// Texture id used when a block face's texture failed to load.
pub const MISSING_TEXTURE: u16 = u16::MAX;

/// AO bits meaning "no corner occluded" (four corners at level 3).
pub const AO_UNOCCLUDED: u8 = 0xFF;

const FIELD_BITS: u32 = 6;
const FIELD_MASK: u32 = (1 << FIELD_BITS) - 1;
const ORIENTATION_MASK: u32 = 0b111;
const TEXTURE_SHIFT: u32 = 3;
const AO_SHIFT: u32 = 19;

/// Largest coordinate or extent a packed quad can carry.
pub const MAX_QUAD_EXTENT: u32 = 1 << FIELD_BITS;

/// A quad as the GPU sees it.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PackedQuad {
    lo: u32,
    hi: u32,
}

/// The unpacked form of a [`PackedQuad`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Quad {
    /// Local x of the owning voxel.
    pub x: u32,
    /// Local y of the owning voxel.
    pub y: u32,
    /// Local z of the owning voxel.
    pub z: u32,
    /// Extent along the first in-plane axis, at least 1.
    pub size_u: u32,
    /// Extent along the second in-plane axis, at least 1.
    pub size_v: u32,
    /// Which way the face looks.
    pub side: BlockSide,
    /// Texture layer.
    pub texture: u16,
    /// Four 2-bit corner occlusion levels.
    pub ao: u8,
}

impl Quad {
    /// Packs the quad. Fields out of range are a caller bug.
    pub fn pack(&self) -> PackedQuad {
        debug_assert!(self.x < MAX_QUAD_EXTENT && self.y < MAX_QUAD_EXTENT && self.z < MAX_QUAD_EXTENT);
        debug_assert!((1..=MAX_QUAD_EXTENT).contains(&self.size_u));
        debug_assert!((1..=MAX_QUAD_EXTENT).contains(&self.size_v));

        let lo = self.x
            | self.y << FIELD_BITS
            | self.z << (2 * FIELD_BITS)
            | (self.size_u - 1) << (3 * FIELD_BITS)
            | (self.size_v - 1) << (4 * FIELD_BITS);
        let hi = self.side as u32
            | (self.texture as u32) << TEXTURE_SHIFT
            | (self.ao as u32) << AO_SHIFT;
        PackedQuad { lo, hi }
    }

    /// Every voxel face the rectangle covers, as local voxel positions.
    pub fn cells(&self) -> impl Iterator<Item = [i32; 3]> + '_ {
        let axis = self.side.axis();
        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;
        let base = [self.x as i32, self.y as i32, self.z as i32];

        (0..self.size_u as i32).flat_map(move |a| {
            (0..self.size_v as i32).map(move |b| {
                let mut cell = base;
                cell[u] += a;
                cell[v] += b;
                cell
            })
        })
    }
}

impl PackedQuad {
    /// Unpacks the quad.
    ///
    /// # Returns
    /// `None` if the orientation bits do not name a face, which only happens
    /// for words that were never produced by [`Quad::pack`].
    pub fn unpack(&self) -> Option<Quad> {
        let side = BlockSide::from_index(self.hi & ORIENTATION_MASK)?;
        Some(Quad {
            x: self.lo & FIELD_MASK,
            y: (self.lo >> FIELD_BITS) & FIELD_MASK,
            z: (self.lo >> (2 * FIELD_BITS)) & FIELD_MASK,
            size_u: ((self.lo >> (3 * FIELD_BITS)) & FIELD_MASK) + 1,
            size_v: ((self.lo >> (4 * FIELD_BITS)) & FIELD_MASK) + 1,
            side,
            texture: ((self.hi >> TEXTURE_SHIFT) & 0xFFFF) as u16,
            ao: (self.hi >> AO_SHIFT) as u8,
        })
    }

    /// Raw words, low first.
    pub fn words(&self) -> [u32; 2] {
        [self.lo, self.hi]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extreme_fields_survive_packing() {
        let quad = Quad {
            x: 63,
            y: 0,
            z: 31,
            size_u: 64,
            size_v: 1,
            side: BlockSide::RIGHT,
            texture: MISSING_TEXTURE,
            ao: 0b10_01_11_00,
        };
        assert_eq!(quad.pack().unpack(), Some(quad));
    }

    #[test]
    fn cells_follow_the_face_axes() {
        let quad = Quad {
            x: 2,
            y: 5,
            z: 7,
            size_u: 2,
            size_v: 3,
            side: BlockSide::TOP,
            texture: 0,
            ao: AO_UNOCCLUDED,
        };
        // TOP looks along y, so u = z and v = x.
        let cells: Vec<_> = quad.cells().collect();
        assert_eq!(cells.len(), 6);
        assert!(cells.iter().all(|c| c[1] == 5));
        assert!(cells.contains(&[4, 5, 8]));
        assert!(!cells.contains(&[3, 5, 9]));
    }

    #[test]
    fn unknown_orientation_does_not_unpack() {
        let garbage: PackedQuad = bytemuck::cast([0u32, 7u32]);
        assert_eq!(garbage.unpack(), None);
    }
}
