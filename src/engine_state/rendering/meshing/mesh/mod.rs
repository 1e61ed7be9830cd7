//! Surface extraction for voxel chunks.
//!
//! This module converts a chunk's block array into packed quads, one list per
//! face direction. The output is what the mesh slot allocator uploads.
//!
//! # Architecture
//! - [`PackedQuad`]: two-word encoding of one rectangle of faces
//! - [`ChunkMesh`]: six quad lists, indexed by `BlockSide`
//! - [`greedy_mesh`]: merges coplanar faces with equal signatures
//! - [`ChunkMesh::naive`]: one quad per exposed voxel face, the reference the
//!   greedy output is checked against
//!
//! # Face Signatures
//! Two faces may share a quad only if their [`FaceSignature`]s are equal:
//! same direction, same block, same texture and (when enabled) the same
//! ambient occlusion corners.
//!
//! # Performance Considerations
//! - The mesher allocates nothing per call beyond its output; slice buffers
//!   live in a caller-owned [`MeshScratch`]
//! - Occupancy tests read the chunk's bit vector, ids are read only for
//!   cells that actually carry a face

mod greedy;
mod mesh;
mod quad;

pub use greedy::{greedy_mesh, greedy_mesh_into, MeshScratch};
pub use mesh::ChunkMesh;
pub use quad::{PackedQuad, Quad, AO_UNOCCLUDED, MAX_QUAD_EXTENT, MISSING_TEXTURE};

use crate::engine_state::{
    rendering::texture::TextureTable,
    voxels::{
        block::{block_side::BlockSide, BlockTypeSize},
        chunk::Chunk,
    },
};

/// Per-call mesher switches.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MesherOptions {
    /// Compute corner occlusion for every face.
    pub ambient_occlusion: bool,
}

/// Everything that must match for two faces to merge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FaceSignature {
    /// Face direction.
    pub side: BlockSide,
    /// Block id of the voxel owning the face.
    pub block: BlockTypeSize,
    /// Texture layer resolved for `(block, side)`.
    pub texture: u16,
    /// Corner occlusion bits, `AO_UNOCCLUDED` when disabled.
    pub ao: u8,
}

/// Signature of the face of voxel `position` looking towards `side`.
///
/// The caller has already established that the face is exposed.
pub(crate) fn face_signature(
    chunk: &Chunk,
    textures: &TextureTable,
    options: &MesherOptions,
    position: [i32; 3],
    side: BlockSide,
) -> FaceSignature {
    let block = chunk.get_block(position[0], position[1], position[2]).block_type;
    let ao = if options.ambient_occlusion {
        corner_occlusion(chunk, position, side)
    } else {
        AO_UNOCCLUDED
    };

    FaceSignature {
        side,
        block,
        texture: textures.texture_for(block, side),
        ao,
    }
}

/// Classic voxel AO: each corner is darkened by the two edge neighbours and
/// the diagonal neighbour in the air layer the face looks into.
///
/// Corners are packed as `(-u,-v) | (+u,-v) << 2 | (+u,+v) << 4 | (-u,+v) << 6`.
fn corner_occlusion(chunk: &Chunk, position: [i32; 3], side: BlockSide) -> u8 {
    let axis = side.axis();
    let u = (axis + 1) % 3;
    let v = (axis + 2) % 3;

    let mut layer = position;
    layer[axis] += if side.is_positive() { 1 } else { -1 };

    let solid = |du: i32, dv: i32| {
        let mut cell = layer;
        cell[u] += du;
        cell[v] += dv;
        chunk.is_block_solid(cell[0], cell[1], cell[2])
    };

    let mut ao = 0u8;
    for (corner, (du, dv)) in [(-1, -1), (1, -1), (1, 1), (-1, 1)].into_iter().enumerate() {
        let side_u = solid(du, 0);
        let side_v = solid(0, dv);
        let level = if side_u && side_v {
            0
        } else {
            3 - side_u as u8 - side_v as u8 - solid(du, dv) as u8
        };
        ao |= level << (2 * corner);
    }
    ao
}
