//! Mesher output.

use crate::engine_state::{
    rendering::texture::TextureTable,
    voxels::{
        block::block_side::BlockSide,
        chunk::{chunk_iteration::ChunkBlockIterator, Chunk},
    },
};

use super::{face_signature, MesherOptions, PackedQuad, Quad};

/// Six quad lists for one chunk, indexed by `BlockSide as usize`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkMesh {
    /// Quads per face direction.
    pub quads: [Vec<PackedQuad>; 6],
}

impl ChunkMesh {
    /// An empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties every list, keeping capacity.
    pub fn clear(&mut self) {
        for side in self.quads.iter_mut() {
            side.clear();
        }
    }

    /// Quads facing `side`.
    pub fn side(&self, side: BlockSide) -> &[PackedQuad] {
        &self.quads[side as usize]
    }

    /// Quad count per direction.
    pub fn side_counts(&self) -> [u32; 6] {
        std::array::from_fn(|side| self.quads[side].len() as u32)
    }

    /// Total quads over all directions.
    pub fn quad_count(&self) -> usize {
        self.quads.iter().map(Vec::len).sum()
    }

    /// Whether the mesh draws nothing.
    pub fn is_empty(&self) -> bool {
        self.quad_count() == 0
    }

    /// Brute-force extraction: one 1x1 quad for every exposed face of every
    /// solid voxel. Uses the same face signatures as the greedy mesher.
    pub fn naive(chunk: &Chunk, textures: &TextureTable, options: &MesherOptions) -> Self {
        let mut mesh = ChunkMesh::new();

        for (position, _) in ChunkBlockIterator::new(chunk) {
            let position = [position.x, position.y, position.z];
            for side in BlockSide::all() {
                let offset = side.offset();
                if chunk.is_block_solid(
                    position[0] + offset[0],
                    position[1] + offset[1],
                    position[2] + offset[2],
                ) {
                    continue;
                }

                let signature = face_signature(chunk, textures, options, position, side);
                mesh.quads[side as usize].push(
                    Quad {
                        x: position[0] as u32,
                        y: position[1] as u32,
                        z: position[2] as u32,
                        size_u: 1,
                        size_v: 1,
                        side,
                        texture: signature.texture,
                        ao: signature.ao,
                    }
                    .pack(),
                );
            }
        }

        mesh
    }
}
