//! Greedy meshing implementation for voxel rendering.
//!
//! This module implements the greedy meshing algorithm which combines adjacent coplanar
//! faces with the same signature into larger quads, significantly reducing the number
//! of quads the GPU has to pull.
//!
//! # Algorithm
//!
//! For each axis `d` the chunk is cut by the `CHUNK_DIMENSION + 1` planes between
//! consecutive voxel layers (the outer two planes separate the chunk from its
//! halo). For each plane:
//!
//! 1. Every cell of the plane gets a face signature, or none. A face exists when
//!    exactly one of the two voxels touching the plane is solid and that voxel
//!    belongs to the chunk proper. Which one is solid decides the face sign.
//! 2. Cells are visited row by row along `u = (d + 1) % 3`, columns along
//!    `v = (d + 2) % 3`. From each unchecked cell with a face the run is
//!    extended along `v` while signatures match, then whole rows are added
//!    along `u` until the first row that does not match everywhere.
//! 3. The rectangle is emitted as one quad and its cells are marked checked.

use bitvec::prelude::BitVec;

use crate::engine_state::{
    rendering::texture::TextureTable,
    voxels::{
        block::block_side::BlockSide,
        chunk::{Chunk, CHUNK_DIMENSION, CHUNK_PLANE_SIZE},
    },
};

use super::{face_signature, ChunkMesh, FaceSignature, MesherOptions, Quad};

const DIM: usize = CHUNK_DIMENSION as usize;

/// Reusable per-plane buffers for the greedy mesher.
///
/// One scratch per meshing thread. Its contents never leak between calls:
/// every plane overwrites all of it before reading.
pub struct MeshScratch {
    signatures: Vec<Option<FaceSignature>>,
    checked: BitVec,
}

impl MeshScratch {
    /// Allocates buffers sized for one chunk plane.
    pub fn new() -> Self {
        Self {
            signatures: vec![None; CHUNK_PLANE_SIZE as usize],
            checked: BitVec::repeat(false, CHUNK_PLANE_SIZE as usize),
        }
    }
}

impl Default for MeshScratch {
    fn default() -> Self {
        Self::new()
    }
}

/// Greedy-meshes a chunk into a fresh [`ChunkMesh`].
///
/// # Arguments
/// * `chunk` - The chunk to extract faces from (halo included)
/// * `textures` - Texture layers per block and face
/// * `options` - Mesher switches
/// * `scratch` - Plane buffers, reused across calls
///
/// # Returns
/// Six quad lists, deterministic for identical inputs.
pub fn greedy_mesh(
    chunk: &Chunk,
    textures: &TextureTable,
    options: &MesherOptions,
    scratch: &mut MeshScratch,
) -> ChunkMesh {
    let mut mesh = ChunkMesh::new();
    greedy_mesh_into(chunk, textures, options, scratch, &mut mesh);
    mesh
}

/// Same as [`greedy_mesh`], writing into an existing mesh.
pub fn greedy_mesh_into(
    chunk: &Chunk,
    textures: &TextureTable,
    options: &MesherOptions,
    scratch: &mut MeshScratch,
    mesh: &mut ChunkMesh,
) {
    mesh.clear();
    if chunk.is_empty() {
        return;
    }

    for axis in 0..3 {
        for plane in 0..=CHUNK_DIMENSION {
            fill_plane_signatures(chunk, textures, options, axis, plane, scratch);
            merge_plane(axis, plane, scratch, mesh);
        }
    }
}

/// Writes the signature of every cell of the plane between layers
/// `plane - 1` and `plane` along `axis`.
fn fill_plane_signatures(
    chunk: &Chunk,
    textures: &TextureTable,
    options: &MesherOptions,
    axis: usize,
    plane: i32,
    scratch: &mut MeshScratch,
) {
    let u = (axis + 1) % 3;
    let v = (axis + 2) % 3;

    for iu in 0..DIM {
        for iv in 0..DIM {
            let mut below = [0i32; 3];
            below[axis] = plane - 1;
            below[u] = iu as i32;
            below[v] = iv as i32;
            let mut above = below;
            above[axis] = plane;

            let below_solid = chunk.is_block_solid(below[0], below[1], below[2]);
            let above_solid = chunk.is_block_solid(above[0], above[1], above[2]);

            scratch.signatures[iu * DIM + iv] = if below_solid && !above_solid && plane > 0 {
                let side = BlockSide::from_axis(axis, true);
                Some(face_signature(chunk, textures, options, below, side))
            } else if above_solid && !below_solid && plane < CHUNK_DIMENSION {
                let side = BlockSide::from_axis(axis, false);
                Some(face_signature(chunk, textures, options, above, side))
            } else {
                None
            };
        }
    }
}

/// Greedily covers the plane's faces with rectangles.
fn merge_plane(axis: usize, plane: i32, scratch: &mut MeshScratch, mesh: &mut ChunkMesh) {
    let u = (axis + 1) % 3;
    let v = (axis + 2) % 3;
    let MeshScratch {
        signatures,
        checked,
    } = scratch;
    checked.fill(false);

    for iu in 0..DIM {
        for iv in 0..DIM {
            let start = iu * DIM + iv;
            if checked[start] {
                continue;
            }
            let Some(signature) = signatures[start] else {
                continue;
            };

            // Extend along the second dimension.
            let mut width = 1;
            while iv + width < DIM
                && !checked[start + width]
                && signatures[start + width] == Some(signature)
            {
                width += 1;
            }
            checked[start..start + width].fill(true);

            // Extend whole rows along the first dimension.
            let mut height = 1;
            while iu + height < DIM {
                let row = (iu + height) * DIM + iv;
                let matches = (row..row + width)
                    .all(|cell| !checked[cell] && signatures[cell] == Some(signature));
                if !matches {
                    break;
                }
                checked[row..row + width].fill(true);
                height += 1;
            }

            let mut position = [0i32; 3];
            position[axis] = if signature.side.is_positive() {
                plane - 1
            } else {
                plane
            };
            position[u] = iu as i32;
            position[v] = iv as i32;

            mesh.quads[signature.side as usize].push(
                Quad {
                    x: position[0] as u32,
                    y: position[1] as u32,
                    z: position[2] as u32,
                    size_u: height as u32,
                    size_v: width as u32,
                    side: signature.side,
                    texture: signature.texture,
                    ao: signature.ao,
                }
                .pack(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::engine_state::voxels::block::{block_type::BlockType, Block};

    type FaceCell = (usize, [i32; 3], u16, u8);

    /// Expands every quad back into per-voxel faces, sorted.
    fn rasterize(mesh: &ChunkMesh) -> Vec<FaceCell> {
        let mut cells = Vec::new();
        for side in BlockSide::all() {
            for packed in mesh.side(side) {
                let quad = packed.unpack().unwrap();
                assert_eq!(quad.side, side);
                for cell in quad.cells() {
                    cells.push((side as usize, cell, quad.texture, quad.ao));
                }
            }
        }
        cells.sort();
        cells
    }

    fn random_chunk(seed: u64, density: f64, with_halo: bool) -> Chunk {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut chunk = Chunk::empty(Point3::new(0, 0, 0), 0);
        let range = if with_halo {
            -1..CHUNK_DIMENSION + 1
        } else {
            0..CHUNK_DIMENSION
        };
        for z in range.clone() {
            for y in range.clone() {
                for x in range.clone() {
                    if rng.f64() < density {
                        chunk.set_block(x, y, z, Block::new(BlockType::random_solid(&mut rng)));
                    }
                }
            }
        }
        chunk
    }

    fn solid_box(min: [i32; 3], max: [i32; 3], block: BlockType) -> Chunk {
        let mut chunk = Chunk::empty(Point3::new(0, 0, 0), 0);
        for z in min[2]..max[2] {
            for y in min[1]..max[1] {
                for x in min[0]..max[0] {
                    chunk.set_block(x, y, z, Block::new(block));
                }
            }
        }
        chunk
    }

    #[test]
    fn matches_brute_force_on_random_chunks() {
        let textures = TextureTable::sequential();
        let mut scratch = MeshScratch::new();

        for (seed, density, with_halo, ambient_occlusion) in [
            (1, 0.1, false, false),
            (2, 0.5, false, false),
            (3, 0.9, true, false),
            (4, 0.3, true, true),
            (5, 0.6, false, true),
        ] {
            let chunk = random_chunk(seed, density, with_halo);
            let options = MesherOptions { ambient_occlusion };

            let greedy = greedy_mesh(&chunk, &textures, &options, &mut scratch);
            let naive = ChunkMesh::naive(&chunk, &textures, &options);

            assert_eq!(rasterize(&greedy), rasterize(&naive), "seed {seed}");
            assert!(greedy.quad_count() <= naive.quad_count());
        }
    }

    #[test]
    fn output_is_deterministic_across_scratch_reuse() {
        let textures = TextureTable::sequential();
        let options = MesherOptions::default();
        let chunk = random_chunk(11, 0.4, true);
        let other = random_chunk(12, 0.7, false);

        let mut scratch = MeshScratch::new();
        let first = greedy_mesh(&chunk, &textures, &options, &mut scratch);
        let _ = greedy_mesh(&other, &textures, &options, &mut scratch);
        let second = greedy_mesh(&chunk, &textures, &options, &mut MeshScratch::new());
        let third = greedy_mesh(&chunk, &textures, &options, &mut scratch);

        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn isolated_block_yields_one_quad_per_face() {
        let textures = TextureTable::sequential();
        let chunk = solid_box([4, 4, 4], [8, 8, 8], BlockType::STONE);
        let mesh = greedy_mesh(
            &chunk,
            &textures,
            &MesherOptions::default(),
            &mut MeshScratch::new(),
        );

        assert_eq!(mesh.quad_count(), 6);
        for side in BlockSide::all() {
            let quads = mesh.side(side);
            assert_eq!(quads.len(), 1, "{side:?}");
            let quad = quads[0].unpack().unwrap();
            assert_eq!((quad.size_u, quad.size_v), (4, 4));
        }
        let top = mesh.side(BlockSide::TOP)[0].unpack().unwrap();
        assert_eq!((top.x, top.y, top.z), (4, 7, 4));
        let bottom = mesh.side(BlockSide::BOTTOM)[0].unpack().unwrap();
        assert_eq!((bottom.x, bottom.y, bottom.z), (4, 4, 4));
    }

    #[test]
    fn checkerboard_cannot_merge() {
        let textures = TextureTable::sequential();
        let mut chunk = Chunk::empty(Point3::new(0, 0, 0), 0);
        for z in 0..CHUNK_DIMENSION {
            for y in 0..CHUNK_DIMENSION {
                for x in 0..CHUNK_DIMENSION {
                    if (x + y + z) % 2 == 0 {
                        chunk.set_block(x, y, z, Block::new(BlockType::DIRT));
                    }
                }
            }
        }
        let options = MesherOptions::default();
        let greedy = greedy_mesh(&chunk, &textures, &options, &mut MeshScratch::new());
        let naive = ChunkMesh::naive(&chunk, &textures, &options);

        assert_eq!(greedy.quad_count(), naive.quad_count());
        assert_eq!(greedy.quad_count(), 6 * (CHUNK_DIMENSION.pow(3) as usize / 2));
    }

    #[test]
    fn different_blocks_do_not_merge() {
        let textures = TextureTable::sequential();
        let mut chunk = solid_box([0, 0, 0], [2, 1, 1], BlockType::DIRT);
        chunk.set_block(1, 0, 0, Block::new(BlockType::WOOD));
        let mesh = greedy_mesh(
            &chunk,
            &textures,
            &MesherOptions::default(),
            &mut MeshScratch::new(),
        );
        assert_eq!(mesh.side(BlockSide::TOP).len(), 2);
        assert_eq!(mesh.side(BlockSide::LEFT).len(), 1);
    }

    #[test]
    fn solid_halo_hides_border_faces() {
        let textures = TextureTable::sequential();
        let options = MesherOptions::default();
        let mut chunk = solid_box([0, 0, 0], [CHUNK_DIMENSION, 1, CHUNK_DIMENSION], BlockType::DIRT);

        let open = greedy_mesh(&chunk, &textures, &options, &mut MeshScratch::new());
        assert_eq!(open.side(BlockSide::LEFT).len(), 1);
        assert_eq!(open.side(BlockSide::BOTTOM).len(), 1);

        for z in 0..CHUNK_DIMENSION {
            chunk.set_block(-1, 0, z, Block::new(BlockType::DIRT));
            for x in 0..CHUNK_DIMENSION {
                chunk.set_block(x, -1, z, Block::new(BlockType::DIRT));
            }
        }
        let closed = greedy_mesh(&chunk, &textures, &options, &mut MeshScratch::new());
        assert!(closed.side(BlockSide::LEFT).is_empty());
        assert!(closed.side(BlockSide::BOTTOM).is_empty());
        assert_eq!(closed.side(BlockSide::TOP).len(), 1);
    }

    #[test]
    fn ambient_occlusion_splits_shaded_faces() {
        let textures = TextureTable::sequential();
        let mut chunk = solid_box([0, 0, 0], [4, 1, 4], BlockType::STONE);
        // A pillar on the slab darkens the top faces around it.
        chunk.set_block(1, 1, 1, Block::new(BlockType::STONE));

        let flat = greedy_mesh(
            &chunk,
            &textures,
            &MesherOptions::default(),
            &mut MeshScratch::new(),
        );
        let shaded = greedy_mesh(
            &chunk,
            &textures,
            &MesherOptions {
                ambient_occlusion: true,
            },
            &mut MeshScratch::new(),
        );
        assert!(shaded.side(BlockSide::TOP).len() > flat.side(BlockSide::TOP).len());
        assert_eq!(
            rasterize(&shaded).len(),
            rasterize(&flat).len(),
            "AO must not change which faces exist"
        );
    }

    #[test]
    fn empty_chunk_yields_nothing() {
        let mesh = greedy_mesh(
            &Chunk::empty(Point3::new(0, 0, 0), 0),
            &TextureTable::sequential(),
            &MesherOptions::default(),
            &mut MeshScratch::new(),
        );
        assert!(mesh.is_empty());
    }
}
