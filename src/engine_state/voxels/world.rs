//! # World Module
//!
//! This module provides the `World` struct which indexes the chunks currently
//! resident in memory. It serves as the shared state between the streaming
//! thread, which loads and evicts chunks, and whoever edits blocks.
//!
//! ## Architecture
//!
//! The world uses a sparse storage approach: only chunks the streaming manager
//! decided to keep are present, keyed by [`ChunkKey`] (LOD level plus chunk
//! coordinate at that level). Each resident chunk remembers the mesh handle
//! its geometry was uploaded under, if any.
//!
//! ## Thread Safety
//!
//! The world itself is plain data. It is shared behind an
//! [`MtResource`](crate::core::MtResource), and every lock is held for one
//! load, one eviction, one swap or one edit.
//!
//! ## Edits
//!
//! Only LOD 0 chunks are editable. An edit marks the chunk dirty; the next
//! streaming tick re-meshes it. With neighbour sampling enabled an edit on a
//! chunk border also updates the halo of the resident neighbour, which is
//! re-meshed too.

use std::collections::HashMap;

use cgmath::Point3;

use crate::engine_state::{
    config::BoundaryPolicy,
    error::WorldError,
    rendering::meshing::MeshHandle,
};

use super::{
    block::Block,
    chunk::{split_block_position, Chunk, CHUNK_DIMENSION},
};

/// Identity of a resident chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    /// Level of detail.
    pub lod: u8,
    /// Chunk coordinate at `lod`.
    pub position: Point3<i32>,
}

impl ChunkKey {
    /// A key at LOD 0.
    pub fn base(position: Point3<i32>) -> Self {
        Self { lod: 0, position }
    }

    /// Total order used wherever keys must come out deterministically.
    pub fn sort_key(&self) -> (u8, i32, i32, i32) {
        (self.lod, self.position.x, self.position.y, self.position.z)
    }

    /// World-space center of the chunk.
    pub fn center(&self) -> Point3<f32> {
        let edge = (CHUNK_DIMENSION << self.lod) as f32;
        Point3::new(
            (self.position.x as f32 + 0.5) * edge,
            (self.position.y as f32 + 0.5) * edge,
            (self.position.z as f32 + 0.5) * edge,
        )
    }
}

/// A chunk held by the world and the mesh it was last uploaded under.
pub struct ResidentChunk {
    /// Voxel data.
    pub chunk: Chunk,
    /// Mesh slot, `None` while the chunk has never produced geometry.
    pub handle: Option<MeshHandle>,
}

/// Represents the resident part of a voxel world.
///
/// # Examples
///
/// ```
/// use cgmath::Point3;
/// use voxel_streamer::engine_state::config::BoundaryPolicy;
/// use voxel_streamer::engine_state::voxels::block::{block_type::BlockType, Block};
/// use voxel_streamer::engine_state::voxels::chunk::Chunk;
/// use voxel_streamer::engine_state::voxels::world::{ChunkKey, ResidentChunk, World};
///
/// let mut world = World::new(BoundaryPolicy::AssumeEmpty);
/// let key = ChunkKey::base(Point3::new(0, 0, 0));
/// world.insert(key, ResidentChunk { chunk: Chunk::empty(key.position, 0), handle: None });
///
/// world.set_block(Point3::new(3, 4, 5), Block::new(BlockType::STONE)).unwrap();
/// assert_eq!(world.dirty_keys(), vec![key]);
/// ```
pub struct World {
    chunks: HashMap<ChunkKey, ResidentChunk>,
    boundary: BoundaryPolicy,
}

impl World {
    /// Creates a new, empty world.
    ///
    /// # Arguments
    /// * `boundary` - Whether chunk halos mirror their neighbours
    pub fn new(boundary: BoundaryPolicy) -> Self {
        World {
            chunks: HashMap::new(),
            boundary,
        }
    }

    /// Adds a chunk, returning the one it replaced.
    pub fn insert(&mut self, key: ChunkKey, chunk: ResidentChunk) -> Option<ResidentChunk> {
        self.chunks.insert(key, chunk)
    }

    /// Evicts a chunk.
    pub fn remove(&mut self, key: &ChunkKey) -> Option<ResidentChunk> {
        self.chunks.remove(key)
    }

    /// Looks up a resident chunk.
    pub fn get(&self, key: &ChunkKey) -> Option<&ResidentChunk> {
        self.chunks.get(key)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, key: &ChunkKey) -> Option<&mut ResidentChunk> {
        self.chunks.get_mut(key)
    }

    /// Whether `key` is resident.
    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.chunks.contains_key(key)
    }

    /// Number of resident chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Keys of every resident chunk, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &ChunkKey> + '_ {
        self.chunks.keys()
    }

    /// Resident chunks that hold a mesh handle.
    pub fn meshed_count(&self) -> usize {
        self.chunks.values().filter(|c| c.handle.is_some()).count()
    }

    /// Reads a block at a world block coordinate from the resident LOD 0 chunk.
    pub fn get_block(&self, world_position: Point3<i32>) -> Option<Block> {
        let (chunk, local) = split_block_position(world_position);
        self.chunks
            .get(&ChunkKey::base(chunk))
            .map(|resident| resident.chunk.get_block(local.x, local.y, local.z))
    }

    /// Writes a block at a world block coordinate.
    ///
    /// # Returns
    /// `Ok(true)` if the block changed and the chunk was marked dirty.
    ///
    /// # Errors
    /// [`WorldError::ChunkNotResident`] if the LOD 0 chunk holding the
    /// position is not loaded. Nothing is written in that case.
    pub fn set_block(
        &mut self,
        world_position: Point3<i32>,
        block: Block,
    ) -> Result<bool, WorldError> {
        let (chunk_position, local) = split_block_position(world_position);
        let resident = self
            .chunks
            .get_mut(&ChunkKey::base(chunk_position))
            .ok_or(WorldError::ChunkNotResident(chunk_position))?;

        if !resident.chunk.edit_block(local.x, local.y, local.z, block) {
            return Ok(false);
        }

        if self.boundary == BoundaryPolicy::SampleNeighbors {
            self.update_neighbour_halos(chunk_position, local, block);
        }
        Ok(true)
    }

    /// Mirrors a border edit into the halo of each resident neighbour.
    ///
    /// A cell on an edge or corner is also held by the diagonal neighbours,
    /// so every non-empty combination of border axes is visited (up to seven).
    fn update_neighbour_halos(&mut self, chunk: Point3<i32>, local: Point3<i32>, block: Block) {
        let mut steps = [0; 3];
        for axis in 0..3 {
            if local[axis] == 0 {
                steps[axis] = -1;
            } else if local[axis] == CHUNK_DIMENSION - 1 {
                steps[axis] = 1;
            }
        }

        for mask in 1u8..8 {
            let mut neighbour = chunk;
            let mut halo = local;
            let mut reachable = true;
            for axis in 0..3 {
                if mask & (1 << axis) == 0 {
                    continue;
                }
                if steps[axis] == 0 {
                    reachable = false;
                    break;
                }
                neighbour[axis] += steps[axis];
                halo[axis] = if steps[axis] < 0 { CHUNK_DIMENSION } else { -1 };
            }
            if !reachable {
                continue;
            }

            if let Some(resident) = self.chunks.get_mut(&ChunkKey::base(neighbour)) {
                resident.chunk.set_block(halo.x, halo.y, halo.z, block);
                resident.chunk.mark_dirty();
            }
        }
    }

    /// Chunks with edits that have not been re-meshed yet.
    pub fn dirty_keys(&self) -> Vec<ChunkKey> {
        let mut keys: Vec<ChunkKey> = self
            .chunks
            .iter()
            .filter(|(_, resident)| resident.chunk.is_dirty())
            .map(|(key, _)| *key)
            .collect();
        keys.sort_by_key(|key| key.sort_key());
        keys
    }
}
