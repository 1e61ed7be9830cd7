//! # World Generation
//!
//! The world-generation collaborator of the streaming pipeline. A generator is
//! a pure function from world block coordinate to block, plus an optional
//! cheap test that lets the streaming manager skip regions it can prove empty.
//!
//! ## Generators
//!
//! - Perlin noise for natural-looking terrain with caves and overhangs
//! - Half-space (everything below a surface level is solid)
//! - Checkerboard pattern for testing
//! - Solid chunks (all blocks filled)
//! - Empty chunks (all blocks air)
//!
//! Chunks at higher LODs point-sample the function at each voxel's minimum
//! corner, so every level sees the same world at a coarser resolution.

use std::sync::Arc;

use cgmath::Point3;
use noise::{NoiseFn, Perlin};

use crate::engine_state::config::{BoundaryPolicy, GeneratorConfig, GeneratorKind};

use super::block::{block_type::BlockType, Block};
use super::chunk::{Chunk, CHUNK_DIMENSION};

/// Threshold above which Perlin noise is considered solid for terrain generation.
pub const PERLIN_POSITIVE_THRESHOLD: f64 = 0.2;
/// Threshold below which Perlin noise is considered solid for terrain generation.
pub const PERLIN_NEGATIVE_THRESHOLD: f64 = -0.2;
/// Scaling factor applied to world coordinates when sampling Perlin noise.
pub const PERLIN_SCALE_FACTOR: f64 = 0.02;

/// Source of voxel data for the streaming pipeline.
pub trait VoxelGenerator: Send + Sync {
    /// The block at a world block coordinate (LOD 0 units).
    fn block_at(&self, world: Point3<i32>) -> Block;

    /// Whether the chunk at `position` (chunk coordinates at `lod`) is
    /// guaranteed to contain only air. `false` means "unknown", never "solid".
    fn is_region_known_empty(&self, _position: Point3<i32>, _lod: u8) -> bool {
        false
    }

    /// Populates an already reset chunk from the world function.
    ///
    /// With [`BoundaryPolicy::SampleNeighbors`] the halo is filled too, so the
    /// mesher sees the real neighbours on the chunk border.
    fn fill(&self, chunk: &mut Chunk, boundary: BoundaryPolicy) {
        let range = match boundary {
            BoundaryPolicy::AssumeEmpty => 0..CHUNK_DIMENSION,
            BoundaryPolicy::SampleNeighbors => -1..CHUNK_DIMENSION + 1,
        };

        for z in range.clone() {
            for y in range.clone() {
                for x in range.clone() {
                    let block = self.block_at(chunk.world_block_position(x, y, z));
                    if block.is_solid() {
                        chunk.set_block(x, y, z, block);
                    }
                }
            }
        }
    }
}

/// Thresholded 3D Perlin noise. Solid wherever the sample leaves the
/// `[PERLIN_NEGATIVE_THRESHOLD, PERLIN_POSITIVE_THRESHOLD]` band.
pub struct PerlinGenerator {
    perlin: Perlin,
}

impl PerlinGenerator {
    /// Creates a generator for the given noise seed.
    pub fn new(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
        }
    }

    fn to_perlin_pos(pos: Point3<i32>, scale_factor: f64) -> [f64; 3] {
        [
            pos.x as f64 * scale_factor,
            pos.y as f64 * scale_factor,
            pos.z as f64 * scale_factor,
        ]
    }
}

impl VoxelGenerator for PerlinGenerator {
    fn block_at(&self, world: Point3<i32>) -> Block {
        let sample = self
            .perlin
            .get(Self::to_perlin_pos(world, PERLIN_SCALE_FACTOR));
        if (PERLIN_NEGATIVE_THRESHOLD..=PERLIN_POSITIVE_THRESHOLD).contains(&sample) {
            return Block::AIR;
        }

        // Layer by depth so merges have more than one block type to respect.
        let block_type = if world.y > 16 {
            BlockType::GRASS
        } else if world.y > -32 {
            BlockType::DIRT
        } else {
            BlockType::STONE
        };
        Block::new(block_type)
    }
}

/// Everything strictly below `level` is `block`, everything above is air.
pub struct HalfSpaceGenerator {
    /// First air layer, in world blocks.
    pub level: i32,
    /// Fill block.
    pub block: Block,
}

impl VoxelGenerator for HalfSpaceGenerator {
    fn block_at(&self, world: Point3<i32>) -> Block {
        if world.y < self.level {
            self.block
        } else {
            Block::AIR
        }
    }

    fn is_region_known_empty(&self, position: Point3<i32>, lod: u8) -> bool {
        let min_y = position.y * CHUNK_DIMENSION * (1 << lod);
        min_y >= self.level
    }
}

/// Alternating solid and air voxels in all three axes. Every face of every
/// solid voxel is exposed, which makes it the worst case for greedy merging.
pub struct CheckerboardGenerator;

impl VoxelGenerator for CheckerboardGenerator {
    fn block_at(&self, world: Point3<i32>) -> Block {
        if (world.x + world.y + world.z).rem_euclid(2) == 0 {
            Block::new(BlockType::DIRT)
        } else {
            Block::AIR
        }
    }
}

/// Every voxel is `block`.
pub struct SolidGenerator {
    /// Fill block.
    pub block: Block,
}

impl VoxelGenerator for SolidGenerator {
    fn block_at(&self, _world: Point3<i32>) -> Block {
        self.block
    }
}

/// Every voxel is air.
pub struct EmptyGenerator;

impl VoxelGenerator for EmptyGenerator {
    fn block_at(&self, _world: Point3<i32>) -> Block {
        Block::AIR
    }

    fn is_region_known_empty(&self, _position: Point3<i32>, _lod: u8) -> bool {
        true
    }
}

/// Builds the generator named by the config.
///
/// # Arguments
/// * `config` - Generator section of the engine config
/// * `block` - Fill block already resolved from `config.block`
pub fn build_generator(config: &GeneratorConfig, block: BlockType) -> Arc<dyn VoxelGenerator> {
    let block = Block::new(block);
    match config.kind {
        GeneratorKind::Perlin => Arc::new(PerlinGenerator::new(config.seed)),
        GeneratorKind::HalfSpace => Arc::new(HalfSpaceGenerator {
            level: config.level,
            block,
        }),
        GeneratorKind::Checkerboard => Arc::new(CheckerboardGenerator),
        GeneratorKind::Solid => Arc::new(SolidGenerator { block }),
        GeneratorKind::Empty => Arc::new(EmptyGenerator),
    }
}
