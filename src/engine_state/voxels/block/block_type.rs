//! # Block Type Module
//!
//! This module defines the different types of blocks in the voxel world and the
//! name lookup used by configuration files.

use num_derive::FromPrimitive;
use phf::phf_map;

use super::BlockTypeSize;

/// Enumerates all possible block types in the voxel world.
///
/// The discriminant is the id stored in a chunk's dense block array, so `AIR`
/// must stay at zero. `FromPrimitive` lets the mesher turn stored ids back into
/// the rich enum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum BlockType {
    /// Empty space. Never rendered.
    AIR = 0,

    /// A basic dirt block, used as a common building material.
    DIRT = 1,

    /// A grass block with different textures on top and sides.
    GRASS = 2,

    /// A wooden block with a bark texture on all sides.
    WOOD = 3,

    /// A plain white block, often used for testing.
    WHITE = 4,

    /// Deep terrain filler.
    STONE = 5,
}

/// Number of `BlockType` variants, including `AIR`.
pub const BLOCK_TYPE_COUNT: usize = 6;

/// Block names accepted in configuration files.
pub static BLOCK_TYPES_BY_NAME: phf::Map<&'static str, BlockType> = phf_map! {
    "air" => BlockType::AIR,
    "dirt" => BlockType::DIRT,
    "grass" => BlockType::GRASS,
    "wood" => BlockType::WOOD,
    "white" => BlockType::WHITE,
    "stone" => BlockType::STONE,
};

impl BlockType {
    /// Converts a stored id back into a `BlockType`.
    ///
    /// # Arguments
    /// * `btype` - The block type as a `BlockTypeSize`
    ///
    /// # Returns
    /// The corresponding `BlockType`, or `None` for ids no variant uses.
    pub fn from_int(btype: BlockTypeSize) -> Option<Self> {
        num::FromPrimitive::from_u8(btype)
    }

    /// Looks up a block type by its configuration name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        BLOCK_TYPES_BY_NAME
            .get(name.to_ascii_lowercase().as_str())
            .copied()
    }

    /// Picks a random solid block type from the given generator.
    ///
    /// Used by the randomized mesher tests so that merges also have to respect
    /// block identity, not just occupancy.
    pub fn random_solid(rng: &mut fastrand::Rng) -> Self {
        num::FromPrimitive::from_u8(rng.u8(1..BLOCK_TYPE_COUNT as u8)).unwrap_or(BlockType::DIRT)
    }

    /// Whether blocks of this type occlude and produce faces.
    pub fn is_solid(self) -> bool {
        self != BlockType::AIR
    }
}
