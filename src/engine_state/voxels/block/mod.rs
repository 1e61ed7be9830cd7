//! # Block Module
//!
//! This module provides the core block-related functionality for the voxel engine.
//! It includes block type definitions, block face handling, and the texture file
//! names each block face resolves to.

use block_type::{BlockType, BLOCK_TYPE_COUNT};

pub mod block_side;
pub mod block_type;

/// The underlying integer type used to represent block types in memory.
pub type BlockTypeSize = u8;

/// Texture file names for each block type, one per face.
///
/// The outer array is indexed by `BlockType` as a `usize`.
/// The inner array is in `BlockSide` order:
/// [Front, Back, Bottom, Top, Left, Right]
pub static BLOCK_TEXTURE_FILES: [[&str; 6]; BLOCK_TYPE_COUNT] = [
    ["", "", "", "", "", ""], // AIR
    ["dirt.png", "dirt.png", "dirt.png", "dirt.png", "dirt.png", "dirt.png"],
    [
        "grass_side.png",
        "grass_side.png",
        "dirt.png",
        "grass_top.png",
        "grass_side.png",
        "grass_side.png",
    ],
    ["wood.png", "wood.png", "wood.png", "wood.png", "wood.png", "wood.png"],
    ["white.png", "white.png", "white.png", "white.png", "white.png", "white.png"],
    ["stone.png", "stone.png", "stone.png", "stone.png", "stone.png", "stone.png"],
];

/// Represents a single voxel block in the world.
///
/// # Memory Layout
/// The `#[repr(C)]` attribute keeps the block a single byte so a chunk's
/// dense block array is exactly one byte per cell.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    /// The type of this block, encoded as a `BlockTypeSize` for compact storage.
    pub block_type: BlockTypeSize,
}

impl Block {
    /// The air sentinel. Every freshly reset chunk cell holds this value.
    pub const AIR: Block = Block { block_type: 0 };

    /// Creates a new block of the specified type.
    pub fn new(block_type: BlockType) -> Self {
        Block {
            block_type: block_type as BlockTypeSize,
        }
    }

    /// Whether this block occludes its neighbours and produces faces.
    pub fn is_solid(&self) -> bool {
        self.block_type != Self::AIR.block_type
    }

    /// The rich type of this block. Unknown ids are treated as air.
    pub fn get_type(&self) -> BlockType {
        BlockType::from_int(self.block_type).unwrap_or(BlockType::AIR)
    }
}

impl From<BlockType> for Block {
    fn from(block_type: BlockType) -> Self {
        Block::new(block_type)
    }
}
