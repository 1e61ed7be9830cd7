//! Block texture lookup.
//!
//! Maps every (block type, side) pair to a texture layer id. Files are loaded
//! once each through the backend; a file that fails to load leaves the
//! [`MISSING_TEXTURE`] sentinel in its slots, which the shader draws as
//! magenta instead of failing the frame.

use std::collections::HashMap;
use std::path::Path;

use log::{info, warn};

use crate::engine_state::voxels::block::{
    block_side::BlockSide, block_type::BLOCK_TYPE_COUNT, BlockTypeSize, BLOCK_TEXTURE_FILES,
};

use super::backend::GpuBackend;
use super::meshing::mesh::MISSING_TEXTURE;

/// Texture layer ids per block type and side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureTable {
    layers: [[u16; 6]; BLOCK_TYPE_COUNT],
}

impl TextureTable {
    /// A table where every face is missing its texture.
    pub fn missing() -> Self {
        Self {
            layers: [[MISSING_TEXTURE; 6]; BLOCK_TYPE_COUNT],
        }
    }

    /// Distinct ids for every (block, side) pair, without touching a backend.
    pub fn sequential() -> Self {
        let mut layers = [[MISSING_TEXTURE; 6]; BLOCK_TYPE_COUNT];
        for (block, sides) in layers.iter_mut().enumerate().skip(1) {
            for (side, layer) in sides.iter_mut().enumerate() {
                *layer = (block * 6 + side) as u16;
            }
        }
        Self { layers }
    }

    /// Loads every file named in [`BLOCK_TEXTURE_FILES`] from `directory`.
    ///
    /// Each file is uploaded once no matter how many faces use it.
    pub fn load(backend: &mut dyn GpuBackend, directory: &Path) -> Self {
        let mut loaded: HashMap<&str, u16> = HashMap::new();
        let mut table = Self::missing();

        for (block, files) in BLOCK_TEXTURE_FILES.iter().enumerate() {
            for (side, file) in files.iter().enumerate() {
                if file.is_empty() {
                    continue;
                }
                let layer = *loaded.entry(*file).or_insert_with(|| {
                    match backend.load_texture(&directory.join(file)) {
                        Ok(handle) => handle.0 as u16,
                        Err(e) => {
                            warn!("{}", e);
                            MISSING_TEXTURE
                        }
                    }
                });
                table.layers[block][side] = layer;
            }
        }

        info!(
            "loaded {} block textures from {:?}",
            loaded.values().filter(|l| **l != MISSING_TEXTURE).count(),
            directory
        );
        table
    }

    /// Texture id of one side of a block type. Unknown types get the sentinel.
    pub fn texture_for(&self, block: BlockTypeSize, side: BlockSide) -> u16 {
        self.layers
            .get(block as usize)
            .map_or(MISSING_TEXTURE, |sides| sides[side as usize])
    }
}

impl Default for TextureTable {
    fn default() -> Self {
        Self::missing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::rendering::backend::HeadlessBackend;
    use crate::engine_state::voxels::block::block_type::BlockType;

    #[test]
    fn missing_directory_yields_sentinels() {
        let mut backend = HeadlessBackend::new();
        let table = TextureTable::load(&mut backend, Path::new("no/such/textures"));
        assert_eq!(
            table.texture_for(BlockType::STONE as u8, BlockSide::TOP),
            MISSING_TEXTURE
        );
    }

    #[test]
    fn shared_files_share_a_layer() {
        let directory = std::env::temp_dir().join(format!("voxel-textures-{}", std::process::id()));
        std::fs::create_dir_all(&directory).unwrap();
        for file in ["dirt.png", "grass_side.png", "grass_top.png"] {
            image::RgbaImage::new(16, 16).save(directory.join(file)).unwrap();
        }

        let mut backend = HeadlessBackend::new();
        let table = TextureTable::load(&mut backend, &directory);
        let grass = BlockType::GRASS as u8;
        let dirt = BlockType::DIRT as u8;

        assert_eq!(
            table.texture_for(grass, BlockSide::BOTTOM),
            table.texture_for(dirt, BlockSide::TOP)
        );
        assert_ne!(
            table.texture_for(grass, BlockSide::TOP),
            table.texture_for(grass, BlockSide::LEFT)
        );
        assert_eq!(table.texture_for(BlockType::WOOD as u8, BlockSide::FRONT), MISSING_TEXTURE);

        std::fs::remove_dir_all(&directory).unwrap();
    }

    #[test]
    fn unknown_block_type_is_missing() {
        assert_eq!(
            TextureTable::sequential().texture_for(200, BlockSide::FRONT),
            MISSING_TEXTURE
        );
    }
}
