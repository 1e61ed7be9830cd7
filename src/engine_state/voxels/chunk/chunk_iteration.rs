//! # Chunk Iteration Module
//!
//! Iterates the solid blocks of a chunk proper, skipping air through the
//! `solid_array` bit vector and skipping the halo layer.

use bitvec::order::Lsb0;
use bitvec::slice::IterOnes;
use cgmath::Point3;

use crate::engine_state::voxels::block::Block;

use super::{Chunk, CHUNK_DIMENSION, CHUNK_DIMENSION_WRAPPED, CHUNK_PLANE_SIZE_WRAPPED};

/// Yields `(local position, block)` for every solid cell inside the chunk,
/// in storage order (x fastest, then y, then z).
pub struct ChunkBlockIterator<'a> {
    chunk_ref: &'a Chunk,
    ones: IterOnes<'a, usize, Lsb0>,
}

impl<'a> ChunkBlockIterator<'a> {
    /// Starts iterating `chunk_ref`.
    pub fn new(chunk_ref: &'a Chunk) -> Self {
        ChunkBlockIterator {
            chunk_ref,
            ones: chunk_ref.solid_array.iter_ones(),
        }
    }

    /// Advances to the next solid block inside the chunk proper.
    pub fn get_next_block(&mut self) -> Option<(Point3<i32>, Block)> {
        for index in self.ones.by_ref() {
            let x = (index % CHUNK_DIMENSION_WRAPPED) as i32 - 1;
            let y = ((index / CHUNK_DIMENSION_WRAPPED) % CHUNK_DIMENSION_WRAPPED) as i32 - 1;
            let z = (index / CHUNK_PLANE_SIZE_WRAPPED) as i32 - 1;

            if Chunk::in_interior(x, y, z) {
                return Some((Point3::new(x, y, z), self.chunk_ref.blocks[index]));
            }
        }
        None
    }
}

impl Iterator for ChunkBlockIterator<'_> {
    type Item = (Point3<i32>, Block);

    fn next(&mut self) -> Option<Self::Item> {
        self.get_next_block()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(CHUNK_DIMENSION.pow(3) as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;

    #[test]
    fn visits_interior_solids_only() {
        let mut chunk = Chunk::empty(Point3::new(0, 0, 0), 0);
        chunk.set_block(-1, 0, 0, Block::new(BlockType::DIRT));
        chunk.set_block(2, 0, 0, Block::new(BlockType::DIRT));
        chunk.set_block(0, 1, 0, Block::new(BlockType::GRASS));
        chunk.set_block(31, 31, 31, Block::new(BlockType::STONE));

        let visited: Vec<_> = ChunkBlockIterator::new(&chunk).collect();
        assert_eq!(
            visited,
            vec![
                (Point3::new(2, 0, 0), Block::new(BlockType::DIRT)),
                (Point3::new(0, 1, 0), Block::new(BlockType::GRASS)),
                (Point3::new(31, 31, 31), Block::new(BlockType::STONE)),
            ]
        );
        assert_eq!(visited.len() as u32, chunk.solid_count());
    }
}
