//! # Voxels
//!
//! Voxel data and the world index the streaming thread keeps resident.
//!
//! ## Architecture
//!
//! The voxel system is organized into several key components:
//!
//! * **Block**: Defines individual voxel types, properties, and behaviors
//! * **Chunk**: Manages fixed-size 3D arrays of blocks for efficient memory use and processing
//! * **Generator**: The world function chunks are filled from
//! * **World**: Indexes resident chunks by LOD and coordinate and applies edits
//!
//! ## Data Flow
//!
//! 1. The streaming thread fills a pooled chunk from the generator, halo included
//! 2. The chunk is meshed outside any lock, then swapped into the world
//! 3. Edits go through the world, mark the chunk dirty and are re-meshed on the
//!    next streaming tick

pub mod block;
pub mod chunk;
pub mod generator;
pub mod world;
