//! Rendering system for the voxel streamer.
//!
//! Everything that owns or talks to the GPU lives under this module and runs
//! on the render thread only:
//! - `backend`: the [`GpuBackend`](backend::GpuBackend) seam with a headless
//!   and a wgpu implementation
//! - `meshing`: the greedy mesher and the mesh slot allocator that draws every
//!   resident chunk with one multi-draw-indirect call
//! - `texture`: block face to texture layer mapping

pub mod backend;
pub mod meshing;
pub mod texture;

/// WGSL source of the vertex-pulling quad pipeline.
pub const QUAD_SHADER: &str = include_str!("../../../assets/shaders/quad_shader.wgsl");
