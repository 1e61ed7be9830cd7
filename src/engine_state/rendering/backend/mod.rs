//! The graphics driver seam.
//!
//! Everything the pipeline needs from a GPU goes through [`GpuBackend`]:
//! buffer create/write/copy/destroy/read, shader compilation, texture loading
//! and one bound multi-draw-indirect call per frame. Resources are referred to
//! by opaque handles so the render thread is the only place a device object
//! ever lives.
//!
//! # Implementations
//! - [`HeadlessBackend`]: buffers in host memory, draws executed as a CPU walk
//!   over the indirect commands. Used by tests and by the default demo run.
//! - [`WgpuBackend`]: a real device through wgpu, rendering into an offscreen
//!   color and depth target.

use std::path::Path;

use crate::engine_state::error::GpuError;

mod headless;
mod wgpu_backend;

pub use headless::HeadlessBackend;
pub use wgpu_backend::WgpuBackend;

/// Opaque buffer handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Opaque compiled pipeline handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

/// Opaque texture handle. Doubles as the texture array layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Parameters of a new buffer.
#[derive(Clone, Debug)]
pub struct BufferDescriptor<'a> {
    /// Debug label.
    pub label: &'a str,
    /// Size in bytes. Must be a multiple of 4.
    pub size: u64,
    /// Usage flags, as wgpu defines them.
    pub usage: wgpu::BufferUsages,
}

/// A non-indexed indirect draw command, laid out exactly as the GPU reads it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawCommand {
    /// Vertices to draw. Six per quad.
    pub vertex_count: u32,
    /// 1 when the group is drawn, 0 when culled or dead.
    pub instance_count: u32,
    /// First vertex; `first_vertex / 6` is the first quad in the face buffer.
    pub first_vertex: u32,
    /// Face group uniform index.
    pub first_instance: u32,
}

/// Size of one [`DrawCommand`] in bytes.
pub const DRAW_COMMAND_SIZE: u64 = std::mem::size_of::<DrawCommand>() as u64;

/// One frame's draw: every shared buffer bound once, one multi-draw.
#[derive(Copy, Clone, Debug)]
pub struct IndirectDraw {
    /// Pipeline from [`GpuBackend::compile_shader`].
    pub pipeline: ShaderHandle,
    /// Camera uniform.
    pub camera: BufferHandle,
    /// Packed quads.
    pub faces: BufferHandle,
    /// Face group uniforms.
    pub groups: BufferHandle,
    /// Draw commands.
    pub indirect: BufferHandle,
    /// Commands to execute from the start of `indirect`.
    pub draw_count: u32,
}

/// What a draw call actually did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    /// Commands submitted.
    pub commands: u32,
    /// Commands that drew at least one quad.
    pub drawn_groups: u32,
    /// Quads drawn.
    pub quads: u64,
}

/// Bytes per packed quad in the face buffer.
pub(crate) const QUAD_SIZE: u64 = 8;

/// Walks `draw_count` commands the way the GPU would and counts what they draw.
///
/// Commands with zero vertices or instances are skipped. A live command must
/// cover whole quads and stay inside a face buffer of `face_bytes` bytes.
pub(crate) fn walk_commands(
    commands: &[u8],
    draw_count: u32,
    face_bytes: u64,
) -> Result<DrawStats, GpuError> {
    let mut stats = DrawStats {
        commands: draw_count,
        ..Default::default()
    };
    for raw in commands
        .chunks_exact(DRAW_COMMAND_SIZE as usize)
        .take(draw_count as usize)
    {
        let command: DrawCommand = bytemuck::pod_read_unaligned(raw);
        if command.vertex_count == 0 || command.instance_count == 0 {
            continue;
        }
        if command.vertex_count % 6 != 0 || command.first_vertex % 6 != 0 {
            return Err(GpuError::InvalidDraw(format!(
                "command {:?} does not cover whole quads",
                command
            )));
        }
        let end = (command.first_vertex as u64 + command.vertex_count as u64) / 6 * QUAD_SIZE;
        if end > face_bytes {
            return Err(GpuError::InvalidDraw(format!(
                "command {:?} reads past the face buffer ({} bytes)",
                command, face_bytes
            )));
        }
        stats.drawn_groups += 1;
        stats.quads += command.vertex_count as u64 / 6 * command.instance_count as u64;
    }
    Ok(stats)
}

/// The graphics/driver collaborator.
///
/// Only the render thread holds a backend. Producers never see one; they post
/// closures through the render-sync bridge instead.
pub trait GpuBackend {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Creates a zero-initialised buffer.
    ///
    /// # Errors
    /// [`GpuError::OutOfMemory`] when the device cannot satisfy the request.
    fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> Result<BufferHandle, GpuError>;

    /// Uploads `data` at `offset`.
    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GpuError>;

    /// Copies `size` bytes between buffers on the device timeline.
    fn copy_buffer(
        &mut self,
        source: BufferHandle,
        source_offset: u64,
        destination: BufferHandle,
        destination_offset: u64,
        size: u64,
    ) -> Result<(), GpuError>;

    /// Releases a buffer. Unknown handles are ignored.
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Reads bytes back to the host, blocking until they are available.
    fn read_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GpuError>;

    /// Compiles the quad shader into a render pipeline.
    fn compile_shader(&mut self, label: &str, source: &str) -> Result<ShaderHandle, GpuError>;

    /// Loads one block texture into the next texture layer.
    fn load_texture(&mut self, path: &Path) -> Result<TextureHandle, GpuError>;

    /// Binds the draw's buffers once and issues one multi-draw-indirect.
    fn draw_indirect(&mut self, draw: &IndirectDraw) -> Result<DrawStats, GpuError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(commands: &[DrawCommand]) -> Vec<u8> {
        bytemuck::cast_slice(commands).to_vec()
    }

    #[test]
    fn culled_and_dead_commands_are_skipped() {
        let bytes = encode(&[
            DrawCommand { vertex_count: 12, instance_count: 1, first_vertex: 0, first_instance: 0 },
            DrawCommand { vertex_count: 6, instance_count: 0, first_vertex: 12, first_instance: 1 },
            DrawCommand::default(),
        ]);
        let stats = walk_commands(&bytes, 3, 3 * QUAD_SIZE).unwrap();
        assert_eq!(stats, DrawStats { commands: 3, drawn_groups: 1, quads: 2 });
    }

    #[test]
    fn reading_past_the_face_buffer_is_rejected() {
        let bytes = encode(&[DrawCommand {
            vertex_count: 12,
            instance_count: 1,
            first_vertex: 6,
            first_instance: 0,
        }]);
        assert!(matches!(
            walk_commands(&bytes, 1, 2 * QUAD_SIZE),
            Err(GpuError::InvalidDraw(_))
        ));
        assert!(walk_commands(&bytes, 1, 3 * QUAD_SIZE).is_ok());
    }
}
