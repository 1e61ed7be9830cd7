//! Host-memory backend.
//!
//! Buffers are byte vectors, textures are validated image files, and a draw
//! walks the indirect commands the way the GPU would, checking that every
//! command stays inside the face buffer. An optional memory limit makes
//! allocation failure reproducible.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;

use crate::engine_state::error::GpuError;

use super::{
    walk_commands, BufferDescriptor, BufferHandle, DrawStats, GpuBackend, IndirectDraw,
    ShaderHandle, TextureHandle, DRAW_COMMAND_SIZE,
};

struct HeadlessBuffer {
    label: String,
    bytes: Vec<u8>,
}

/// A [`GpuBackend`] without a device.
pub struct HeadlessBackend {
    buffers: HashMap<u64, HeadlessBuffer>,
    next_buffer: u64,
    allocated: u64,
    memory_limit: Option<u64>,
    pipelines: Vec<String>,
    textures: Vec<PathBuf>,
    draws: u64,
    last_draw: Option<DrawStats>,
}

impl HeadlessBackend {
    /// A backend with unlimited memory.
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            next_buffer: 0,
            allocated: 0,
            memory_limit: None,
            pipelines: Vec::new(),
            textures: Vec::new(),
            draws: 0,
            last_draw: None,
        }
    }

    /// A backend that fails allocations once `limit` bytes are live.
    pub fn with_memory_limit(limit: u64) -> Self {
        Self {
            memory_limit: Some(limit),
            ..Self::new()
        }
    }

    /// Bytes currently allocated.
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated
    }

    /// Live buffer count.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Draw calls issued so far.
    pub fn draw_calls(&self) -> u64 {
        self.draws
    }

    /// Stats of the most recent draw.
    pub fn last_draw(&self) -> Option<DrawStats> {
        self.last_draw
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&HeadlessBuffer, GpuError> {
        self.buffers
            .get(&handle.0)
            .ok_or_else(|| GpuError::UnknownBuffer(format!("#{}", handle.0)))
    }

    fn check_range(buffer: &HeadlessBuffer, offset: u64, len: u64) -> Result<(), GpuError> {
        let size = buffer.bytes.len() as u64;
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(GpuError::WriteOutOfBounds {
                label: buffer.label.clone(),
                offset,
                len,
                size,
            });
        }
        Ok(())
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> Result<BufferHandle, GpuError> {
        if let Some(limit) = self.memory_limit {
            if self.allocated + descriptor.size > limit {
                return Err(GpuError::OutOfMemory {
                    label: descriptor.label.to_string(),
                    requested: descriptor.size,
                });
            }
        }

        let handle = BufferHandle(self.next_buffer);
        self.next_buffer += 1;
        self.allocated += descriptor.size;
        self.buffers.insert(
            handle.0,
            HeadlessBuffer {
                label: descriptor.label.to_string(),
                bytes: vec![0; descriptor.size as usize],
            },
        );
        debug!("created buffer '{}' ({} bytes)", descriptor.label, descriptor.size);
        Ok(handle)
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let target = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or_else(|| GpuError::UnknownBuffer(format!("#{}", buffer.0)))?;
        Self::check_range(target, offset, data.len() as u64)?;
        let start = offset as usize;
        target.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        source: BufferHandle,
        source_offset: u64,
        destination: BufferHandle,
        destination_offset: u64,
        size: u64,
    ) -> Result<(), GpuError> {
        let source_buffer = self.buffer(source)?;
        Self::check_range(source_buffer, source_offset, size)?;
        let start = source_offset as usize;
        let data = source_buffer.bytes[start..start + size as usize].to_vec();
        self.write_buffer(destination, destination_offset, &data)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(removed) = self.buffers.remove(&buffer.0) {
            self.allocated -= removed.bytes.len() as u64;
        }
    }

    fn read_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GpuError> {
        let source = self.buffer(buffer)?;
        Self::check_range(source, offset, size)?;
        let start = offset as usize;
        Ok(source.bytes[start..start + size as usize].to_vec())
    }

    fn compile_shader(&mut self, label: &str, source: &str) -> Result<ShaderHandle, GpuError> {
        for entry_point in ["fn vs_main", "fn fs_main"] {
            if !source.contains(entry_point) {
                return Err(GpuError::ShaderCompilation {
                    label: label.to_string(),
                    reason: format!("missing entry point `{}`", &entry_point[3..]),
                });
            }
        }
        self.pipelines.push(label.to_string());
        Ok(ShaderHandle(self.pipelines.len() as u32 - 1))
    }

    fn load_texture(&mut self, path: &Path) -> Result<TextureHandle, GpuError> {
        image::image_dimensions(path).map_err(|e| GpuError::TextureLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.textures.push(path.to_path_buf());
        Ok(TextureHandle(self.textures.len() as u32 - 1))
    }

    fn draw_indirect(&mut self, draw: &IndirectDraw) -> Result<DrawStats, GpuError> {
        if draw.pipeline.0 as usize >= self.pipelines.len() {
            return Err(GpuError::UnknownPipeline(draw.pipeline.0));
        }
        self.buffer(draw.camera)?;
        self.buffer(draw.groups)?;
        let face_bytes = self.buffer(draw.faces)?.bytes.len() as u64;
        let indirect = self.buffer(draw.indirect)?;
        Self::check_range(indirect, 0, draw.draw_count as u64 * DRAW_COMMAND_SIZE)?;

        let stats = walk_commands(&indirect.bytes, draw.draw_count, face_bytes)?;

        self.draws += 1;
        self.last_draw = Some(stats);
        Ok(stats)
    }
}
