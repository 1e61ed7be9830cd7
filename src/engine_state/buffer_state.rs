//! # Buffer State Module
//!
//! This module provides a centralized registry of the GPU buffers the pipeline
//! owns. It handles buffer creation, writing, growth and read-back on top of a
//! [`GpuBackend`], and keeps usage analytics for every buffer.
//!
//! ## Key Features
//!
//! * Buffers referenced by name instead of raw handles
//! * Bounds-checked writes that report errors instead of panicking
//! * Growth that preserves contents (create, copy, destroy)
//! * Per-buffer memory analytics
//!
//! ## Architecture
//!
//! The `BufferState` is owned by the render thread together with the backend it
//! wraps. Everything that touches the device goes through it, so the analytics
//! always reflect what is actually allocated.

use std::collections::HashMap;

use log::debug;

use crate::engine_state::{
    error::GpuError,
    rendering::backend::{BufferDescriptor, BufferHandle, GpuBackend},
};

/// Analytics data for a GPU buffer
///
/// Tracks memory allocation, usage, and write operations for a buffer
/// to help identify optimization opportunities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferAnalytics {
    /// Total memory allocated for the buffer in bytes
    pub allocated_memory: u64,
    /// Highest byte ever written, i.e. the used prefix of the buffer
    pub used_memory: u64,
    /// Number of times the buffer has been written to
    pub times_written: u64,
}

struct BufferEntry {
    handle: BufferHandle,
    usage: wgpu::BufferUsages,
    analytics: BufferAnalytics,
}

/// Central manager for GPU buffers.
///
/// # Examples
///
/// ```
/// use voxel_streamer::engine_state::buffer_state::BufferState;
/// use voxel_streamer::engine_state::rendering::backend::HeadlessBackend;
///
/// let mut buffer_state = BufferState::new(Box::new(HeadlessBackend::new()));
/// buffer_state
///     .create_buffer("uniforms", 64, wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST)
///     .unwrap();
/// buffer_state.write_buffer("uniforms", 0, &[0u8; 16]).unwrap();
/// assert_eq!(buffer_state.get_total_used_memory(), 16);
/// ```
pub struct BufferState {
    backend: Box<dyn GpuBackend>,
    buffers: HashMap<&'static str, BufferEntry>,
}

impl BufferState {
    /// Creates a new buffer state manager over `backend`.
    pub fn new(backend: Box<dyn GpuBackend>) -> Self {
        Self {
            backend,
            buffers: HashMap::new(),
        }
    }

    /// Creates a zeroed buffer, replacing any buffer of the same name.
    ///
    /// # Errors
    /// [`GpuError::OutOfMemory`] from the backend; the previous buffer of that
    /// name, if any, is left in place.
    pub fn create_buffer(
        &mut self,
        buffer_name: &'static str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> Result<(), GpuError> {
        let handle = self.backend.create_buffer(&BufferDescriptor {
            label: buffer_name,
            size,
            usage,
        })?;

        let entry = BufferEntry {
            handle,
            usage,
            analytics: BufferAnalytics {
                allocated_memory: size,
                ..Default::default()
            },
        };
        if let Some(old) = self.buffers.insert(buffer_name, entry) {
            self.backend.destroy_buffer(old.handle);
        }
        Ok(())
    }

    /// Writes raw bytes at `offset`.
    ///
    /// # Errors
    /// [`GpuError::UnknownBuffer`] or [`GpuError::WriteOutOfBounds`].
    pub fn write_buffer(
        &mut self,
        buffer_name: &'static str,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let entry = self
            .buffers
            .get_mut(buffer_name)
            .ok_or_else(|| GpuError::UnknownBuffer(buffer_name.to_string()))?;

        let size = entry.analytics.allocated_memory;
        let len = data.len() as u64;
        if offset + len > size {
            return Err(GpuError::WriteOutOfBounds {
                label: buffer_name.to_string(),
                offset,
                len,
                size,
            });
        }

        self.backend.write_buffer(entry.handle, offset, data)?;
        entry.analytics.used_memory = entry.analytics.used_memory.max(offset + len);
        entry.analytics.times_written += 1;
        Ok(())
    }

    /// Replaces a buffer by a larger one holding the same bytes.
    ///
    /// The new buffer is created before the old one is released, so a failed
    /// growth leaves the original intact and usable.
    pub fn grow_buffer(&mut self, buffer_name: &'static str, new_size: u64) -> Result<(), GpuError> {
        let entry = self
            .buffers
            .get(buffer_name)
            .ok_or_else(|| GpuError::UnknownBuffer(buffer_name.to_string()))?;
        let old_size = entry.analytics.allocated_memory;
        if new_size <= old_size {
            return Ok(());
        }

        let (old_handle, usage) = (entry.handle, entry.usage);
        let new_handle = self.backend.create_buffer(&BufferDescriptor {
            label: buffer_name,
            size: new_size,
            usage,
        })?;
        if let Err(e) = self
            .backend
            .copy_buffer(old_handle, 0, new_handle, 0, old_size)
        {
            self.backend.destroy_buffer(new_handle);
            return Err(e);
        }
        self.backend.destroy_buffer(old_handle);

        if let Some(entry) = self.buffers.get_mut(buffer_name) {
            entry.handle = new_handle;
            entry.analytics.allocated_memory = new_size;
        }
        debug!("grew buffer '{}' {} -> {} bytes", buffer_name, old_size, new_size);
        Ok(())
    }

    /// Reads bytes back from a buffer.
    pub fn read_buffer(
        &mut self,
        buffer_name: &'static str,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GpuError> {
        let handle = self.get_buffer(buffer_name)?;
        self.backend.read_buffer(handle, offset, size)
    }

    /// Current handle of a buffer. Changes when the buffer grows.
    pub fn get_buffer(&self, buffer_name: &'static str) -> Result<BufferHandle, GpuError> {
        self.buffers
            .get(buffer_name)
            .map(|entry| entry.handle)
            .ok_or_else(|| GpuError::UnknownBuffer(buffer_name.to_string()))
    }

    /// Allocated size of a buffer in bytes.
    pub fn buffer_size(&self, buffer_name: &'static str) -> Option<u64> {
        self.buffers
            .get(buffer_name)
            .map(|entry| entry.analytics.allocated_memory)
    }

    /// Analytics snapshot of one buffer.
    pub fn analytics(&self, buffer_name: &'static str) -> Option<BufferAnalytics> {
        self.buffers.get(buffer_name).map(|entry| entry.analytics)
    }

    /// Releases a buffer. Unknown names are ignored.
    pub fn destroy_buffer(&mut self, buffer_name: &'static str) {
        if let Some(entry) = self.buffers.remove(buffer_name) {
            self.backend.destroy_buffer(entry.handle);
        }
    }

    /// Gets the total allocated memory across all buffers
    pub fn get_total_allocated_memory(&self) -> u64 {
        self.buffers
            .values()
            .fold(0, |acc, entry| acc + entry.analytics.allocated_memory)
    }

    /// Gets the total used memory across all buffers
    pub fn get_total_used_memory(&self) -> u64 {
        self.buffers
            .values()
            .fold(0, |acc, entry| acc + entry.analytics.used_memory)
    }

    /// The backend, for calls that are not about named buffers.
    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend.as_ref()
    }

    /// Mutable access to the backend.
    pub fn backend_mut(&mut self) -> &mut dyn GpuBackend {
        self.backend.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::rendering::backend::HeadlessBackend;

    const USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
        .union(wgpu::BufferUsages::COPY_DST)
        .union(wgpu::BufferUsages::COPY_SRC);

    #[test]
    fn growth_preserves_contents() {
        let mut state = BufferState::new(Box::new(HeadlessBackend::new()));
        state.create_buffer("faces", 16, USAGE).unwrap();
        state.write_buffer("faces", 8, &[9, 8, 7, 6]).unwrap();
        let before = state.get_buffer("faces").unwrap();

        state.grow_buffer("faces", 64).unwrap();

        assert_ne!(state.get_buffer("faces").unwrap(), before);
        assert_eq!(state.buffer_size("faces"), Some(64));
        assert_eq!(state.read_buffer("faces", 8, 4).unwrap(), vec![9, 8, 7, 6]);
        assert_eq!(state.get_total_allocated_memory(), 64);
    }

    #[test]
    fn failed_growth_keeps_the_old_buffer() {
        let mut state = BufferState::new(Box::new(HeadlessBackend::with_memory_limit(100)));
        state.create_buffer("faces", 64, USAGE).unwrap();
        state.write_buffer("faces", 0, &[1, 2, 3, 4]).unwrap();

        assert!(matches!(
            state.grow_buffer("faces", 96),
            Err(GpuError::OutOfMemory { .. })
        ));
        assert_eq!(state.buffer_size("faces"), Some(64));
        assert_eq!(state.read_buffer("faces", 0, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn writes_are_bounds_checked_and_counted() {
        let mut state = BufferState::new(Box::new(HeadlessBackend::new()));
        state.create_buffer("camera", 32, USAGE).unwrap();
        assert!(state.write_buffer("camera", 24, &[0; 16]).is_err());
        assert!(state.write_buffer("missing", 0, &[0; 4]).is_err());

        state.write_buffer("camera", 0, &[0; 16]).unwrap();
        state.write_buffer("camera", 4, &[0; 4]).unwrap();
        let analytics = state.analytics("camera").unwrap();
        assert_eq!(analytics.times_written, 2);
        assert_eq!(analytics.used_memory, 16);
    }
}
