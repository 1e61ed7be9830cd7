//! GPU-resident mesh storage for voxel chunks.
//!
//! This module turns mesher output into draw-ready GPU state and draws all of
//! it with a single multi-draw-indirect call. The goals are:
//! 1. One draw call per frame no matter how many chunks are resident
//! 2. Handles that stay valid while the backing buffers grow
//! 3. Per-chunk and per-face-direction culling without touching face data
//!
//! # Architecture
//! - [`MeshSlotAllocator`]: handle allocation, upload, free and render
//! - [`SparseSet`](sparse_set::SparseSet): the set of live handles
//! - [`FaceRegions`](face_regions::FaceRegions): first-fit regions of the shared face buffer
//! - `mesh/`: the greedy mesher producing the quads
//!
//! # Buffer Layout
//! Every handle owns six face groups, one per [`BlockSide`]. Group `g` of
//! handle `h` lives at index `h * 6 + g` of both the face group uniform buffer
//! and the indirect command buffer, so growing those buffers never moves a
//! handle. Quads live in one contiguous region of the face buffer per handle,
//! ordered by side.
//!
//! # Performance Considerations
//! - Culling only rewrites the 16-byte commands whose visibility flipped
//! - Freed handles are recycled before the buffers grow
//! - Growth is geometric (x1.5) and copies on the device timeline

use cgmath::{Matrix4, Point3, Transform};
use log::{debug, error, info, warn};

pub mod face_regions;
pub mod mesh;
pub mod sparse_set;

pub use mesh::*;

use face_regions::{FaceRegions, Region};
use sparse_set::SparseSet;

use crate::engine_state::{
    buffer_state::BufferState,
    camera_state::{
        camera::{eye_position, CameraUniform},
        frustum::Frustum,
        CAMERA_BUFFER_NAME,
    },
    config::AllocatorConfig,
    error::GpuError,
    rendering::backend::{DrawCommand, IndirectDraw, ShaderHandle, DRAW_COMMAND_SIZE, QUAD_SIZE},
    voxels::{block::block_side::BlockSide, chunk::CHUNK_DIMENSION},
};

/// Name of the packed quad storage buffer.
pub const FACE_BUFFER_NAME: &str = "face_buffer";
/// Name of the per face group uniform storage buffer.
pub const FACE_GROUP_BUFFER_NAME: &str = "face_group_buffer";
/// Name of the indirect draw command buffer.
pub const INDIRECT_BUFFER_NAME: &str = "indirect_buffer";

/// Face groups per handle, one per block side.
const GROUPS_PER_HANDLE: u32 = 6;

/// Per face group data addressed by `first_instance`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FaceGroupUniform {
    /// Chunk model matrix.
    pub model: [[f32; 4]; 4],
    /// Face normal in xyz, voxel scale in w.
    pub normal: [f32; 4],
}

const FACE_GROUP_SIZE: u64 = std::mem::size_of::<FaceGroupUniform>() as u64;

/// Stable identifier of one chunk mesh on the GPU.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(u32);

impl MeshHandle {
    /// The raw index.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// What one frame drew.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Handles with a live mesh.
    pub live_handles: u32,
    /// Live handles whose bounds intersect the frustum.
    pub visible_handles: u32,
    /// Live handles rejected by the frustum.
    pub culled_handles: u32,
    /// Face groups with a non-zero draw.
    pub drawn_groups: u32,
    /// Quads drawn.
    pub quads_drawn: u64,
    /// Indirect commands rewritten because visibility changed.
    pub commands_rewritten: u32,
}

/// Occupancy snapshot of the allocator.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Handles with a live mesh.
    pub live_handles: u32,
    /// Freed handles waiting for reuse.
    pub free_handles: u32,
    /// Handles the group and command buffers can hold.
    pub handle_capacity: u32,
    /// Quads currently uploaded.
    pub resident_quads: u64,
    /// Quads the face buffer can hold.
    pub face_capacity: u32,
    /// Face buffer quads not owned by any handle.
    pub free_face_quads: u32,
    /// Bytes allocated over all buffers.
    pub allocated_bytes: u64,
    /// Bytes ever written over all buffers.
    pub used_bytes: u64,
}

#[derive(Clone, Debug)]
struct MeshSlot {
    region: Option<Region>,
    quads: u32,
    bounds: (Point3<f32>, Point3<f32>),
    commands: [DrawCommand; 6],
}

impl MeshSlot {
    fn empty() -> Self {
        Self {
            region: None,
            quads: 0,
            bounds: (Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0)),
            commands: [DrawCommand::default(); 6],
        }
    }
}

/// GPU mesh storage keyed by stable handles.
///
/// Owned by the render thread. Producers reach it only through commands posted
/// on the render-sync bridge.
pub struct MeshSlotAllocator {
    buffer_state: BufferState,
    pipeline: ShaderHandle,
    slots: Vec<MeshSlot>,
    live: SparseSet,
    free_handles: Vec<u32>,
    minted: u32,
    handle_capacity: u32,
    regions: FaceRegions,
}

fn grown(value: u32) -> u32 {
    (value + value / 2).max(value + 1)
}

impl MeshSlotAllocator {
    /// Creates the shared buffers and compiles the quad pipeline.
    ///
    /// # Arguments
    /// * `buffer_state` - Registry over the backend the allocator draws with
    /// * `config` - Initial handle and face capacities
    /// * `shader_source` - WGSL source of the quad shader
    pub fn new(
        mut buffer_state: BufferState,
        config: &AllocatorConfig,
        shader_source: &str,
    ) -> Result<Self, GpuError> {
        let handle_capacity = config.initial_slots.max(1);
        let face_capacity = FaceRegions::rounded(config.initial_face_capacity.max(1));
        let growable = wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;

        buffer_state.create_buffer(
            CAMERA_BUFFER_NAME,
            std::mem::size_of::<CameraUniform>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        )?;
        buffer_state.create_buffer(
            FACE_BUFFER_NAME,
            face_capacity as u64 * QUAD_SIZE,
            wgpu::BufferUsages::STORAGE | growable,
        )?;
        buffer_state.create_buffer(
            FACE_GROUP_BUFFER_NAME,
            Self::group_bytes(handle_capacity),
            wgpu::BufferUsages::STORAGE | growable,
        )?;
        buffer_state.create_buffer(
            INDIRECT_BUFFER_NAME,
            Self::command_bytes(handle_capacity),
            wgpu::BufferUsages::INDIRECT | growable,
        )?;

        let pipeline = buffer_state
            .backend_mut()
            .compile_shader("quad_shader", shader_source)?;

        info!(
            "mesh slot allocator ready on '{}' backend: {} handles, {} quads",
            buffer_state.backend().name(),
            handle_capacity,
            face_capacity
        );

        Ok(Self {
            buffer_state,
            pipeline,
            slots: Vec::new(),
            live: SparseSet::new(),
            free_handles: Vec::new(),
            minted: 0,
            handle_capacity,
            regions: FaceRegions::new(face_capacity),
        })
    }

    fn group_bytes(handles: u32) -> u64 {
        handles as u64 * GROUPS_PER_HANDLE as u64 * FACE_GROUP_SIZE
    }

    fn command_bytes(handles: u32) -> u64 {
        handles as u64 * GROUPS_PER_HANDLE as u64 * DRAW_COMMAND_SIZE
    }

    fn command_offset(handle: u32) -> u64 {
        handle as u64 * GROUPS_PER_HANDLE as u64 * DRAW_COMMAND_SIZE
    }

    /// Returns a handle with an empty mesh.
    ///
    /// Freed handles are reused first. Otherwise a new handle is minted,
    /// growing every backing buffer by half when the current capacity is used
    /// up. Growth copies existing contents, so all other handles keep their
    /// data exactly.
    ///
    /// # Errors
    /// [`GpuError::OutOfMemory`] when the buffers cannot grow. The allocator
    /// is unchanged in that case.
    pub fn allocate(&mut self) -> Result<MeshHandle, GpuError> {
        let handle = match self.free_handles.pop() {
            Some(handle) => handle,
            None => {
                if self.minted == self.handle_capacity {
                    self.grow_handles().inspect_err(|e| error!("{}", e))?;
                }
                self.minted += 1;
                self.slots.push(MeshSlot::empty());
                self.minted - 1
            }
        };

        self.live.insert(handle);
        Ok(MeshHandle(handle))
    }

    fn grow_handles(&mut self) -> Result<(), GpuError> {
        let handle_capacity = grown(self.handle_capacity);
        let face_capacity = FaceRegions::rounded(grown(self.regions.capacity()));

        self.buffer_state
            .grow_buffer(FACE_GROUP_BUFFER_NAME, Self::group_bytes(handle_capacity))?;
        self.buffer_state
            .grow_buffer(INDIRECT_BUFFER_NAME, Self::command_bytes(handle_capacity))?;
        self.buffer_state
            .grow_buffer(FACE_BUFFER_NAME, face_capacity as u64 * QUAD_SIZE)?;

        debug!(
            "grew mesh slots {} -> {} handles, face buffer {} -> {} quads",
            self.handle_capacity,
            handle_capacity,
            self.regions.capacity(),
            face_capacity
        );
        self.handle_capacity = handle_capacity;
        self.regions.grow(face_capacity);
        Ok(())
    }

    /// Replaces the mesh stored under `handle`.
    ///
    /// Writes the quads into the handle's face region, the six face group
    /// uniforms and the six indirect commands. A mesh larger than the current
    /// region moves to a new region, growing the face buffer if no free
    /// region fits.
    ///
    /// # Errors
    /// [`GpuError::InvalidHandle`] for a handle that is not live, and
    /// [`GpuError::OutOfMemory`] when the face buffer cannot grow, and any
    /// failed buffer write. The handle keeps its previous region in every
    /// error case.
    pub fn upload(
        &mut self,
        handle: MeshHandle,
        mesh: &ChunkMesh,
        model: Matrix4<f32>,
    ) -> Result<(), GpuError> {
        let index = handle.0;
        if !self.live.contains(index) {
            return Err(GpuError::InvalidHandle(index));
        }

        let total: u32 = mesh.side_counts().iter().sum();
        let current = self.slots[index as usize].region;

        let region = match current {
            _ if total == 0 => None,
            Some(region) if region.len >= total => Some(region),
            _ => Some(self.take_region(total).inspect_err(|e| error!("{}", e))?),
        };

        let commands = match self.write_mesh(index, region, mesh, model) {
            Ok(commands) => commands,
            Err(e) => {
                // The slot still owns `current`; only a freshly taken region goes back.
                if let Some(fresh) = region.filter(|r| Some(*r) != current) {
                    self.regions.release(fresh);
                }
                error!("upload to mesh handle {} failed: {}", index, e);
                return Err(e);
            }
        };
        if let Some(old) = current {
            if region != Some(old) {
                self.regions.release(old);
            }
        }

        let edge = CHUNK_DIMENSION as f32;
        let a = model.transform_point(Point3::new(0.0, 0.0, 0.0));
        let b = model.transform_point(Point3::new(edge, edge, edge));
        let slot = &mut self.slots[index as usize];
        slot.region = region;
        slot.quads = total;
        slot.bounds = (
            Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        );
        slot.commands = commands;
        Ok(())
    }

    /// Writes quads, group uniforms and indirect commands for one handle.
    fn write_mesh(
        &mut self,
        index: u32,
        region: Option<Region>,
        mesh: &ChunkMesh,
        model: Matrix4<f32>,
    ) -> Result<[DrawCommand; 6], GpuError> {
        let counts = mesh.side_counts();
        let mut commands = [DrawCommand::default(); 6];
        if let Some(region) = region {
            let mut quads = Vec::with_capacity(counts.iter().sum::<u32>() as usize);
            for side in BlockSide::all() {
                let start = quads.len() as u32;
                quads.extend_from_slice(mesh.side(side));
                let count = counts[side as usize];
                if count > 0 {
                    commands[side as usize] = DrawCommand {
                        vertex_count: count * 6,
                        instance_count: 1,
                        first_vertex: (region.offset + start) * 6,
                        first_instance: index * GROUPS_PER_HANDLE + side as u32,
                    };
                }
            }
            self.buffer_state.write_buffer(
                FACE_BUFFER_NAME,
                region.offset as u64 * QUAD_SIZE,
                bytemuck::cast_slice(&quads),
            )?;
        }

        let scale = model.x.x;
        let groups = BlockSide::all().map(|side| {
            let normal = side.normal();
            FaceGroupUniform {
                model: model.into(),
                normal: [normal.x, normal.y, normal.z, scale],
            }
        });
        self.buffer_state.write_buffer(
            FACE_GROUP_BUFFER_NAME,
            Self::group_bytes(index),
            bytemuck::cast_slice(&groups),
        )?;
        self.buffer_state.write_buffer(
            INDIRECT_BUFFER_NAME,
            Self::command_offset(index),
            bytemuck::cast_slice(&commands),
        )?;
        Ok(commands)
    }

    /// A free region of at least `quads`, growing the face buffer if needed.
    fn take_region(&mut self, quads: u32) -> Result<Region, GpuError> {
        if let Some(region) = self.regions.allocate(quads) {
            return Ok(region);
        }

        let capacity = self.regions.capacity();
        let needed = FaceRegions::rounded(quads);
        let new_capacity = FaceRegions::rounded(grown(capacity).max(capacity + needed));
        self.buffer_state
            .grow_buffer(FACE_BUFFER_NAME, new_capacity as u64 * QUAD_SIZE)?;
        self.regions.grow(new_capacity);
        debug!("grew face buffer {} -> {} quads", capacity, new_capacity);

        self.regions.allocate(quads).ok_or(GpuError::OutOfMemory {
            label: FACE_BUFFER_NAME.to_string(),
            requested: needed as u64 * QUAD_SIZE,
        })
    }

    /// Releases `handle`.
    ///
    /// Its six commands are zeroed before anything else, so the handle draws
    /// nothing from the next frame on, and it goes back on the free stack.
    pub fn free(&mut self, handle: MeshHandle) -> Result<(), GpuError> {
        let index = handle.0;
        if !self.live.contains(index) {
            warn!("free of mesh handle {} which is not live", index);
            return Err(GpuError::InvalidHandle(index));
        }

        let zeroed = [DrawCommand::default(); 6];
        self.buffer_state.write_buffer(
            INDIRECT_BUFFER_NAME,
            Self::command_offset(index),
            bytemuck::cast_slice(&zeroed),
        )?;

        let slot = std::mem::replace(&mut self.slots[index as usize], MeshSlot::empty());
        if let Some(region) = slot.region {
            self.regions.release(region);
        }
        self.live.remove(index);
        self.free_handles.push(index);
        Ok(())
    }

    /// Draws every live handle.
    ///
    /// Uploads the camera, culls each live handle against the frustum of
    /// `projection * view` and each of its face groups against the eye
    /// position, rewrites the commands whose visibility changed and issues one
    /// multi-draw covering every handle ever minted.
    pub fn render(
        &mut self,
        view: Matrix4<f32>,
        projection: Matrix4<f32>,
    ) -> Result<FrameStats, GpuError> {
        let camera = CameraUniform::from_matrices(view, projection);
        self.buffer_state
            .write_buffer(CAMERA_BUFFER_NAME, 0, bytemuck::cast_slice(&[camera]))?;

        let frustum = Frustum::new(projection * view);
        let eye = eye_position(view);
        let mut stats = FrameStats {
            live_handles: self.live.len() as u32,
            ..Default::default()
        };

        for index in self.live.iter() {
            let slot = &mut self.slots[index as usize];
            let (min, max) = slot.bounds;
            let in_frustum = slot.quads > 0 && frustum.is_visible(min, max);
            if in_frustum {
                stats.visible_handles += 1;
            } else {
                stats.culled_handles += 1;
            }

            for side in BlockSide::all() {
                let command = &mut slot.commands[side as usize];
                if command.vertex_count == 0 {
                    continue;
                }
                let visible = (in_frustum && side.faces_camera(eye, min, max)) as u32;
                if command.instance_count != visible {
                    command.instance_count = visible;
                    self.buffer_state.write_buffer(
                        INDIRECT_BUFFER_NAME,
                        Self::command_offset(index) + side as u64 * DRAW_COMMAND_SIZE,
                        bytemuck::bytes_of(command),
                    )?;
                    stats.commands_rewritten += 1;
                }
            }
        }

        let draw = IndirectDraw {
            pipeline: self.pipeline,
            camera: self.buffer_state.get_buffer(CAMERA_BUFFER_NAME)?,
            faces: self.buffer_state.get_buffer(FACE_BUFFER_NAME)?,
            groups: self.buffer_state.get_buffer(FACE_GROUP_BUFFER_NAME)?,
            indirect: self.buffer_state.get_buffer(INDIRECT_BUFFER_NAME)?,
            draw_count: self.minted * GROUPS_PER_HANDLE,
        };
        let drawn = self
            .buffer_state
            .backend_mut()
            .draw_indirect(&draw)
            .inspect_err(|e| error!("{}", e))?;

        stats.drawn_groups = drawn.drawn_groups;
        stats.quads_drawn = drawn.quads;
        Ok(stats)
    }

    /// Whether `handle` currently holds a mesh slot.
    pub fn is_live(&self, handle: MeshHandle) -> bool {
        self.live.contains(handle.0)
    }

    /// The cached indirect command of one face group.
    pub fn draw_command(&self, handle: MeshHandle, side: BlockSide) -> Option<DrawCommand> {
        self.live
            .contains(handle.0)
            .then(|| self.slots[handle.0 as usize].commands[side as usize])
    }

    /// The face buffer region owned by `handle`, if it has any quads.
    pub fn region(&self, handle: MeshHandle) -> Option<Region> {
        self.slots.get(handle.0 as usize).and_then(|slot| slot.region)
    }

    /// Current occupancy.
    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            live_handles: self.live.len() as u32,
            free_handles: self.free_handles.len() as u32,
            handle_capacity: self.handle_capacity,
            resident_quads: self
                .live
                .iter()
                .map(|index| self.slots[index as usize].quads as u64)
                .sum(),
            face_capacity: self.regions.capacity(),
            free_face_quads: self.regions.free_quads(),
            allocated_bytes: self.buffer_state.get_total_allocated_memory(),
            used_bytes: self.buffer_state.get_total_used_memory(),
        }
    }

    /// The buffer registry, for read-back and analytics.
    pub fn buffer_state(&self) -> &BufferState {
        &self.buffer_state
    }

    /// Mutable buffer registry, e.g. for texture loading through its backend.
    pub fn buffer_state_mut(&mut self) -> &mut BufferState {
        &mut self.buffer_state
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Vector3};

    use super::*;
    use crate::engine_state::rendering::{backend::HeadlessBackend, QUAD_SHADER};

    fn allocator(backend: HeadlessBackend, initial_slots: u32, face_capacity: u32) -> MeshSlotAllocator {
        let config = AllocatorConfig {
            initial_slots,
            initial_face_capacity: face_capacity,
        };
        MeshSlotAllocator::new(BufferState::new(Box::new(backend)), &config, QUAD_SHADER).unwrap()
    }

    fn mesh_with(counts: [u32; 6]) -> ChunkMesh {
        let mut mesh = ChunkMesh::new();
        for side in BlockSide::all() {
            for x in 0..counts[side as usize] {
                mesh.quads[side as usize].push(
                    Quad {
                        x,
                        y: side as u32,
                        z: 0,
                        size_u: 1,
                        size_v: 2,
                        side,
                        texture: 3,
                        ao: AO_UNOCCLUDED,
                    }
                    .pack(),
                );
            }
        }
        mesh
    }

    fn at(x: f32, y: f32, z: f32) -> Matrix4<f32> {
        Matrix4::from_translation(Vector3::new(x, y, z))
    }

    fn read(allocator: &mut MeshSlotAllocator, name: &'static str, offset: u64, size: u64) -> Vec<u8> {
        allocator
            .buffer_state_mut()
            .read_buffer(name, offset, size)
            .unwrap()
    }

    #[test]
    fn freed_handles_are_reused_without_growth() {
        let mut allocator = allocator(HeadlessBackend::new(), 4, 64);
        let a = allocator.allocate().unwrap();
        let b = allocator.allocate().unwrap();
        let faces = allocator.buffer_state().get_buffer(FACE_BUFFER_NAME).unwrap();

        allocator.free(a).unwrap();
        let c = allocator.allocate().unwrap();

        assert_eq!(c, a);
        assert_ne!(c, b);
        assert_eq!(allocator.stats().handle_capacity, 4);
        assert_eq!(allocator.stats().free_handles, 0);
        assert_eq!(allocator.buffer_state().get_buffer(FACE_BUFFER_NAME).unwrap(), faces);
    }

    #[test]
    fn growth_preserves_uploaded_bytes() {
        let mut allocator = allocator(HeadlessBackend::new(), 2, 32);
        let first = allocator.allocate().unwrap();
        allocator
            .upload(first, &mesh_with([1, 0, 2, 0, 0, 0]), at(32.0, 0.0, -64.0))
            .unwrap();
        let region = allocator.region(first).unwrap();

        let faces_before = read(&mut allocator, FACE_BUFFER_NAME, region.offset as u64 * QUAD_SIZE, 3 * QUAD_SIZE);
        let groups_before = read(&mut allocator, FACE_GROUP_BUFFER_NAME, 0, 6 * FACE_GROUP_SIZE);
        let commands_before = read(&mut allocator, INDIRECT_BUFFER_NAME, 0, 6 * DRAW_COMMAND_SIZE);

        allocator.allocate().unwrap();
        allocator.allocate().unwrap();
        assert_eq!(allocator.stats().handle_capacity, 3);

        assert_eq!(read(&mut allocator, FACE_BUFFER_NAME, region.offset as u64 * QUAD_SIZE, 3 * QUAD_SIZE), faces_before);
        assert_eq!(read(&mut allocator, FACE_GROUP_BUFFER_NAME, 0, 6 * FACE_GROUP_SIZE), groups_before);
        assert_eq!(read(&mut allocator, INDIRECT_BUFFER_NAME, 0, 6 * DRAW_COMMAND_SIZE), commands_before);
        assert_eq!(allocator.region(first), Some(region));
    }

    #[test]
    fn out_of_memory_propagates_and_keeps_state() {
        // Camera 144 + faces 256 + groups 960 + commands 192 bytes fit, the
        // first growth does not.
        let mut allocator = allocator(HeadlessBackend::with_memory_limit(1800), 2, 32);
        allocator.allocate().unwrap();
        allocator.allocate().unwrap();

        let result = allocator.allocate();
        assert!(matches!(result, Err(GpuError::OutOfMemory { .. })));

        let stats = allocator.stats();
        assert_eq!(stats.live_handles, 2);
        assert_eq!(stats.handle_capacity, 2);
        assert_eq!(stats.face_capacity, 32);
    }

    #[test]
    fn upload_out_of_memory_keeps_the_previous_mesh() {
        let mut allocator = allocator(HeadlessBackend::with_memory_limit(1800), 2, 32);
        let handle = allocator.allocate().unwrap();
        allocator
            .upload(handle, &mesh_with([4, 0, 0, 0, 0, 0]), Matrix4::from_scale(1.0))
            .unwrap();
        let region = allocator.region(handle);

        let result = allocator.upload(handle, &mesh_with([40, 0, 0, 0, 0, 0]), Matrix4::from_scale(1.0));
        assert!(matches!(result, Err(GpuError::OutOfMemory { .. })));
        assert_eq!(allocator.region(handle), region);
        assert_eq!(allocator.stats().resident_quads, 4);
    }

    #[test]
    fn failed_upload_keeps_region_ownership_consistent() {
        let mut allocator = allocator(HeadlessBackend::new(), 2, 256);
        let handle = allocator.allocate().unwrap();
        allocator
            .upload(handle, &mesh_with([4, 0, 0, 0, 0, 0]), Matrix4::from_scale(1.0))
            .unwrap();
        let region = allocator.region(handle);
        let free_before = allocator.stats().free_face_quads;

        // The face write lands in a new region, then the group write fails.
        allocator.buffer_state.destroy_buffer(FACE_GROUP_BUFFER_NAME);
        for _ in 0..2 {
            let result = allocator.upload(handle, &mesh_with([40, 0, 0, 0, 0, 0]), Matrix4::from_scale(1.0));
            assert!(matches!(result, Err(GpuError::UnknownBuffer(_))));
            assert_eq!(allocator.region(handle), region);
            assert_eq!(allocator.stats().free_face_quads, free_before);
        }

        allocator.free(handle).unwrap();
        let stats = allocator.stats();
        assert_eq!(stats.free_face_quads, stats.face_capacity);
    }

    #[test]
    fn free_zeroes_the_draw_commands() {
        let mut allocator = allocator(HeadlessBackend::new(), 4, 64);
        allocator.allocate().unwrap();
        let handle = allocator.allocate().unwrap();
        allocator
            .upload(handle, &mesh_with([1, 1, 1, 1, 1, 1]), Matrix4::from_scale(1.0))
            .unwrap();
        assert_eq!(
            allocator.draw_command(handle, BlockSide::TOP).unwrap().vertex_count,
            6
        );

        allocator.free(handle).unwrap();

        let offset = handle.index() as u64 * 6 * DRAW_COMMAND_SIZE;
        let bytes = read(&mut allocator, INDIRECT_BUFFER_NAME, offset, 6 * DRAW_COMMAND_SIZE);
        assert!(bytes.iter().all(|&b| b == 0));
        assert_eq!(allocator.draw_command(handle, BlockSide::TOP), None);
        assert_eq!(allocator.stats().free_face_quads, 64);
        assert!(!allocator.is_live(handle));
        assert!(matches!(allocator.free(handle), Err(GpuError::InvalidHandle(_))));
    }

    #[test]
    fn upload_writes_commands_and_group_uniforms() {
        let mut allocator = allocator(HeadlessBackend::new(), 4, 64);
        allocator.allocate().unwrap();
        let handle = allocator.allocate().unwrap();
        let model = at(64.0, 0.0, 0.0) * Matrix4::from_scale(2.0);
        allocator
            .upload(handle, &mesh_with([2, 0, 3, 0, 0, 1]), model)
            .unwrap();
        let region = allocator.region(handle).unwrap();

        let bottom = allocator.draw_command(handle, BlockSide::BOTTOM).unwrap();
        assert_eq!(bottom.vertex_count, 18);
        assert_eq!(bottom.instance_count, 1);
        assert_eq!(bottom.first_vertex, (region.offset + 2) * 6);
        assert_eq!(bottom.first_instance, handle.index() * 6 + BlockSide::BOTTOM as u32);
        assert_eq!(allocator.draw_command(handle, BlockSide::BACK), Some(DrawCommand::default()));

        let offset = handle.index() as u64 * 6 * FACE_GROUP_SIZE + BlockSide::RIGHT as u64 * FACE_GROUP_SIZE;
        let bytes = read(&mut allocator, FACE_GROUP_BUFFER_NAME, offset, FACE_GROUP_SIZE);
        let group: FaceGroupUniform = bytemuck::pod_read_unaligned(&bytes);
        let model: [[f32; 4]; 4] = model.into();
        assert_eq!(group.model, model);
        assert_eq!(group.normal, [1.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn larger_mesh_grows_the_face_buffer() {
        let mut allocator = allocator(HeadlessBackend::new(), 2, 32);
        let handle = allocator.allocate().unwrap();
        allocator
            .upload(handle, &mesh_with([10, 0, 0, 0, 0, 0]), Matrix4::from_scale(1.0))
            .unwrap();
        allocator
            .upload(handle, &mesh_with([40, 0, 0, 0, 0, 0]), Matrix4::from_scale(1.0))
            .unwrap();

        let stats = allocator.stats();
        assert_eq!(stats.face_capacity, 96);
        assert_eq!(stats.resident_quads, 40);
        assert_eq!(allocator.region(handle).unwrap().len, 64);
        assert_eq!(stats.free_face_quads, 32);
    }

    #[test]
    fn upload_to_a_dead_handle_is_rejected() {
        let mut allocator = allocator(HeadlessBackend::new(), 2, 32);
        let handle = allocator.allocate().unwrap();
        allocator.free(handle).unwrap();
        let result = allocator.upload(handle, &mesh_with([1, 0, 0, 0, 0, 0]), Matrix4::from_scale(1.0));
        assert!(matches!(result, Err(GpuError::InvalidHandle(0))));
    }

    #[test]
    fn render_culls_chunks_and_face_groups() {
        let mut allocator = allocator(HeadlessBackend::new(), 4, 64);
        let ahead = allocator.allocate().unwrap();
        let behind = allocator.allocate().unwrap();
        let every_side = mesh_with([1, 1, 1, 1, 1, 1]);
        allocator.upload(ahead, &every_side, at(-16.0, -16.0, -64.0)).unwrap();
        allocator.upload(behind, &every_side, at(-16.0, -16.0, 32.0)).unwrap();

        let view = Matrix4::look_to_rh(Point3::new(0.0, 0.0, 0.0), -Vector3::unit_z(), Vector3::unit_y());
        let projection = crate::engine_state::camera_state::camera::Projection::new(
            800,
            600,
            cgmath::Deg(70.0),
            0.1,
            500.0,
        )
        .calc_matrix();

        let stats = allocator.render(view, projection).unwrap();
        assert_eq!(stats.live_handles, 2);
        assert_eq!(stats.visible_handles, 1);
        assert_eq!(stats.culled_handles, 1);
        // The chunk ahead only hides its -z group, the one behind hides all six.
        assert_eq!(stats.commands_rewritten, 7);
        assert_eq!(stats.drawn_groups, 5);
        assert_eq!(stats.quads_drawn, 5);
        assert_eq!(
            allocator.draw_command(ahead, BlockSide::BACK).unwrap().instance_count,
            0
        );

        let again = allocator.render(view, projection).unwrap();
        assert_eq!(again.commands_rewritten, 0);
        assert_eq!(again.drawn_groups, 5);

        let camera = read(&mut allocator, CAMERA_BUFFER_NAME, 0, std::mem::size_of::<CameraUniform>() as u64);
        let camera: CameraUniform = bytemuck::pod_read_unaligned(&camera);
        assert!((camera.position() - Point3::new(0.0, 0.0, 0.0)).magnitude() < 1e-5);
    }

    #[test]
    fn grown_is_at_least_one_more() {
        assert_eq!(grown(0), 1);
        assert_eq!(grown(1), 2);
        assert_eq!(grown(4), 6);
    }
}
