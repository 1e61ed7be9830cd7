//! # Streaming
//!
//! Decides, tick by tick, which chunks are resident around a moving focal
//! point, generates and meshes them, and posts their geometry to the render
//! thread.
//!
//! ## Strategies
//! - [`LodRing`]: fixed rings of slots per level of detail. Slots never load
//!   or evict, they regenerate in place and keep their mesh handle, so the
//!   number of GPU handles is bounded by the ring sizes.
//! - [`Frontier`]: one flat level, every chunk within a radius. Chunks the
//!   generator proves empty are never loaded.
//!
//! A manager runs exactly one of them, picked by configuration.
//!
//! ## A pass
//! 1. Plan: ring regenerations or frontier loads/unloads, plus re-meshes of
//!    edited chunks
//! 2. Order by distance to the focal point and cut to the pass budget
//! 3. Prepare each operation (generate, mesh) holding the world lock for one
//!    chunk at a time, aborting if the focal point ran away
//! 4. Reserve the mesh handles the pass needs in one synchronous command
//! 5. Post uploads and frees through the bridge and publish the chunks
//!
//! Nothing here touches the GPU directly.

use std::collections::HashSet;
use std::sync::Arc;

use cgmath::{Matrix4, Point3};
use log::{debug, info, warn};

pub mod frontier;
pub mod lod_ring;
pub mod throttle;
pub mod worker;

pub use frontier::{Frontier, KnownEmptyCache};
pub use lod_ring::{LodRing, Regeneration};
pub use worker::{StreamingWorker, WorkerSummary};

use throttle::{pass_budget, sort_by_distance, PassGuard};

use crate::core::MtResource;
use crate::engine_state::{
    config::{BoundaryPolicy, MesherConfig, StreamingConfig, StreamingStrategy},
    error::BridgeError,
    render_sync::{RenderContext, RenderSyncBridge},
    rendering::{
        meshing::{greedy_mesh, ChunkMesh, MeshHandle, MeshScratch, MesherOptions},
        texture::TextureTable,
    },
    voxels::{
        chunk::{Chunk, CHUNK_DIMENSION},
        generator::VoxelGenerator,
        world::{ChunkKey, ResidentChunk, World},
    },
};

/// Chunks kept around for reuse after eviction.
const SPARE_CHUNKS: usize = 64;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Chunks generated into new residency (frontier).
    pub loads: usize,
    /// Chunks evicted (frontier).
    pub unloads: usize,
    /// Ring slots regenerated at a new coordinate.
    pub regenerations: usize,
    /// Edited chunks re-meshed.
    pub remeshes: usize,
    /// Chunks not generated because the generator proved them empty.
    pub skipped_empty: usize,
    /// Operations left for later ticks.
    pub pending: usize,
    /// Whether the focal point moved too far and the pass was cut short.
    pub aborted: bool,
}

impl TickReport {
    /// Operations executed.
    pub fn work_done(&self) -> usize {
        self.loads + self.unloads + self.regenerations + self.remeshes
    }

    /// Whether the tick neither worked nor left work behind.
    pub fn is_idle(&self) -> bool {
        self.work_done() == 0 && self.pending == 0 && !self.aborted
    }
}

enum Residency {
    Ring(LodRing),
    Frontier {
        frontier: Frontier,
        known_empty: KnownEmptyCache,
        loads: HashSet<Point3<i32>>,
        unloads: HashSet<Point3<i32>>,
    },
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Load(Point3<i32>),
    Unload(Point3<i32>),
    Regenerate(Regeneration),
    Remesh(ChunkKey),
}

impl Operation {
    fn center(&self) -> Point3<f32> {
        match self {
            Operation::Load(p) | Operation::Unload(p) => ChunkKey::base(*p).center(),
            Operation::Regenerate(r) => r.key().center(),
            Operation::Remesh(key) => key.center(),
        }
    }
}

/// A meshed chunk waiting for its handle and publication.
struct Prepared {
    key: ChunkKey,
    /// `None` for re-meshes; the chunk never left the world.
    chunk: Option<Chunk>,
    mesh: ChunkMesh,
    model: Matrix4<f32>,
    handle: Option<MeshHandle>,
    slot: Option<(u8, usize)>,
}

/// Keeps the right chunks resident around the focal point.
pub struct StreamingManager {
    config: StreamingConfig,
    boundary: BoundaryPolicy,
    options: MesherOptions,
    generator: Arc<dyn VoxelGenerator>,
    textures: TextureTable,
    world: MtResource<World>,
    bridge: Arc<RenderSyncBridge<RenderContext>>,
    live_focal: Option<MtResource<Point3<f32>>>,
    residency: Residency,
    scratch: MeshScratch,
    spare: Vec<Chunk>,
}

impl StreamingManager {
    /// Creates a manager running the configured strategy.
    ///
    /// # Arguments
    /// * `config` - Streaming section of the engine config
    /// * `mesher` - Mesher section (border policy, ambient occlusion)
    /// * `generator` - World function
    /// * `textures` - Texture layers, a copy of the render thread's table
    /// * `world` - Shared resident chunk index
    /// * `bridge` - The way to the render thread
    pub fn new(
        config: &StreamingConfig,
        mesher: &MesherConfig,
        generator: Arc<dyn VoxelGenerator>,
        textures: TextureTable,
        world: MtResource<World>,
        bridge: Arc<RenderSyncBridge<RenderContext>>,
    ) -> Self {
        let residency = match config.strategy {
            StreamingStrategy::LodRing => Residency::Ring(LodRing::new(config.lod_levels)),
            StreamingStrategy::Frontier => Residency::Frontier {
                frontier: Frontier::new(config.radius),
                known_empty: KnownEmptyCache::new(config.known_empty_cache),
                loads: HashSet::new(),
                unloads: HashSet::new(),
            },
        };
        info!("streaming manager using {:?}", config.strategy);

        Self {
            config: config.clone(),
            boundary: mesher.boundary,
            options: MesherOptions {
                ambient_occlusion: mesher.ambient_occlusion,
            },
            generator,
            textures,
            world,
            bridge,
            live_focal: None,
            residency,
            scratch: MeshScratch::new(),
            spare: Vec::new(),
        }
    }

    /// Lets passes abort when `focal` moves away from the point they were
    /// planned for.
    pub fn with_live_focal(mut self, focal: MtResource<Point3<f32>>) -> Self {
        self.live_focal = Some(focal);
        self
    }

    /// The shared world index.
    pub fn world(&self) -> &MtResource<World> {
        &self.world
    }

    /// The rings, when running the ring strategy.
    pub fn ring(&self) -> Option<&LodRing> {
        match &self.residency {
            Residency::Ring(ring) => Some(ring),
            Residency::Frontier { .. } => None,
        }
    }

    /// The frontier, when running the frontier strategy.
    pub fn frontier(&self) -> Option<&Frontier> {
        match &self.residency {
            Residency::Frontier { frontier, .. } => Some(frontier),
            Residency::Ring(_) => None,
        }
    }

    /// Runs one streaming pass for `focal`.
    ///
    /// # Errors
    /// [`BridgeError::ShutDown`] once the render thread is gone, and
    /// [`BridgeError::Command`] when reserving mesh handles failed on the GPU.
    pub fn tick(&mut self, focal: Point3<f32>) -> Result<TickReport, BridgeError> {
        let mut report = TickReport::default();

        if let Residency::Ring(ring) = &mut self.residency {
            let missing = ring.missing_handles();
            if missing > 0 {
                let handles = reserve_handles(&self.bridge, missing)?;
                ring.install_handles(handles);
                info!("reserved {} ring mesh handles", missing);
            }
        }

        let mut operations = self.plan(focal, &mut report);
        operations.extend(
            self.world
                .get()
                .dirty_keys()
                .into_iter()
                .map(Operation::Remesh),
        );

        sort_by_distance(&mut operations, focal, Operation::center);
        let budget = pass_budget(
            operations.len(),
            self.config.min_batch,
            self.config.max_batch,
        );
        let deferred = operations.split_off(budget);

        let live_focal = self.live_focal.clone();
        let guard = PassGuard::new(focal, live_focal.as_ref(), self.config.abort_distance);
        let mut prepared = Vec::with_capacity(operations.len());
        let mut executed = 0;
        for operation in &operations {
            if guard.should_abort() {
                report.aborted = true;
                break;
            }
            executed += 1;
            if let Some(ready) = self.prepare(*operation, &mut report)? {
                prepared.push(ready);
            }
        }

        self.commit(prepared)?;

        report.pending = deferred.len() + operations.len() - executed;
        if let Residency::Ring(ring) = &mut self.residency {
            let unfinished: HashSet<u8> = operations[executed..]
                .iter()
                .chain(deferred.iter())
                .filter_map(|op| match op {
                    Operation::Regenerate(r) => Some(r.lod),
                    _ => None,
                })
                .collect();
            for lod in 0..self.config.lod_levels {
                ring.level_mut(lod).set_converged(!unfinished.contains(&lod));
            }
        }

        if !report.is_idle() {
            debug!("streaming tick at {:?}: {:?}", focal, report);
        }
        Ok(report)
    }

    fn plan(&mut self, focal: Point3<f32>, report: &mut TickReport) -> Vec<Operation> {
        match &mut self.residency {
            Residency::Ring(ring) => ring
                .plan(focal)
                .into_iter()
                .map(Operation::Regenerate)
                .collect(),
            Residency::Frontier {
                frontier,
                known_empty,
                loads,
                unloads,
            } => {
                let edge = CHUNK_DIMENSION as f32;
                let center = Point3::new(
                    (focal.x / edge).floor() as i32,
                    (focal.y / edge).floor() as i32,
                    (focal.z / edge).floor() as i32,
                );
                let delta = frontier.recenter(center);

                // One short read of residency; generator queries run unlocked.
                let (left, entered): (Vec<_>, Vec<_>) = {
                    let world = self.world.get();
                    let resident = |p: Point3<i32>| (p, world.contains(&ChunkKey::base(p)));
                    (
                        delta.left.into_iter().map(resident).collect(),
                        delta.entered.into_iter().map(resident).collect(),
                    )
                };
                for (position, resident) in left {
                    loads.remove(&position);
                    if resident {
                        unloads.insert(position);
                    }
                }
                for (position, resident) in entered {
                    unloads.remove(&position);
                    if resident {
                        continue;
                    }
                    if known_empty.is_known_empty(self.generator.as_ref(), position) {
                        report.skipped_empty += 1;
                    } else {
                        loads.insert(position);
                    }
                }

                loads
                    .iter()
                    .copied()
                    .map(Operation::Load)
                    .chain(unloads.iter().copied().map(Operation::Unload))
                    .collect()
            }
        }
    }

    /// Generates and meshes the chunk of one operation. Unloads complete here.
    fn prepare(
        &mut self,
        operation: Operation,
        report: &mut TickReport,
    ) -> Result<Option<Prepared>, BridgeError> {
        match operation {
            Operation::Load(position) => {
                if let Residency::Frontier { loads, .. } = &mut self.residency {
                    loads.remove(&position);
                }
                let key = ChunkKey::base(position);
                let mut chunk = self.spare_chunk(key);
                self.generator.fill(&mut chunk, self.boundary);
                let mesh = greedy_mesh(&chunk, &self.textures, &self.options, &mut self.scratch);
                report.loads += 1;
                Ok(Some(Prepared {
                    key,
                    model: chunk.model_matrix(),
                    chunk: Some(chunk),
                    mesh,
                    handle: None,
                    slot: None,
                }))
            }
            Operation::Unload(position) => {
                if let Residency::Frontier { unloads, .. } = &mut self.residency {
                    unloads.remove(&position);
                }
                let evicted = self.world.get_mut().remove(&ChunkKey::base(position));
                if let Some(resident) = evicted {
                    if let Some(handle) = resident.handle {
                        self.bridge
                            .execute(move |context| context.allocator.free(handle))?;
                    }
                    if self.spare.len() < SPARE_CHUNKS {
                        self.spare.push(resident.chunk);
                    }
                    report.unloads += 1;
                }
                Ok(None)
            }
            Operation::Regenerate(regeneration) => {
                let key = regeneration.key();
                let vacated = regeneration.previous.and_then(|previous| {
                    self.world.get_mut().remove(&ChunkKey {
                        lod: regeneration.lod,
                        position: previous,
                    })
                });
                let mut chunk = match vacated {
                    Some(resident) => {
                        let mut chunk = resident.chunk;
                        chunk.reset(key.position, key.lod);
                        chunk
                    }
                    None => self.spare_chunk(key),
                };

                let mesh = if self
                    .generator
                    .is_region_known_empty(key.position, key.lod)
                {
                    report.skipped_empty += 1;
                    ChunkMesh::new()
                } else {
                    self.generator.fill(&mut chunk, self.boundary);
                    greedy_mesh(&chunk, &self.textures, &self.options, &mut self.scratch)
                };
                report.regenerations += 1;

                let handle = self
                    .ring()
                    .and_then(|ring| ring.handle(regeneration.lod, regeneration.slot));
                Ok(Some(Prepared {
                    key,
                    model: chunk.model_matrix(),
                    chunk: Some(chunk),
                    mesh,
                    handle,
                    slot: Some((regeneration.lod, regeneration.slot)),
                }))
            }
            Operation::Remesh(key) => {
                let mut world = self.world.get_mut();
                let Some(resident) = world.get_mut(&key) else {
                    return Ok(None);
                };
                let mesh = greedy_mesh(
                    &resident.chunk,
                    &self.textures,
                    &self.options,
                    &mut self.scratch,
                );
                resident.chunk.clear_dirty();
                report.remeshes += 1;
                Ok(Some(Prepared {
                    key,
                    model: resident.chunk.model_matrix(),
                    chunk: None,
                    mesh,
                    handle: resident.handle,
                    slot: None,
                }))
            }
        }
    }

    /// Hands out handles, posts uploads and publishes chunks.
    fn commit(&mut self, prepared: Vec<Prepared>) -> Result<(), BridgeError> {
        let needed = prepared
            .iter()
            .filter(|p| p.handle.is_none() && !p.mesh.is_empty())
            .count();
        let mut fresh = if needed > 0 {
            reserve_handles(&self.bridge, needed)?.into_iter()
        } else {
            Vec::new().into_iter()
        };

        for mut ready in prepared {
            if ready.handle.is_none() && !ready.mesh.is_empty() {
                ready.handle = fresh.next();
            }

            if let Some(handle) = ready.handle {
                let (mesh, model) = (ready.mesh, ready.model);
                self.bridge
                    .execute(move |context| context.allocator.upload(handle, &mesh, model))?;
            }

            match ready.chunk {
                Some(chunk) => {
                    self.world.get_mut().insert(
                        ready.key,
                        ResidentChunk {
                            chunk,
                            handle: ready.handle,
                        },
                    );
                }
                None => {
                    if let Some(resident) = self.world.get_mut().get_mut(&ready.key) {
                        resident.handle = ready.handle;
                    }
                }
            }

            if let (Some((lod, slot)), Residency::Ring(ring)) = (ready.slot, &mut self.residency) {
                ring.level_mut(lod).complete(slot, ready.key.position);
            }
        }
        Ok(())
    }

    fn spare_chunk(&mut self, key: ChunkKey) -> Chunk {
        match self.spare.pop() {
            Some(mut chunk) => {
                chunk.reset(key.position, key.lod);
                chunk
            }
            None => Chunk::empty(key.position, key.lod),
        }
    }
}

/// Mints `count` mesh handles on the render thread, all or nothing.
fn reserve_handles(
    bridge: &RenderSyncBridge<RenderContext>,
    count: usize,
) -> Result<Vec<MeshHandle>, BridgeError> {
    bridge.execute_sync(move |context: &mut RenderContext| {
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            match context.allocator.allocate() {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in handles {
                        if let Err(free_error) = context.allocator.free(handle) {
                            warn!("releasing reserved handle {:?} failed: {}", handle, free_error);
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(handles)
    })
}

/// A render thread for tests: drains the bridge into a headless context
/// until told to stop.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};

    use crate::engine_state::{
        config::AllocatorConfig,
        render_sync::{RenderContext, RenderSyncBridge},
        rendering::meshing::AllocatorStats,
    };

    pub struct HeadlessRenderer {
        stop: Arc<AtomicBool>,
        thread: JoinHandle<AllocatorStats>,
    }

    impl HeadlessRenderer {
        pub fn spawn(bridge: Arc<RenderSyncBridge<RenderContext>>) -> Self {
            let stop = Arc::new(AtomicBool::new(false));
            let thread = {
                let stop = stop.clone();
                thread::spawn(move || {
                    let mut context = RenderContext::headless(&AllocatorConfig::default()).unwrap();
                    loop {
                        let report = bridge.drain(&mut context);
                        assert!(report.is_clean(), "{:?}", report.errors);
                        if stop.load(Ordering::Acquire) && bridge.pending_commands() == 0 {
                            break;
                        }
                        thread::yield_now();
                    }
                    context.allocator.stats()
                })
            };
            Self { stop, thread }
        }

        /// Drains what is left and returns the allocator occupancy.
        pub fn finish(self) -> AllocatorStats {
            self.stop.store(true, Ordering::Release);
            self.thread.join().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::testing::HeadlessRenderer;
    use super::*;
    use crate::engine_state::voxels::{
        block::{block_type::BlockType, Block},
        generator::HalfSpaceGenerator,
    };

    fn ground() -> Arc<dyn VoxelGenerator> {
        Arc::new(HalfSpaceGenerator {
            level: 0,
            block: Block::new(BlockType::STONE),
        })
    }

    fn manager(
        strategy: StreamingStrategy,
        radius: i32,
        bridge: &Arc<RenderSyncBridge<RenderContext>>,
    ) -> StreamingManager {
        let config = StreamingConfig {
            strategy,
            radius,
            lod_levels: 2,
            ..StreamingConfig::default()
        };
        StreamingManager::new(
            &config,
            &MesherConfig::default(),
            ground(),
            TextureTable::sequential(),
            MtResource::new(World::new(BoundaryPolicy::AssumeEmpty)),
            bridge.clone(),
        )
    }

    fn settle(manager: &mut StreamingManager, focal: Point3<f32>) -> usize {
        for tick in 1..=50 {
            let report = manager.tick(focal).unwrap();
            if report.pending == 0 {
                return tick;
            }
        }
        panic!("streaming did not settle around {:?}", focal);
    }

    /// Half-space generator that tries to edit the world from another thread
    /// on every known-empty query.
    struct EditingGenerator {
        inner: HalfSpaceGenerator,
        world: MtResource<World>,
        blocked: Arc<std::sync::atomic::AtomicBool>,
    }

    impl VoxelGenerator for EditingGenerator {
        fn block_at(&self, world: Point3<i32>) -> Block {
            self.inner.block_at(world)
        }

        fn is_region_known_empty(&self, position: Point3<i32>, lod: u8) -> bool {
            let (sender, receiver) = std::sync::mpsc::channel();
            let world = self.world.clone();
            std::thread::spawn(move || {
                let _edit = world.get_mut();
                let _ = sender.send(());
            });
            if receiver.recv_timeout(std::time::Duration::from_secs(2)).is_err() {
                self.blocked.store(true, std::sync::atomic::Ordering::SeqCst);
            }
            self.inner.is_region_known_empty(position, lod)
        }
    }

    #[test]
    fn frontier_planning_does_not_hold_the_world_during_generator_queries() {
        let bridge = RenderSyncBridge::<RenderContext>::new();
        let renderer = HeadlessRenderer::spawn(bridge.clone());
        let world = MtResource::new(World::new(BoundaryPolicy::AssumeEmpty));
        let blocked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let generator = Arc::new(EditingGenerator {
            inner: HalfSpaceGenerator {
                level: 0,
                block: Block::new(BlockType::STONE),
            },
            world: world.clone(),
            blocked: blocked.clone(),
        });
        let config = StreamingConfig {
            strategy: StreamingStrategy::Frontier,
            radius: 1,
            ..StreamingConfig::default()
        };
        let mut manager = StreamingManager::new(
            &config,
            &MesherConfig::default(),
            generator,
            TextureTable::sequential(),
            world,
            bridge.clone(),
        );

        let report = manager.tick(Point3::new(0.0, 0.0, 0.0)).unwrap();
        assert!(report.skipped_empty > 0);
        assert!(!blocked.load(std::sync::atomic::Ordering::SeqCst));
        renderer.finish();
    }

    #[test]
    fn failed_reservation_releases_the_handles_already_minted() {
        use crate::engine_state::{
            config::AllocatorConfig, error::GpuError, rendering::backend::HeadlessBackend,
        };

        let bridge = RenderSyncBridge::<RenderContext>::new();
        let render = {
            let bridge = bridge.clone();
            std::thread::spawn(move || {
                let config = AllocatorConfig {
                    initial_slots: 2,
                    initial_face_capacity: 32,
                };
                let backend = HeadlessBackend::with_memory_limit(1800);
                let mut context = RenderContext::new(Box::new(backend), &config, None).unwrap();
                while !bridge.is_shut_down() {
                    bridge.drain(&mut context);
                    std::thread::yield_now();
                }
                context.allocator.stats()
            })
        };

        let result = reserve_handles(&bridge, 3);
        assert!(matches!(
            result,
            Err(BridgeError::Command(GpuError::OutOfMemory { .. }))
        ));

        bridge.shutdown();
        let stats = render.join().unwrap();
        assert_eq!(stats.live_handles, 0);
        assert_eq!(stats.free_handles, 2);
    }

    #[test]
    fn frontier_loads_only_chunks_that_are_not_known_empty() {
        let bridge = RenderSyncBridge::<RenderContext>::new();
        let renderer = HeadlessRenderer::spawn(bridge.clone());
        let mut manager = manager(StreamingStrategy::Frontier, 2, &bridge);
        let focal = Point3::new(0.0, 0.0, 0.0);

        let first = manager.tick(focal).unwrap();
        assert_eq!(first.skipped_empty, 23);
        assert_eq!(first.loads, 4);
        assert_eq!(first.loads + first.pending, 10);
        settle(&mut manager, focal);

        let resident: HashSet<_> = manager.world().get().keys().copied().collect();
        assert_eq!(resident.len(), 10);
        assert!(resident.iter().all(|key| key.lod == 0 && key.position.y < 0));
        assert_eq!(manager.world().get().meshed_count(), 10);

        let stats = renderer.finish();
        assert_eq!(stats.live_handles, 10);
        assert!(stats.resident_quads > 0);
    }

    #[test]
    fn ring_converges_then_stays_idle() {
        let bridge = RenderSyncBridge::<RenderContext>::new();
        let renderer = HeadlessRenderer::spawn(bridge.clone());
        let mut manager = manager(StreamingStrategy::LodRing, 0, &bridge);

        settle(&mut manager, Point3::new(5.0, 5.0, 5.0));
        assert_eq!(manager.world().get().len(), 120);
        assert!(manager.ring().unwrap().levels().iter().all(|l| l.is_converged()));

        // Same origin, nothing to do.
        let idle = manager.tick(Point3::new(6.0, 5.0, 5.0)).unwrap();
        assert!(idle.is_idle(), "{:?}", idle);

        let moved = manager.tick(Point3::new(37.0, 5.0, 5.0)).unwrap();
        assert!(moved.regenerations > 0);
        settle(&mut manager, Point3::new(37.0, 5.0, 5.0));
        assert_eq!(manager.world().get().len(), 120);

        let stats = renderer.finish();
        assert_eq!(stats.live_handles, 120);
        assert_eq!(stats.free_handles, 0);
    }

    #[test]
    fn pass_aborts_when_the_live_focal_point_runs_away() {
        let bridge = RenderSyncBridge::<RenderContext>::new();
        let live = MtResource::new(Point3::new(1000.0, 0.0, 0.0));
        let mut manager =
            manager(StreamingStrategy::Frontier, 2, &bridge).with_live_focal(live.clone());

        let aborted = manager.tick(Point3::new(0.0, 0.0, 0.0)).unwrap();
        assert!(aborted.aborted);
        assert_eq!(aborted.loads, 0);
        assert_eq!(aborted.pending, 10);
        assert!(manager.world().get().is_empty());

        *live.get_mut() = Point3::new(0.0, 0.0, 0.0);
        let renderer = HeadlessRenderer::spawn(bridge.clone());
        let resumed = manager.tick(Point3::new(0.0, 0.0, 0.0)).unwrap();
        assert!(!resumed.aborted);
        assert_eq!(resumed.loads, 4);
        renderer.finish();
    }

    #[test]
    fn edits_are_remeshed_on_the_next_tick() {
        let bridge = RenderSyncBridge::<RenderContext>::new();
        let renderer = HeadlessRenderer::spawn(bridge.clone());
        let mut manager = manager(StreamingStrategy::Frontier, 1, &bridge);
        let focal = Point3::new(0.0, 0.0, 0.0);
        settle(&mut manager, focal);

        let changed = manager
            .world()
            .get_mut()
            .set_block(Point3::new(3, -1, 3), Block::AIR)
            .unwrap();
        assert!(changed);

        let report = manager.tick(focal).unwrap();
        assert_eq!(report.remeshes, 1);
        assert!(manager.world().get().dirty_keys().is_empty());

        let stats = renderer.finish();
        assert_eq!(stats.live_handles, 1);
    }

    #[test]
    fn leaving_chunks_are_evicted_and_their_handles_reused() {
        let bridge = RenderSyncBridge::<RenderContext>::new();
        let renderer = HeadlessRenderer::spawn(bridge.clone());
        let mut manager = manager(StreamingStrategy::Frontier, 1, &bridge);
        settle(&mut manager, Point3::new(0.0, 0.0, 0.0));

        let far = Point3::new(3200.0, 0.0, 0.0);
        let first = manager.tick(far).unwrap();
        assert_eq!(first.unloads, 1);
        settle(&mut manager, far);

        let world = manager.world().get();
        assert_eq!(world.len(), 1);
        assert!(world.contains(&ChunkKey::base(Point3::new(100, -1, 0))));
        drop(world);

        let stats = renderer.finish();
        assert_eq!(stats.live_handles, 1);
    }

    #[test]
    fn ticks_fail_once_the_bridge_is_shut_down() {
        let bridge = RenderSyncBridge::<RenderContext>::new();
        let mut manager = manager(StreamingStrategy::LodRing, 0, &bridge);
        bridge.shutdown();
        assert!(matches!(
            manager.tick(Point3::new(0.0, 0.0, 0.0)),
            Err(BridgeError::ShutDown)
        ));
    }
}
