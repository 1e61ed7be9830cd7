//! The streaming thread.
//!
//! Owns a [`StreamingManager`] and ticks it against the shared focal point
//! until told to stop or until the render bridge shuts down.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cgmath::Point3;
use log::{error, info};

use super::{StreamingManager, TickReport};
use crate::core::MtResource;
use crate::engine_state::{
    config::{MesherConfig, StreamingConfig},
    error::{BridgeError, EngineError},
    render_sync::{RenderContext, RenderSyncBridge},
    voxels::{generator::VoxelGenerator, world::World},
};

/// Totals over every tick a worker ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Ticks run.
    pub ticks: u64,
    /// Frontier loads.
    pub loads: u64,
    /// Frontier evictions.
    pub unloads: u64,
    /// Ring slot regenerations.
    pub regenerations: u64,
    /// Edit re-meshes.
    pub remeshes: u64,
    /// Chunks skipped as known empty.
    pub skipped_empty: u64,
    /// Passes cut short by focal movement.
    pub aborted_passes: u64,
    /// Whether the last tick left no work behind.
    pub settled: bool,
}

impl WorkerSummary {
    fn absorb(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.loads += report.loads as u64;
        self.unloads += report.unloads as u64;
        self.regenerations += report.regenerations as u64;
        self.remeshes += report.remeshes as u64;
        self.skipped_empty += report.skipped_empty as u64;
        self.aborted_passes += report.aborted as u64;
        self.settled = report.pending == 0 && !report.aborted;
    }
}

/// Handle to the streaming thread.
pub struct StreamingWorker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<WorkerSummary, BridgeError>>>,
}

impl StreamingWorker {
    /// Starts streaming around `focal`.
    ///
    /// The thread first asks the render thread for its texture table, so the
    /// render thread must be draining the bridge.
    ///
    /// # Panics
    /// Panics if the underlying thread creation fails.
    pub fn spawn(
        config: &StreamingConfig,
        mesher: &MesherConfig,
        generator: Arc<dyn VoxelGenerator>,
        world: MtResource<World>,
        bridge: Arc<RenderSyncBridge<RenderContext>>,
        focal: MtResource<Point3<f32>>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let config = config.clone();
        let mesher = mesher.clone();

        let thread = {
            let stop = stop.clone();
            thread::spawn(move || {
                let mut summary = WorkerSummary::default();
                let textures =
                    match bridge.execute_sync(|context: &mut RenderContext| Ok(context.textures.clone())) {
                        Ok(textures) => textures,
                        Err(BridgeError::ShutDown) => return Ok(summary),
                        Err(e) => return Err(e),
                    };

                let mut manager =
                    StreamingManager::new(&config, &mesher, generator, textures, world, bridge)
                        .with_live_focal(focal.clone());
                let interval = Duration::from_millis(config.tick_interval_ms);

                while !stop.load(Ordering::Acquire) {
                    let position = *focal.get();
                    match manager.tick(position) {
                        Ok(report) => summary.absorb(&report),
                        Err(BridgeError::ShutDown) => break,
                        Err(e) => {
                            error!("streaming stopped: {}", e);
                            return Err(e);
                        }
                    }
                    thread::sleep(interval);
                }

                info!(
                    "streaming worker stopped after {} ticks ({} loads, {} regenerations)",
                    summary.ticks, summary.loads, summary.regenerations
                );
                Ok(summary)
            })
        };

        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Whether the thread already returned.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |thread| thread.is_finished())
    }

    /// Asks the thread to stop after its current tick and waits for it.
    pub fn join(mut self) -> Result<WorkerSummary, EngineError> {
        self.stop.store(true, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return Ok(WorkerSummary::default());
        };
        let summary = thread
            .join()
            .map_err(|_| EngineError::ThreadPanicked("streaming"))??;
        Ok(summary)
    }
}

impl Drop for StreamingWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::HeadlessRenderer;
    use super::*;
    use crate::engine_state::config::{BoundaryPolicy, StreamingStrategy};
    use crate::engine_state::voxels::{
        block::{block_type::BlockType, Block},
        generator::HalfSpaceGenerator,
    };

    fn spawn(bridge: &Arc<RenderSyncBridge<RenderContext>>, world: &MtResource<World>) -> StreamingWorker {
        let config = StreamingConfig {
            strategy: StreamingStrategy::Frontier,
            radius: 1,
            tick_interval_ms: 1,
            ..StreamingConfig::default()
        };
        StreamingWorker::spawn(
            &config,
            &MesherConfig::default(),
            Arc::new(HalfSpaceGenerator {
                level: 0,
                block: Block::new(BlockType::DIRT),
            }),
            world.clone(),
            bridge.clone(),
            MtResource::new(Point3::new(0.0, 0.0, 0.0)),
        )
    }

    #[test]
    fn worker_streams_until_stopped() {
        let bridge = RenderSyncBridge::<RenderContext>::new();
        let renderer = HeadlessRenderer::spawn(bridge.clone());
        let world = MtResource::new(World::new(BoundaryPolicy::AssumeEmpty));
        let worker = spawn(&bridge, &world);

        while world.get().meshed_count() == 0 {
            thread::yield_now();
        }
        let summary = worker.join().unwrap();
        assert!(summary.ticks >= 1);
        assert_eq!(summary.loads, 1);
        assert_eq!(summary.skipped_empty, 6);
        assert_eq!(renderer.finish().live_handles, 1);
    }

    #[test]
    fn bridge_shutdown_is_a_clean_stop() {
        let bridge = RenderSyncBridge::<RenderContext>::new();
        let world = MtResource::new(World::new(BoundaryPolicy::AssumeEmpty));
        let worker = spawn(&bridge, &world);
        bridge.shutdown();

        let summary = worker.join().unwrap();
        assert_eq!(summary.loads, 0);
        assert!(world.get().is_empty());
    }
}
