//! # Engine State Module
//!
//! Wires the subsystems into the streaming demo.
//!
//! ## Key Components
//!
//! * `buffer_state` - Named GPU buffers on top of a backend
//! * `camera_state` - Camera, projection and the scripted flight
//! * `render_sync` - The bridge between producer threads and the render thread
//! * `rendering` - Backends, the mesher and the mesh slot allocator
//! * `streaming` - LOD rings, the frontier and the streaming thread
//! * `voxels` - Blocks, chunks, generators and the resident world
//!
//! ## Threads
//!
//! [`run_with`] runs three threads:
//! 1. The calling thread renders. It owns the backend and the allocator and
//!    drains the bridge once per frame.
//! 2. A camera thread flies the scripted path, publishes the focal point and
//!    hands frame state to the renderer.
//! 3. The streaming thread keeps chunks resident around the focal point.
//!
//! Shutdown is cooperative: the render loop closes the bridge, which unblocks
//! and stops both producers.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cgmath::Point3;
use log::{debug, error, info};

use crate::core::MtResource;

pub mod buffer_state;
pub mod camera_state;
pub mod config;
pub mod error;
pub mod render_sync;
pub mod rendering;
pub mod streaming;
pub mod voxels;

use camera_state::CameraState;
use config::{BackendKind, EngineConfig};
use error::EngineError;
use render_sync::{FrameState, RenderContext, RenderSyncBridge};
use rendering::{
    backend::{GpuBackend, HeadlessBackend, WgpuBackend},
    meshing::{AllocatorStats, FrameStats},
};
use streaming::{StreamingWorker, WorkerSummary};
use voxels::{generator::build_generator, world::World};

/// How long the render thread waits for a frame before draining anyway.
const FRAME_WAIT: Duration = Duration::from_millis(50);

/// Frames between statistics lines.
const LOG_EVERY: u64 = 60;

/// What a run did.
#[derive(Debug, Clone, Copy)]
pub struct EngineReport {
    /// Frames rendered.
    pub frames: u64,
    /// Statistics of the last rendered frame.
    pub last_frame: FrameStats,
    /// Allocator occupancy at shutdown.
    pub allocator: AllocatorStats,
    /// Streaming totals.
    pub streaming: WorkerSummary,
    /// Chunks resident at shutdown.
    pub resident_chunks: usize,
    /// Wall time of the render loop.
    pub elapsed: Duration,
}

/// Runs the demo described by `config` until its frame count is reached.
///
/// # Errors
/// Configuration problems, backend creation failures, any failed render
/// command (GPU failures are critical) and panicked producer threads.
pub fn run_with(config: &EngineConfig) -> Result<EngineReport, EngineError> {
    config.validate()?;

    let backend: Box<dyn GpuBackend> = match config.render.backend {
        BackendKind::Headless => Box::new(match config.render.memory_limit {
            Some(limit) => HeadlessBackend::with_memory_limit(limit),
            None => HeadlessBackend::new(),
        }),
        BackendKind::Wgpu => Box::new(WgpuBackend::new(config.render.width, config.render.height)?),
    };
    let texture_directory = config.render.texture_directory.as_path();
    let mut context = RenderContext::new(
        backend,
        &config.allocator,
        texture_directory.is_dir().then_some(texture_directory),
    )?;
    info!(
        "render context ready: {:?} backend, {}x{}",
        config.render.backend, config.render.width, config.render.height
    );

    let bridge = RenderSyncBridge::<RenderContext>::new();
    let world = MtResource::new(World::new(config.mesher.boundary));
    let camera = CameraState::new(&config.camera, config.render.width, config.render.height);
    let focal = MtResource::new(camera.position());
    let generator = build_generator(&config.generator, config.generator_block());

    let streaming = StreamingWorker::spawn(
        &config.streaming,
        &config.mesher,
        generator,
        world.clone(),
        bridge.clone(),
        focal.clone(),
    );
    let simulation = spawn_camera(
        camera,
        bridge.clone(),
        focal,
        config.render.frames,
        Duration::from_millis(config.render.frame_interval_ms),
    );

    let outcome = render_loop(&bridge, &mut context, config.render.frames);

    bridge.shutdown();
    let streaming = streaming.join();
    let published = simulation
        .join()
        .map_err(|_| EngineError::ThreadPanicked("camera"))?;
    let (frames, last_frame, elapsed) = outcome?;
    let streaming = streaming?;

    let report = EngineReport {
        frames,
        last_frame,
        allocator: context.allocator.stats(),
        streaming,
        resident_chunks: world.get().len(),
        elapsed,
    };
    info!(
        "rendered {} of {} published frames in {:.2?}, {} chunks resident, {} streaming ticks",
        report.frames, published, report.elapsed, report.resident_chunks, report.streaming.ticks
    );
    Ok(report)
}

/// Flies the camera and hands each frame to the render thread.
///
/// Returns the number of frames published.
fn spawn_camera(
    mut camera: CameraState,
    bridge: Arc<RenderSyncBridge<RenderContext>>,
    focal: MtResource<Point3<f32>>,
    frames: u64,
    interval: Duration,
) -> JoinHandle<u64> {
    thread::spawn(move || {
        let step = if interval.is_zero() {
            1.0 / 60.0
        } else {
            interval.as_secs_f32()
        };

        for frame in 1..=frames {
            camera.update(step);
            let position = camera.position();
            *focal.get_mut() = position;

            let state = FrameState {
                frame,
                view: camera.view_matrix(),
                projection: camera.projection_matrix(),
                focal: position,
            };
            if bridge.sync(state).is_err() {
                return frame - 1;
            }
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }
        frames
    })
}

/// Draws `frames` frames, draining the bridge before each one.
fn render_loop(
    bridge: &RenderSyncBridge<RenderContext>,
    context: &mut RenderContext,
    frames: u64,
) -> Result<(u64, FrameStats, Duration), EngineError> {
    let start = web_time::Instant::now();
    let mut rendered = 0;
    let mut last = FrameStats::default();

    while rendered < frames {
        let next = bridge.wait_frame_timeout(FRAME_WAIT)?;
        drain_commands(bridge, context)?;
        let Some(state) = next else {
            continue;
        };

        let frame_start = web_time::Instant::now();
        last = context
            .allocator
            .render(state.view, state.projection)
            .inspect_err(|e| error!("frame {} failed: {}", state.frame, e))?;
        bridge.frame_done();
        rendered += 1;

        debug!(
            "frame {} drawn in {:?}: {} of {} handles visible, {} quads",
            state.frame,
            frame_start.elapsed(),
            last.visible_handles,
            last.live_handles,
            last.quads_drawn
        );
        if rendered % LOG_EVERY == 0 {
            let stats = context.allocator.stats();
            info!(
                "frame {}: {:.1} fps, {} meshes, {} quads resident, {} KiB allocated",
                state.frame,
                rendered as f64 / start.elapsed().as_secs_f64().max(f64::EPSILON),
                stats.live_handles,
                stats.resident_quads,
                stats.allocated_bytes / 1024
            );
        }
    }

    Ok((rendered, last, start.elapsed()))
}

/// Runs queued commands. Any failure is critical.
fn drain_commands(
    bridge: &RenderSyncBridge<RenderContext>,
    context: &mut RenderContext,
) -> Result<(), EngineError> {
    let report = bridge.drain(context);
    match report.errors.into_iter().next() {
        Some(first) => {
            error!("render command failed: {}", first);
            Err(first.into())
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::config::{GeneratorKind, StreamingStrategy};

    fn headless(frames: u64) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.render.frames = frames;
        config.render.frame_interval_ms = 0;
        config.render.texture_directory = "does/not/exist".into();
        config.generator.kind = GeneratorKind::HalfSpace;
        config.streaming.strategy = StreamingStrategy::Frontier;
        config.streaming.radius = 1;
        config
    }

    #[test]
    fn runs_the_configured_number_of_frames() {
        let report = run_with(&headless(12)).unwrap();
        assert_eq!(report.frames, 12);
        assert_eq!(report.allocator.free_handles, 0);
    }

    #[test]
    fn invalid_config_is_rejected_before_any_thread_starts() {
        let mut config = headless(1);
        config.render.width = 0;
        assert!(matches!(run_with(&config), Err(EngineError::Config(_))));
    }

    #[test]
    fn device_exhaustion_is_critical() {
        let mut config = headless(5);
        config.render.memory_limit = Some(64);
        assert!(matches!(run_with(&config), Err(EngineError::Gpu(_))));
    }
}
