//! End to end: streaming thread, render bridge and a headless render loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cgmath::{Deg, Point3};
use voxel_streamer::core::MtResource;
use voxel_streamer::engine_state::{
    camera_state::camera::{Camera, Projection},
    config::{
        AllocatorConfig, BoundaryPolicy, EngineConfig, GeneratorKind, MesherConfig,
        StreamingConfig, StreamingStrategy,
    },
    render_sync::{RenderContext, RenderSyncBridge},
    run_with,
    streaming::StreamingWorker,
    voxels::{
        block::{block_type::BlockType, Block},
        generator::HalfSpaceGenerator,
        world::{ChunkKey, World},
    },
};

const DEADLINE: Duration = Duration::from_secs(60);

/// Drains the bridge on this thread until `done` holds and nothing is queued.
fn pump(
    bridge: &RenderSyncBridge<RenderContext>,
    context: &mut RenderContext,
    done: impl Fn() -> bool,
) {
    let start = Instant::now();
    loop {
        let report = bridge.drain(context);
        assert!(report.is_clean(), "{:?}", report.errors);
        if done() && bridge.pending_commands() == 0 {
            return;
        }
        assert!(start.elapsed() < DEADLINE, "streaming did not settle");
        std::thread::yield_now();
    }
}

#[test]
fn frontier_streams_follows_and_draws() {
    let bridge = RenderSyncBridge::<RenderContext>::new();
    let mut context = RenderContext::headless(&AllocatorConfig::default()).unwrap();
    let world = MtResource::new(World::new(BoundaryPolicy::AssumeEmpty));
    let focal = MtResource::new(Point3::new(0.0, 0.0, 0.0));

    let config = StreamingConfig {
        strategy: StreamingStrategy::Frontier,
        radius: 2,
        tick_interval_ms: 1,
        ..StreamingConfig::default()
    };
    let worker = StreamingWorker::spawn(
        &config,
        &MesherConfig::default(),
        Arc::new(HalfSpaceGenerator {
            level: 0,
            block: Block::new(BlockType::GRASS),
        }),
        world.clone(),
        bridge.clone(),
        focal.clone(),
    );

    // Only the ten chunks below the surface are ever loaded.
    pump(&bridge, &mut context, || world.get().meshed_count() == 10);
    assert_eq!(world.get().len(), 10);
    assert_eq!(context.allocator.stats().live_handles, 10);

    let camera = Camera::looking_at(Point3::new(0.0, 40.0, -80.0), Point3::new(0.0, -16.0, 0.0));
    let projection = Projection::new(640, 480, Deg(70.0), 0.1, 1000.0);
    let frame = context
        .allocator
        .render(camera.calc_matrix(), projection.calc_matrix())
        .unwrap();
    assert_eq!(frame.live_handles, 10);
    assert!(frame.visible_handles > 0);
    assert!(frame.quads_drawn > 0);

    // Jump away: the old chunks are evicted, their handles reused.
    *focal.get_mut() = Point3::new(3200.0, 0.0, 0.0);
    pump(&bridge, &mut context, || {
        let world = world.get();
        world.meshed_count() == 10
            && world.contains(&ChunkKey::base(Point3::new(100, -1, 0)))
            && !world.contains(&ChunkKey::base(Point3::new(0, -1, 0)))
    });
    assert_eq!(context.allocator.stats().live_handles, 10);

    bridge.shutdown();
    let summary = worker.join().unwrap();
    assert_eq!(summary.loads, 20);
    assert_eq!(summary.unloads, 10);
}

#[test]
fn headless_demo_runs_to_completion() {
    let mut config = EngineConfig::default();
    config.render.frames = 30;
    config.render.frame_interval_ms = 1;
    config.render.texture_directory = "no/textures/here".into();
    config.generator.kind = GeneratorKind::HalfSpace;
    config.generator.level = 16;
    config.streaming.lod_levels = 2;

    let report = run_with(&config).unwrap();
    assert_eq!(report.frames, 30);
    assert_eq!(report.allocator.free_handles, 0);
}
