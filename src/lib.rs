#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Streamer
//!
//! Streams a procedurally generated voxel world around a moving camera and
//! draws it with one multi-draw-indirect call per frame.
//!
//! ## Key Modules
//!
//! * `core` - Shared-ownership primitives used across threads
//! * `engine_state` - Meshing, GPU mesh storage, streaming, the render bridge
//!   and the demo run loop
//!
//! ## Architecture
//!
//! The engine keeps a strict split between:
//! * Producers (the streaming thread, the camera thread), which never touch the GPU
//! * The render thread, which owns the backend and executes queued commands
//! * Voxel data management and meshing, shared through the world index
//!
//! ## Usage
//!
//! ```no_run
//! fn main() {
//!     voxel_streamer::run();
//! }
//! ```
//!
//! Embedders that want the numbers instead of the logs call
//! [`engine_state::run_with`] with their own config.

use std::path::Path;

use log::{error, info};

pub mod core;
pub mod engine_state;

use engine_state::config::EngineConfig;

/// Runs the demo.
///
/// The config is read from the JSON file named by the first command line
/// argument, defaults are used without one. Logging goes to stdout and is
/// filtered by `RUST_LOG`.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    let config = match std::env::args().nth(1) {
        Some(path) => match EngineConfig::load(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                return;
            }
        },
        None => EngineConfig::default(),
    };

    match engine_state::run_with(&config) {
        Ok(report) => info!(
            "done: {} frames, {} meshes live, {} quads resident",
            report.frames, report.allocator.live_handles, report.allocator.resident_quads
        ),
        Err(e) => error!("engine stopped: {}", e),
    }
}
