//! # Voxel Streamer Entry Point
//!
//! Calls into the library's `run()` function.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- config/engine.json
//! ```

fn main() {
    voxel_streamer::run();
}
