//! # Engine Configuration
//!
//! All tunables of the pipeline, loaded from a JSON file. Every section and
//! every field has a default, so an empty object (or no file at all) yields a
//! working configuration.
//!
//! ```json
//! {
//!     "streaming": { "strategy": "frontier", "radius": 6 },
//!     "generator": { "kind": "half_space", "block": "stone" },
//!     "render": { "backend": "wgpu", "frames": 1200 }
//! }
//! ```

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::voxels::block::block_type::BlockType;

/// Which residency policy a streaming manager runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingStrategy {
    /// Fixed rings of reusable slots per LOD level.
    LodRing,
    /// Flat level, BFS frontier bounded by a radius.
    Frontier,
}

/// How faces on the chunk border are decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// The halo is left empty, so border voxels always get a face.
    AssumeEmpty,
    /// The generator also fills the halo, so border faces against solid
    /// neighbours are skipped.
    SampleNeighbors,
}

/// Which world function fills chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    /// Thresholded 3D Perlin noise.
    Perlin,
    /// Everything below `level` is solid.
    HalfSpace,
    /// Alternating solid and air voxels.
    Checkerboard,
    /// Every voxel solid.
    Solid,
    /// Every voxel air.
    Empty,
}

/// Which graphics backend the render thread owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// CPU-side buffers, no device. Used for tests and CI.
    Headless,
    /// A real device through wgpu, rendering offscreen.
    Wgpu,
}

/// Streaming section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Residency policy.
    pub strategy: StreamingStrategy,
    /// Number of LOD levels kept by the ring strategy.
    pub lod_levels: u8,
    /// Frontier radius in chunks.
    pub radius: i32,
    /// Lower bound of operations per pass.
    pub min_batch: usize,
    /// Upper bound of operations per pass.
    pub max_batch: usize,
    /// Focal movement (world units) that aborts a running pass.
    pub abort_distance: f32,
    /// Entries kept in the known-empty cache.
    pub known_empty_cache: usize,
    /// Sleep between streaming ticks.
    pub tick_interval_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            strategy: StreamingStrategy::LodRing,
            lod_levels: 3,
            radius: 4,
            min_batch: 4,
            max_batch: 64,
            abort_distance: 48.0,
            known_empty_cache: 4096,
            tick_interval_ms: 4,
        }
    }
}

/// Mesher section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MesherConfig {
    /// Border face policy.
    pub boundary: BoundaryPolicy,
    /// Emit per-corner ambient occlusion bits.
    pub ambient_occlusion: bool,
}

impl Default for MesherConfig {
    fn default() -> Self {
        Self {
            boundary: BoundaryPolicy::AssumeEmpty,
            ambient_occlusion: false,
        }
    }
}

/// Mesh slot allocator section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Handles the backing stores are sized for at start.
    pub initial_slots: u32,
    /// Quads the face buffer holds at start.
    pub initial_face_capacity: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            initial_slots: 64,
            initial_face_capacity: 1 << 16,
        }
    }
}

/// World generator section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// World function.
    pub kind: GeneratorKind,
    /// Noise seed.
    pub seed: u32,
    /// Surface height for `half_space`, in world blocks.
    pub level: i32,
    /// Block name used by `half_space` and `solid`.
    pub block: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::Perlin,
            seed: 0,
            level: 0,
            block: String::from("stone"),
        }
    }
}

/// Render section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Backend owned by the render thread.
    pub backend: BackendKind,
    /// Offscreen target width.
    pub width: u32,
    /// Offscreen target height.
    pub height: u32,
    /// Frames rendered before the demo shuts down.
    pub frames: u64,
    /// Simulated time between camera frames. Zero runs unpaced.
    pub frame_interval_ms: u64,
    /// Directory block textures are loaded from.
    pub texture_directory: PathBuf,
    /// Simulated device memory for the headless backend.
    pub memory_limit: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Headless,
            width: 1280,
            height: 720,
            frames: 600,
            frame_interval_ms: 16,
            texture_directory: PathBuf::from("assets/textures"),
            memory_limit: None,
        }
    }
}

/// Camera section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Flight speed along the scripted path, world units per second.
    pub speed: f32,
    /// Radius of the scripted circular path.
    pub path_radius: f32,
    /// Flight height.
    pub height: f32,
    /// Vertical field of view in degrees.
    pub fovy_degrees: f32,
    /// Near plane.
    pub znear: f32,
    /// Far plane.
    pub zfar: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            speed: 24.0,
            path_radius: 96.0,
            height: 24.0,
            fovy_degrees: 70.0,
            znear: 0.1,
            zfar: 2000.0,
        }
    }
}

/// The full configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Streaming section.
    pub streaming: StreamingConfig,
    /// Mesher section.
    pub mesher: MesherConfig,
    /// Allocator section.
    pub allocator: AllocatorConfig,
    /// Generator section.
    pub generator: GeneratorConfig,
    /// Render section.
    pub render: RenderConfig,
    /// Camera section.
    pub camera: CameraConfig,
}

impl EngineConfig {
    /// Reads and validates a JSON config file.
    ///
    /// # Arguments
    /// * `path` - Path of the JSON file
    ///
    /// # Returns
    /// The validated configuration, or the I/O, parse or validation error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Parses and validates a JSON config string.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that parse but cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let streaming = &self.streaming;
        if streaming.min_batch == 0 {
            return Err(ConfigError::Invalid("streaming.min_batch must be at least 1".into()));
        }
        if streaming.min_batch > streaming.max_batch {
            return Err(ConfigError::Invalid(format!(
                "streaming.min_batch ({}) exceeds streaming.max_batch ({})",
                streaming.min_batch, streaming.max_batch
            )));
        }
        if streaming.lod_levels == 0 || streaming.lod_levels > 8 {
            return Err(ConfigError::Invalid("streaming.lod_levels must be in 1..=8".into()));
        }
        if streaming.radius < 0 {
            return Err(ConfigError::Invalid("streaming.radius must not be negative".into()));
        }
        if streaming.known_empty_cache == 0 {
            return Err(ConfigError::Invalid(
                "streaming.known_empty_cache must be at least 1".into(),
            ));
        }
        if self.allocator.initial_slots == 0 || self.allocator.initial_face_capacity == 0 {
            return Err(ConfigError::Invalid("allocator capacities must be non-zero".into()));
        }
        if BlockType::from_name(&self.generator.block).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown block '{}'",
                self.generator.block
            )));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ConfigError::Invalid("render target must be non-empty".into()));
        }
        Ok(())
    }

    /// The generator block, resolved through the block name table.
    pub fn generator_block(&self) -> BlockType {
        BlockType::from_name(&self.generator.block).unwrap_or(BlockType::STONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_the_default() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "streaming": { "strategy": "frontier", "radius": 2 },
                 "mesher": { "boundary": "sample_neighbors" } }"#,
        )
        .unwrap();
        assert_eq!(config.streaming.strategy, StreamingStrategy::Frontier);
        assert_eq!(config.streaming.radius, 2);
        assert_eq!(config.streaming.max_batch, 64);
        assert_eq!(config.mesher.boundary, BoundaryPolicy::SampleNeighbors);
    }

    #[test]
    fn inverted_batch_bounds_are_rejected() {
        let result = EngineConfig::from_json_str(
            r#"{ "streaming": { "min_batch": 10, "max_batch": 2 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_block_is_rejected() {
        let result = EngineConfig::from_json_str(r#"{ "generator": { "block": "lava" } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let result = EngineConfig::from_json_str("{ streaming: ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn shipped_config_is_valid() {
        let config = EngineConfig::from_json_str(include_str!("../../config/engine.json")).unwrap();
        assert_eq!(config.mesher.boundary, BoundaryPolicy::SampleNeighbors);
        assert_eq!(config.render.frame_interval_ms, 16);
    }

    #[test]
    fn round_trips_through_json() {
        let config = EngineConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_json_str(&text).unwrap(), config);
    }
}
